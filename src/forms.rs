//! Credential forms submitted by the auth screens.
//!
//! Validation happens before anything reaches the provider, so the screens
//! can show the message straight from [`Error::Validation`].

use crate::error::Error;
use crate::types::EmailAddress;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Email + password sign-in.
#[derive(Clone, Default)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

impl SignInForm {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// # Errors
    ///
    /// [`Error::Validation`] if either field is empty, [`Error::InvalidEmail`]
    /// if the address is malformed.
    pub fn validate(&self) -> Result<EmailAddress, Error> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(Error::Validation("Please fill in all fields".into()));
        }
        self.email.parse()
    }
}

/// New account registration.
#[derive(Clone, Default)]
pub struct SignUpForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub agreed_to_terms: bool,
}

/// A sign-up form that passed validation.
#[derive(Clone)]
pub struct ValidSignUp<'a> {
    pub full_name: &'a str,
    pub email: EmailAddress,
    pub password: &'a str,
}

impl SignUpForm {
    /// Checks run in the order the screen reports them; the first failure wins.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] naming the first problem, or
    /// [`Error::InvalidEmail`] for a malformed address.
    pub fn validate(&self) -> Result<ValidSignUp<'_>, Error> {
        let full_name = self.full_name.trim();
        if full_name.is_empty() {
            return Err(Error::Validation("Please enter your full name".into()));
        }
        if self.email.trim().is_empty() {
            return Err(Error::Validation("Please enter your email address".into()));
        }
        if self.password.is_empty() {
            return Err(Error::Validation("Please enter a password".into()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters long"
            )));
        }
        if self.password != self.confirm_password {
            return Err(Error::Validation("Passwords do not match".into()));
        }
        if !self.agreed_to_terms {
            return Err(Error::Validation(
                "Please agree to the Terms of Service and Privacy Policy".into(),
            ));
        }
        Ok(ValidSignUp {
            full_name,
            email: self.email.parse()?,
            password: &self.password,
        })
    }
}

// Passwords stay out of logs.
impl std::fmt::Debug for SignInForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInForm")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for SignUpForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignUpForm")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("agreed_to_terms", &self.agreed_to_terms)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ValidSignUp<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidSignUp")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_sign_up() -> SignUpForm {
        SignUpForm {
            full_name: "  Julia Child ".into(),
            email: " Julia@Example.com".into(),
            password: "souffle".into(),
            confirm_password: "souffle".into(),
            agreed_to_terms: true,
        }
    }

    fn message(err: Error) -> String {
        match err {
            Error::Validation(msg) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn sign_in_requires_both_fields() {
        let err = SignInForm::new("a@b.com", "").validate().unwrap_err();
        assert_eq!(message(err), "Please fill in all fields");
        let err = SignInForm::new("   ", "pw").validate().unwrap_err();
        assert_eq!(message(err), "Please fill in all fields");
    }

    #[test]
    fn sign_in_normalizes_email() {
        let email = SignInForm::new(" A@B.com ", "pw").validate().unwrap();
        assert_eq!(email.as_str(), "a@b.com");
    }

    #[test]
    fn sign_up_accepts_valid_form() {
        let form = valid_sign_up();
        let valid = form.validate().unwrap();
        assert_eq!(valid.full_name, "Julia Child");
        assert_eq!(valid.email.as_str(), "julia@example.com");
        assert_eq!(valid.password, "souffle");
    }

    #[test]
    fn sign_up_checks_in_order() {
        let mut form = SignUpForm::default();
        assert_eq!(message(form.validate().unwrap_err()), "Please enter your full name");

        form.full_name = "Julia".into();
        assert_eq!(
            message(form.validate().unwrap_err()),
            "Please enter your email address"
        );

        form.email = "julia@example.com".into();
        assert_eq!(message(form.validate().unwrap_err()), "Please enter a password");

        form.password = "short".into();
        assert_eq!(
            message(form.validate().unwrap_err()),
            "Password must be at least 6 characters long"
        );

        form.password = "longenough".into();
        form.confirm_password = "different".into();
        assert_eq!(message(form.validate().unwrap_err()), "Passwords do not match");

        form.confirm_password = "longenough".into();
        assert_eq!(
            message(form.validate().unwrap_err()),
            "Please agree to the Terms of Service and Privacy Policy"
        );

        form.agreed_to_terms = true;
        assert!(form.validate().is_ok());
    }

    #[test]
    fn sign_up_rejects_malformed_email() {
        let mut form = valid_sign_up();
        form.email = "julia.example.com".into();
        assert!(matches!(form.validate(), Err(Error::InvalidEmail(_))));
    }

    #[test]
    fn debug_omits_passwords() {
        let debug = format!("{:?}", valid_sign_up());
        assert!(!debug.contains("souffle"));
    }
}
