use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use time::{Duration, OffsetDateTime};

use crate::error::Error;

/// Provider-issued user identifier (the `sub` claim).
///
/// Opaque: the crate never inspects its format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Normalized email address (trimmed, lowercased).
///
/// Holding an `EmailAddress` proves it has a non-empty local part, a
/// non-empty domain and no embedded whitespace. Deliverability is left to
/// the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let normalized = s.trim().to_lowercase();
        let valid = match normalized.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && !normalized.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if valid {
            Ok(Self(normalized))
        } else {
            Err(Error::InvalidEmail(s))
        }
    }
}

impl From<EmailAddress> for String {
    fn from(e: EmailAddress) -> Self {
        e.0
    }
}

/// Identity claims attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub email_confirmed_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub user_metadata: Map<String, JsonValue>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl User {
    /// Create a `User` with only the required `id`.
    #[must_use]
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            email: None,
            email_confirmed_at: None,
            user_metadata: Map::new(),
            created_at: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_full_name(mut self, name: impl Into<String>) -> Self {
        self.user_metadata
            .insert("full_name".into(), JsonValue::String(name.into()));
        self
    }

    #[must_use]
    pub fn with_email_confirmed_at(mut self, at: OffsetDateTime) -> Self {
        self.email_confirmed_at = Some(at);
        self
    }

    /// Display name from `user_metadata.full_name`, if set.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.user_metadata.get("full_name").and_then(JsonValue::as_str)
    }

    /// Whether the user has clicked the signup confirmation link.
    #[must_use]
    pub fn is_email_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// An authenticated session.
///
/// Token material is opaque and never parsed here. `Debug` output redacts it.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Session {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Expiry as unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub refresh_token: String,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".into()
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl Session {
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        user: User,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            expires_in: None,
            expires_at: None,
            refresh_token: refresh_token.into(),
            user,
        }
    }

    #[must_use]
    pub fn with_expires_at(mut self, at: OffsetDateTime) -> Self {
        self.expires_at = Some(at.unix_timestamp());
        self
    }

    /// Decode and validate a session payload received from the provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Delivery`] if the payload does not describe a complete session.
    pub fn from_payload(payload: JsonValue) -> Result<Self, Error> {
        let session: Self = serde_json::from_value(payload)
            .map_err(|e| Error::Delivery(format!("session payload: {e}")))?;
        session.validate()
    }

    /// Reject half-initialized sessions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Delivery`] naming the first missing component.
    pub fn validate(self) -> Result<Self, Error> {
        if self.access_token.is_empty() {
            return Err(Error::Delivery("session without access token".into()));
        }
        if self.refresh_token.is_empty() {
            return Err(Error::Delivery("session without refresh token".into()));
        }
        if self.user.id.as_str().is_empty() {
            return Err(Error::Delivery("session without user id".into()));
        }
        Ok(self)
    }

    /// Fill `expires_at` from `expires_in` when the provider only sent the latter.
    #[must_use]
    pub(crate) fn stamped(mut self, now: OffsetDateTime) -> Self {
        if self.expires_at.is_none() {
            if let Some(secs) = self.expires_in {
                self.expires_at = Some(now.unix_timestamp().saturating_add(secs));
            }
        }
        self
    }

    #[must_use]
    pub fn subject(&self) -> &UserId {
        &self.user.id
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.user.email.as_deref()
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.user.display_name()
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
    }

    /// True if the session expires within `margin` of `now`.
    /// Sessions without an expiry never do.
    #[must_use]
    pub fn expires_within(&self, margin: Duration, now: OffsetDateTime) -> bool {
        self.expires_at().is_some_and(|at| at - now <= margin)
    }
}

/// Kind of provider auth event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
    MfaChallengeVerified,
}

impl AuthEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitialSession => "INITIAL_SESSION",
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
            Self::PasswordRecovery => "PASSWORD_RECOVERY",
            Self::MfaChallengeVerified => "MFA_CHALLENGE_VERIFIED",
        }
    }

    /// Events that must carry a session payload.
    fn requires_session(self) -> bool {
        matches!(
            self,
            Self::SignedIn | Self::TokenRefreshed | Self::UserUpdated | Self::MfaChallengeVerified
        )
    }
}

impl std::fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuthEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "INITIAL_SESSION" => Self::InitialSession,
            "SIGNED_IN" => Self::SignedIn,
            "SIGNED_OUT" => Self::SignedOut,
            "TOKEN_REFRESHED" => Self::TokenRefreshed,
            "USER_UPDATED" => Self::UserUpdated,
            "PASSWORD_RECOVERY" => Self::PasswordRecovery,
            "MFA_CHALLENGE_VERIFIED" => Self::MfaChallengeVerified,
            other => return Err(Error::Delivery(format!("unknown event kind {other:?}"))),
        })
    }
}

/// Auth event as delivered by the provider, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAuthEvent {
    pub event: String,
    #[serde(default)]
    pub session: Option<JsonValue>,
}

impl RawAuthEvent {
    #[must_use]
    pub fn new(event: AuthEvent, session: Option<&Session>) -> Self {
        Self {
            event: event.as_str().to_owned(),
            session: session.and_then(|s| serde_json::to_value(s).ok()),
        }
    }
}

/// A validated session change.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

impl TryFrom<RawAuthEvent> for AuthChange {
    type Error = Error;

    fn try_from(raw: RawAuthEvent) -> Result<Self, Self::Error> {
        let event: AuthEvent = raw.event.parse()?;
        let session = match raw.session {
            None | Some(JsonValue::Null) => None,
            Some(payload) => Some(Session::from_payload(payload)?),
        };
        if event.requires_session() && session.is_none() {
            return Err(Error::Delivery(format!("{event} without session")));
        }
        if event == AuthEvent::SignedOut && session.is_some() {
            return Err(Error::Delivery("SIGNED_OUT carrying a session".into()));
        }
        Ok(Self { event, session })
    }
}
