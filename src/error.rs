#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The one-shot initial session fetch failed.
    #[error("Initial session fetch failed: {0}")]
    Initialization(String),
    /// The provider could not complete sign-out; the local session is kept.
    #[error("Sign-out failed: {0}")]
    SignOut(#[source] Box<Error>),
    /// A push event from the provider could not be decoded.
    #[error("Malformed auth event: {0}")]
    Delivery(String),
    #[error("{operation} failed{}: {detail}", status_suffix(.status))]
    Provider {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[cfg(feature = "gotrue")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Validation(String),
    #[error("Invalid email address: {0:?}")]
    InvalidEmail(String),
    /// Session persistence failed.
    #[error("Session store error: {0}")]
    Store(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("No active session")]
    NoSession,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}
