#![doc = include_str!("../README.md")]

#[cfg(feature = "gotrue")]
pub mod config;
pub mod coordinator;
pub mod error;
pub mod forms;
#[cfg(feature = "gotrue")]
pub mod gotrue;
pub mod lifecycle;
#[cfg(feature = "gotrue")]
pub mod pkce;
pub mod provider;
pub mod store;
pub mod types;

// Re-exports for convenient access
#[cfg(feature = "gotrue")]
pub use config::ProviderConfig;
pub use coordinator::{Phase, SessionCoordinator, SessionState, SessionWatch};
pub use error::Error;
pub use forms::{SignInForm, SignUpForm};
#[cfg(feature = "gotrue")]
pub use gotrue::{GoTrueClient, OAuthProvider, OAuthRequest, SignUpOutcome};
pub use lifecycle::{AppLifecycle, RefreshGate};
#[cfg(feature = "gotrue")]
pub use pkce::PkcePair;
pub use provider::AuthProvider;
pub use store::{MemorySessionStore, SessionStore};
pub use types::{AuthChange, AuthEvent, EmailAddress, RawAuthEvent, Session, User, UserId};
