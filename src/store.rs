use std::future::Future;

use parking_lot::Mutex;

use crate::types::Session;

/// Consumer-provided token persistence for [`GoTrueClient`](crate::GoTrueClient).
///
/// The client loads on `get_session`, saves after sign-in and refresh, and
/// clears after sign-out. Mobile apps back this with the platform keychain.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for Keychain {
///     async fn load(&self) -> Result<Option<Session>, ...> {
///         let Some(json) = self.read("nomnom.session")? else { return Ok(None) };
///         Ok(Some(serde_json::from_str(&json)?))
///     }
///     // ...
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Read the persisted session, if any.
    fn load(
        &self,
    ) -> impl Future<Output = Result<Option<Session>, Box<dyn std::error::Error + Send + Sync>>>
           + Send;

    /// Persist a session, replacing any previous one.
    fn save(
        &self,
        session: &Session,
    ) -> impl Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send;

    /// Remove the persisted session.
    fn clear(
        &self,
    ) -> impl Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send;
}

/// Process-local store. Sessions do not survive a restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<Session>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.session.lock().clone())
    }

    async fn save(&self, session: &Session) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.session.lock().take();
        Ok(())
    }
}
