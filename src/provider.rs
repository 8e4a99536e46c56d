use std::future::Future;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::Error;
use crate::types::{RawAuthEvent, Session};

/// External authentication provider.
///
/// The session coordinator only talks to the provider through this trait.
/// [`GoTrueClient`](crate::GoTrueClient) is the HTTP implementation; tests
/// plug in scripted fakes.
///
/// # Example
///
/// ```rust,ignore
/// impl AuthProvider for MyProvider {
///     async fn get_session(&self) -> Result<Option<Session>, Error> {
///         Ok(self.storage.load().await?)
///     }
///
///     fn subscribe(&self) -> UnboundedReceiver<RawAuthEvent> {
///         let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
///         self.listeners.lock().push(tx);
///         rx
///     }
///     // ...
/// }
/// ```
pub trait AuthProvider: Send + Sync + 'static {
    /// One-shot read of the current session. `Ok(None)` means signed out.
    fn get_session(&self) -> impl Future<Output = Result<Option<Session>, Error>> + Send;

    /// Register for session-change events.
    ///
    /// Events arrive in the order the provider emits them. Dropping the
    /// receiver deregisters.
    fn subscribe(&self) -> UnboundedReceiver<RawAuthEvent>;

    /// Terminate the current session with the provider.
    fn sign_out(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Start background token refresh. Idempotent.
    fn start_auto_refresh(&self);

    /// Stop background token refresh. Idempotent.
    fn stop_auto_refresh(&self);
}
