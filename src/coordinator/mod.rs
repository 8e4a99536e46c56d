//! Process-wide session state for the app.
//!
//! [`SessionCoordinator`] reconciles two sources into one observable
//! `(session, loading)` view:
//!
//! - a one-shot [`get_session`](crate::AuthProvider::get_session) fetch at start,
//! - the provider's push stream of auth events, applied in delivery order.
//!
//! The fetch only counts if no push event resolved loading first, so a slow
//! fetch can never clobber a fresher sign-in.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use nomnom_session::{GoTrueClient, ProviderConfig, SessionCoordinator};
//!
//! let provider = Arc::new(GoTrueClient::new(ProviderConfig::from_env()?));
//! let coordinator = SessionCoordinator::start(provider);
//!
//! let mut watch = coordinator.observe();
//! let state = watch.wait_until_ready().await;
//! let signed_in = state.is_some_and(|s| s.session.is_some());
//! ```

mod state;
mod subscription;

use std::sync::Arc;

use tokio::task::{AbortHandle, JoinHandle};

pub use state::{Phase, SessionState, SessionWatch};

use crate::error::Error;
use crate::provider::AuthProvider;
use state::SharedState;
use subscription::Subscription;

/// Owns the session state for the life of the app.
///
/// Create one at startup and hand [`SessionWatch`]es to the screens.
/// Dropping the coordinator (or calling [`shutdown`](Self::shutdown)) releases
/// the provider subscription; the last state stays readable from existing
/// watches but never changes again.
pub struct SessionCoordinator<P> {
    provider: Arc<P>,
    state: Arc<SharedState>,
    subscription: Subscription,
    initial_fetch: AbortHandle,
    resolve: JoinHandle<()>,
}

impl<P: AuthProvider> SessionCoordinator<P> {
    /// Subscribe to provider events and kick off the initial fetch.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(provider: Arc<P>) -> Self {
        let state = Arc::new(SharedState::new());

        let subscription = Subscription::spawn(Arc::clone(&state), provider.subscribe());

        let initial_fetch = {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.get_session().await })
        };
        let fetch_abort = initial_fetch.abort_handle();
        // A panicking fetch surfaces here as a JoinError, so loading still resolves.
        let resolve = {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                let result = match initial_fetch.await {
                    Ok(result) => result.map_err(|e| Error::Initialization(e.to_string())),
                    Err(e) => Err(Error::Initialization(format!("session fetch failed: {e}"))),
                };
                state.apply_fetch(result);
            })
        };

        tracing::debug!("Session coordinator started");

        Self {
            provider,
            state,
            subscription,
            initial_fetch: fetch_abort,
            resolve,
        }
    }

    /// A new read-only view of the session.
    #[must_use]
    pub fn observe(&self) -> SessionWatch {
        self.state.watch()
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn current(&self) -> SessionState {
        self.state.snapshot()
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Sign out with the provider.
    ///
    /// On success the local session is cleared right away; the provider's
    /// `SIGNED_OUT` event that follows leaves it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SignOut`] if the provider refused or could not be
    /// reached. The local session is left exactly as it was.
    pub async fn sign_out(&self) -> Result<(), Error> {
        match self.provider.sign_out().await {
            Ok(()) => {
                self.state.apply_signed_out();
                tracing::info!("Signed out");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-out failed; keeping local session");
                Err(Error::SignOut(Box::new(e)))
            }
        }
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.state.is_released()
    }

    /// Release the subscription and freeze the state.
    pub fn shutdown(mut self) {
        self.release();
    }
}

impl<P> SessionCoordinator<P> {
    fn release(&mut self) {
        self.initial_fetch.abort();
        self.resolve.abort();
        self.subscription.release();
    }
}

impl<P> Drop for SessionCoordinator<P> {
    fn drop(&mut self) {
        self.release();
    }
}
