//! Foreground-gated token refresh.
//!
//! Refreshing tokens while the app sits in the background burns battery for
//! nothing, so [`RefreshGate`] starts the provider's auto-refresh when the
//! app becomes active and stops it on any other transition.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::provider::AuthProvider;

/// Application lifecycle state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppLifecycle {
    Active,
    Inactive,
    Background,
}

impl AppLifecycle {
    /// Map a platform state string. Anything other than `"active"` or
    /// `"background"` counts as inactive.
    #[must_use]
    pub fn from_platform(state: &str) -> Self {
        match state {
            "active" => Self::Active,
            "background" => Self::Background,
            _ => Self::Inactive,
        }
    }

    #[must_use]
    pub fn is_foreground(self) -> bool {
        self == Self::Active
    }
}

struct GateState<P> {
    provider: Arc<P>,
    /// `None` until the first transition.
    refreshing: Option<bool>,
    detached: bool,
}

/// Couples provider auto-refresh to foreground state.
///
/// Repeated notifications for the same side (foreground twice, background
/// twice) reach the provider once. After [`detach`](Self::detach) or drop no
/// further start/stop calls are made.
#[must_use = "dropping a RefreshGate detaches it immediately"]
pub struct RefreshGate<P> {
    state: Arc<Mutex<GateState<P>>>,
    listener: Option<JoinHandle<()>>,
}

impl<P: AuthProvider> RefreshGate<P> {
    /// A gate driven manually through [`handle`](Self::handle).
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                provider,
                refreshing: None,
                detached: false,
            })),
            listener: None,
        }
    }

    /// A gate that listens to `transitions` until detached.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn attach(provider: Arc<P>, mut transitions: UnboundedReceiver<AppLifecycle>) -> Self {
        let mut gate = Self::new(provider);
        let state = Arc::clone(&gate.state);
        gate.listener = Some(tokio::spawn(async move {
            while let Some(lifecycle) = transitions.recv().await {
                if !apply(&state, lifecycle) {
                    break;
                }
            }
            tracing::debug!("Lifecycle transition stream ended");
        }));
        gate
    }

    /// Handle one lifecycle transition.
    pub fn handle(&self, lifecycle: AppLifecycle) {
        apply(&self.state, lifecycle);
    }

    /// Whether auto-refresh was last started (`false` before any transition).
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing.unwrap_or(false)
    }

    pub fn detach(mut self) {
        self.release();
    }
}

impl<P> RefreshGate<P> {
    fn release(&mut self) {
        self.state.lock().detached = true;
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl<P> Drop for RefreshGate<P> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Returns false once the gate is detached.
fn apply<P: AuthProvider>(state: &Mutex<GateState<P>>, lifecycle: AppLifecycle) -> bool {
    let mut state = state.lock();
    if state.detached {
        return false;
    }
    let foreground = lifecycle.is_foreground();
    if state.refreshing == Some(foreground) {
        return true;
    }
    if foreground {
        tracing::debug!("App active; starting token auto-refresh");
        state.provider.start_auto_refresh();
    } else {
        tracing::debug!(state = ?lifecycle, "App left foreground; stopping token auto-refresh");
        state.provider.stop_auto_refresh();
    }
    state.refreshing = Some(foreground);
    true
}
