use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use super::state::SharedState;
use crate::types::{AuthChange, RawAuthEvent};

/// Live registration for provider auth events.
///
/// Dropping the handle freezes the session state and stops the event pump.
#[derive(Debug)]
#[must_use = "dropping a Subscription releases it immediately"]
pub(super) struct Subscription {
    state: Arc<SharedState>,
    pump: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(super) fn spawn(state: Arc<SharedState>, events: UnboundedReceiver<RawAuthEvent>) -> Self {
        let pump = tokio::spawn(pump_events(Arc::clone(&state), events));
        Self {
            state,
            pump: Some(pump),
        }
    }

    pub(super) fn release(&mut self) {
        if let Some(pump) = self.pump.take() {
            self.state.release();
            pump.abort();
            tracing::debug!("Auth event subscription released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

async fn pump_events(state: Arc<SharedState>, mut events: UnboundedReceiver<RawAuthEvent>) {
    while let Some(raw) = events.recv().await {
        if state.is_released() {
            break;
        }
        match AuthChange::try_from(raw) {
            Ok(change) => {
                state.apply_change(change);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed auth event");
            }
        }
    }
    tracing::debug!("Auth event stream ended");
}
