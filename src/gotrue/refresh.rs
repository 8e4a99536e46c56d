use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::Inner;
use crate::store::SessionStore;

/// Spawn the auto-refresh ticker.
///
/// Holds only a weak reference, so the task ends on its own once the client
/// is dropped. `cancel` is only observed while waiting for the next tick, so
/// a refresh that already started always finishes and stores its tokens.
/// Returns `None` outside a Tokio runtime.
pub(super) fn spawn_ticker<S: SessionStore>(
    inner: Weak<Inner<S>>,
    tick: Duration,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    let handle = tokio::runtime::Handle::try_current()
        .inspect_err(|e| tracing::warn!(error = %e, "Cannot start token auto-refresh"))
        .ok()?;
    Some(handle.spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if cancel.run_until_cancelled(interval.tick()).await.is_none() {
                break;
            }
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.refresh_if_expiring().await;
        }
        tracing::debug!("Token auto-refresh stopped");
    }))
}
