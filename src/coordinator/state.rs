use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

use crate::error::Error;
use crate::types::{AuthChange, Session};

/// The `(session, loading)` view every screen reads.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub session: Option<Session>,
    /// True until the first fetch result or push event lands. Never set again.
    pub loading: bool,
}

impl SessionState {
    fn initial() -> Self {
        Self {
            session: None,
            loading: true,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        match (&self.session, self.loading) {
            (_, true) => Phase::Loading,
            (None, false) => Phase::SignedOut,
            (Some(_), false) => Phase::SignedIn,
        }
    }
}

/// Coarse state for routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    SignedOut,
    SignedIn,
}

/// Read-only, push-notified view of the session.
///
/// Cheap to clone; each clone tracks its own "seen" position.
#[derive(Debug, Clone)]
pub struct SessionWatch {
    rx: watch::Receiver<SessionState>,
}

impl SessionWatch {
    /// Snapshot of the current state.
    #[must_use]
    pub fn current(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.rx.borrow().session.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.rx.borrow().loading
    }

    /// Wait for the next state change.
    ///
    /// Returns `None` once the coordinator is gone; the last state stays
    /// readable through [`current`](Self::current).
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until `loading` is false and return that state.
    ///
    /// Returns `None` if the coordinator goes away while still loading; the
    /// frozen state stays readable through [`current`](Self::current).
    pub async fn wait_until_ready(&mut self) -> Option<SessionState> {
        self.wait_for(|s| !s.loading).await
    }

    /// Wait until `predicate` holds for the current state.
    ///
    /// Returns `None` if the coordinator goes away first.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&SessionState) -> bool,
    ) -> Option<SessionState> {
        self.rx.wait_for(predicate).await.ok().map(|s| s.clone())
    }
}

/// Owner side of the session state.
///
/// Every write goes through the watch sender's lock, and `release` flips its
/// flag under that same lock: once `release` returns, no write can land.
#[derive(Debug)]
pub(super) struct SharedState {
    tx: watch::Sender<SessionState>,
    released: AtomicBool,
}

impl SharedState {
    pub(super) fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::initial());
        Self {
            tx,
            released: AtomicBool::new(false),
        }
    }

    pub(super) fn watch(&self) -> SessionWatch {
        SessionWatch {
            rx: self.tx.subscribe(),
        }
    }

    pub(super) fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub(super) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Apply the one-shot fetch result. Ignored if a push event already resolved loading.
    pub(super) fn apply_fetch(&self, result: Result<Option<Session>, Error>) -> bool {
        let session = match result {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Initial session fetch failed; treating as signed out");
                None
            }
        };
        self.tx.send_if_modified(|state| {
            if self.is_released() {
                return false;
            }
            if !state.loading {
                tracing::debug!("Initial session arrived after a push event; keeping pushed state");
                return false;
            }
            tracing::debug!(
                user_id = ?session.as_ref().map(Session::subject),
                "Initial session resolved"
            );
            state.session = session;
            state.loading = false;
            true
        })
    }

    /// Apply a push event unconditionally (last write wins).
    pub(super) fn apply_change(&self, change: AuthChange) -> bool {
        self.tx.send_if_modified(|state| {
            if self.is_released() {
                return false;
            }
            tracing::debug!(
                event = %change.event,
                user_id = ?change.session.as_ref().map(Session::subject),
                "Auth event applied"
            );
            state.session = change.session;
            state.loading = false;
            true
        })
    }

    /// Local effect of a confirmed sign-out.
    pub(super) fn apply_signed_out(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if self.is_released() {
                return false;
            }
            let changed = state.session.is_some() || state.loading;
            state.session = None;
            state.loading = false;
            changed
        })
    }

    pub(super) fn release(&self) {
        self.tx.send_if_modified(|_| {
            self.released.store(true, Ordering::Release);
            false
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthEvent, User};

    fn session(sub: &str) -> Session {
        Session::new("at", "rt", User::new(sub))
    }

    fn signed_in(sub: &str) -> AuthChange {
        AuthChange {
            event: AuthEvent::SignedIn,
            session: Some(session(sub)),
        }
    }

    #[test]
    fn starts_loading() {
        let shared = SharedState::new();
        let state = shared.snapshot();
        assert!(state.loading);
        assert!(state.session.is_none());
        assert_eq!(state.phase(), Phase::Loading);
    }

    #[test]
    fn fetch_resolves_loading() {
        let shared = SharedState::new();
        assert!(shared.apply_fetch(Ok(Some(session("u1")))));
        let state = shared.snapshot();
        assert!(!state.loading);
        assert_eq!(state.phase(), Phase::SignedIn);
    }

    #[test]
    fn fetch_failure_reads_as_signed_out() {
        let shared = SharedState::new();
        assert!(shared.apply_fetch(Err(Error::Initialization("offline".into()))));
        assert_eq!(shared.snapshot().phase(), Phase::SignedOut);
    }

    #[test]
    fn late_fetch_does_not_overwrite_push() {
        let shared = SharedState::new();
        shared.apply_change(signed_in("u2"));
        assert!(!shared.apply_fetch(Ok(None)));
        let state = shared.snapshot();
        assert_eq!(state.session.map(|s| s.user.id.0), Some("u2".to_owned()));
    }

    #[test]
    fn released_state_is_frozen() {
        let shared = SharedState::new();
        shared.apply_change(signed_in("u1"));
        shared.release();
        assert!(shared.is_released());
        assert!(!shared.apply_change(AuthChange {
            event: AuthEvent::SignedOut,
            session: None,
        }));
        assert!(!shared.apply_signed_out());
        assert_eq!(shared.snapshot().phase(), Phase::SignedIn);
    }

    #[tokio::test]
    async fn watch_sees_updates() {
        let shared = SharedState::new();
        let mut watch = shared.watch();
        assert!(watch.is_loading());
        shared.apply_change(signed_in("u1"));
        let state = watch.changed().await.unwrap();
        assert_eq!(state.phase(), Phase::SignedIn);
        assert_eq!(watch.session().unwrap().subject().as_str(), "u1");
    }
}
