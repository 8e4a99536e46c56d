//! Scripted auth provider for coordinator and refresh-gate tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use nomnom_session::{AuthEvent, AuthProvider, Error, RawAuthEvent, Session, User};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

type FetchResult = Result<Option<Session>, Error>;

/// Provider whose initial fetch stays pending until the test resolves it.
pub struct FakeProvider {
    listeners: Mutex<Vec<UnboundedSender<RawAuthEvent>>>,
    fetch_rx: Mutex<Option<oneshot::Receiver<FetchResult>>>,
    fetch_tx: Mutex<Option<oneshot::Sender<FetchResult>>>,
    sign_out_failure: Mutex<Option<Error>>,
    fetch_panics: AtomicBool,
    sign_out_calls: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = oneshot::channel();
        Arc::new(Self {
            listeners: Mutex::new(Vec::new()),
            fetch_rx: Mutex::new(Some(rx)),
            fetch_tx: Mutex::new(Some(tx)),
            sign_out_failure: Mutex::new(None),
            fetch_panics: AtomicBool::new(false),
            sign_out_calls: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        })
    }

    /// Complete the pending `get_session` call.
    pub fn resolve_initial(&self, result: FetchResult) {
        let tx = self
            .fetch_tx
            .lock()
            .take()
            .expect("initial fetch already resolved");
        let _ = tx.send(result);
    }

    /// Make `get_session` panic instead of resolving.
    pub fn panic_on_fetch(&self) {
        self.fetch_panics.store(true, Ordering::SeqCst);
    }

    pub fn emit(&self, event: AuthEvent, session: Option<&Session>) {
        self.emit_raw(RawAuthEvent::new(event, session));
    }

    pub fn emit_raw(&self, raw: RawAuthEvent) {
        self.listeners
            .lock()
            .retain(|tx| tx.send(raw.clone()).is_ok());
    }

    /// Listeners whose receiving side is still alive.
    pub fn live_listeners(&self) -> usize {
        self.listeners.lock().iter().filter(|tx| !tx.is_closed()).count()
    }

    pub fn fail_next_sign_out(&self, error: Error) {
        *self.sign_out_failure.lock() = Some(error);
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AuthProvider for FakeProvider {
    async fn get_session(&self) -> Result<Option<Session>, Error> {
        if self.fetch_panics.load(Ordering::SeqCst) {
            panic!("session fetch blew up");
        }
        let rx = self.fetch_rx.lock().take();
        match rx {
            Some(rx) => rx.await.unwrap_or(Ok(None)),
            None => Ok(None),
        }
    }

    fn subscribe(&self) -> UnboundedReceiver<RawAuthEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().push(tx);
        rx
    }

    async fn sign_out(&self) -> Result<(), Error> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        match self.sign_out_failure.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn start_auto_refresh(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_auto_refresh(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn session(sub: &str) -> Session {
    Session::new(
        format!("access-{sub}"),
        format!("refresh-{sub}"),
        User::new(sub).with_email(format!("{sub}@example.com")),
    )
}

pub fn subject(session: &Option<Session>) -> Option<&str> {
    session.as_ref().map(|s| s.subject().as_str())
}

/// Let spawned tasks run until they block again.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Fail the test instead of hanging when an expected update never comes.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("timed out waiting for session update")
}
