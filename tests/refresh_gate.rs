//! Foreground-gated auto-refresh.

mod fixtures;

use fixtures::{FakeProvider, session, settle, subject, within};
use nomnom_session::{AppLifecycle, AuthEvent, RefreshGate, SessionCoordinator};
use tokio::sync::mpsc;

#[tokio::test]
async fn repeated_foreground_starts_once() {
    let provider = FakeProvider::new();
    let gate = RefreshGate::new(provider.clone());

    gate.handle(AppLifecycle::Active);
    gate.handle(AppLifecycle::Active);

    assert_eq!(provider.starts(), 1);
    assert_eq!(provider.stops(), 0);
    assert!(gate.is_refreshing());
}

#[tokio::test]
async fn any_non_foreground_state_stops() {
    let provider = FakeProvider::new();
    let gate = RefreshGate::new(provider.clone());

    gate.handle(AppLifecycle::Active);
    gate.handle(AppLifecycle::Inactive);
    gate.handle(AppLifecycle::Background);
    assert_eq!(provider.stops(), 1);
    assert!(!gate.is_refreshing());

    gate.handle(AppLifecycle::Active);
    assert_eq!(provider.starts(), 2);
}

#[tokio::test]
async fn first_transition_always_reaches_provider() {
    let provider = FakeProvider::new();
    let gate = RefreshGate::new(provider.clone());
    assert!(!gate.is_refreshing());

    gate.handle(AppLifecycle::Background);
    assert_eq!(provider.stops(), 1);
    assert_eq!(provider.starts(), 0);
}

#[tokio::test]
async fn attached_gate_follows_transition_stream() {
    let provider = FakeProvider::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let _gate = RefreshGate::attach(provider.clone(), rx);

    for state in ["active", "active", "inactive", "background", "active"] {
        tx.send(AppLifecycle::from_platform(state)).unwrap();
    }
    settle().await;

    assert_eq!(provider.starts(), 2);
    assert_eq!(provider.stops(), 1);
}

#[tokio::test]
async fn detached_gate_makes_no_calls() {
    let provider = FakeProvider::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let gate = RefreshGate::attach(provider.clone(), rx);

    tx.send(AppLifecycle::Active).unwrap();
    settle().await;
    assert_eq!(provider.starts(), 1);

    gate.detach();
    let _ = tx.send(AppLifecycle::Background);
    let _ = tx.send(AppLifecycle::Active);
    settle().await;

    assert_eq!(provider.starts(), 1);
    assert_eq!(provider.stops(), 0);
    assert!(tx.is_closed());
}

#[tokio::test]
async fn refresh_surfaces_through_coordinator() {
    let provider = FakeProvider::new();
    let coordinator = SessionCoordinator::start(provider.clone());
    let gate = RefreshGate::new(provider.clone());
    let mut watch = coordinator.observe();

    provider.resolve_initial(Ok(Some(session("u1"))));
    within(watch.wait_until_ready()).await;

    gate.handle(AppLifecycle::Active);
    let mut renewed = session("u1");
    renewed.refresh_token = "refresh-u1-rotated".into();
    provider.emit(AuthEvent::TokenRefreshed, Some(&renewed));

    let state = within(watch.wait_for(|s| {
        s.session
            .as_ref()
            .is_some_and(|s| s.refresh_token == "refresh-u1-rotated")
    }))
    .await
    .unwrap();
    assert_eq!(subject(&state.session), Some("u1"));
    assert_eq!(provider.starts(), 1);
}
