//! Sign-in lifecycle through the façade and the reconciler.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;

use meshgate_auth::{LogoutOutcome, SignInOutcome};
use meshgate_core::config::{AppConfig, RetentionPolicy};
use meshgate_core::error::ErrorKind;
use meshgate_core::traits::{AccessApi, RecordStore};
use meshgate_core::types::{Identity, RecordPhase};

use crate::helpers::{KEY, TestApp, t0};

const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

#[tokio::test]
async fn test_sign_in_reports_estimate_then_actual_expiry() {
    let app = TestApp::new();

    let outcome = app.signin.sign_in("alice", "viewer", FIFTEEN_MINUTES).await.unwrap();
    assert!(matches!(outcome, SignInOutcome::NotReady { .. }));

    let pending = app.signin.status("alice").await.unwrap();
    assert!(!pending.provisioned);
    assert!(pending.estimated);
    assert_eq!(pending.valid_until, t0() + chrono::Duration::minutes(15));

    app.reconcile("alice").await;

    let active = app.signin.status("alice").await.unwrap();
    assert!(active.provisioned);
    assert!(!active.estimated);
    assert_eq!(active.valid_until, t0() + chrono::Duration::minutes(15));
    assert_eq!(active.phase, RecordPhase::Provisioned);
}

#[tokio::test]
async fn test_expiry_deletes_record() {
    let app = TestApp::new();
    app.signin.sign_in("alice", "viewer", FIFTEEN_MINUTES).await.unwrap();
    app.reconcile("alice").await;

    app.advance(Duration::from_secs(16 * 60));
    app.reconcile("alice").await;

    let err = app.signin.status("alice").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(app.api.stats().bindings, 0);
    assert_eq!(app.api.stats().principals, 0);
}

#[tokio::test]
async fn test_expiry_with_retention_reports_unprovisioned() {
    let app = TestApp::with_retention(RetentionPolicy::Retain);
    app.signin.sign_in("alice", "viewer", FIFTEEN_MINUTES).await.unwrap();
    app.reconcile("alice").await;

    app.advance(Duration::from_secs(16 * 60));
    app.reconcile("alice").await;

    let view = app.signin.status("alice").await.unwrap();
    assert!(!view.provisioned);
    assert_eq!(view.phase, RecordPhase::Inert);
    assert_eq!(app.api.stats().bindings, 0);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_wake_revokes_expired_access() {
    let mut config = AppConfig::default();
    config.reconciler.logout_wait_seconds = 0;
    let app = TestApp::with_config(config);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&app.runner).run(cancel_rx));

    app.signin.sign_in("alice", "viewer", FIFTEEN_MINUTES).await.unwrap();
    for _ in 0..100 {
        if app.signin.status("alice").await.is_ok_and(|v| v.provisioned) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(app.signin.status("alice").await.unwrap().provisioned);

    // Nothing else happens until the wake at the expiry fires.
    app.advance(Duration::from_secs(16 * 60));
    tokio::time::sleep(Duration::from_secs(16 * 60)).await;

    assert_eq!(
        app.signin.status("alice").await.unwrap_err().kind,
        ErrorKind::NotFound
    );
    assert_eq!(app.api.stats().bindings, 0);

    cancel_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_two_matching_grants_are_malformed() {
    let app = TestApp::new();
    for (first, second) in [
        (json!({"role": "viewer", "period": "15m"}), json!({"role": "viewer", "period": "15m"})),
        (json!({"role": "viewer", "period": "15m"}), json!("garbage")),
        (json!(null), json!({"version": "v7"})),
    ] {
        let identity = Identity::user("alice")
            .with_grant(KEY, first)
            .with_grant(KEY, second);
        let err = app.capabilities.resolve(&identity).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedGrant);
    }
}

#[tokio::test]
async fn test_logout_twice_is_idempotent() {
    let app = TestApp::new();
    app.signin.sign_in("alice", "viewer", FIFTEEN_MINUTES).await.unwrap();
    app.reconcile("alice").await;

    let first = app.signin.logout("alice").await.unwrap();
    assert_eq!(first, LogoutOutcome::Pending);
    app.reconcile("alice").await;
    assert_eq!(app.api.stats().bindings, 0);

    let before = app.api.stats();
    let second = app.signin.logout("alice").await.unwrap();
    assert_eq!(second, LogoutOutcome::AlreadySignedOut);
    app.reconcile("alice").await;

    let after = app.api.stats();
    assert_eq!(after.creates, before.creates);
    assert_eq!(after.updates, before.updates);
    assert_eq!(after.deletes, before.deletes);
}

#[tokio::test(start_paused = true)]
async fn test_logout_waits_for_revocation() {
    let app = TestApp::with_config(AppConfig::default());
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&app.runner).run(cancel_rx));

    app.signin.sign_in("alice", "viewer", FIFTEEN_MINUTES).await.unwrap();
    for _ in 0..100 {
        if app.api.stats().bindings == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(app.signin.logout("alice").await.unwrap(), LogoutOutcome::SignedOut);
    assert_eq!(app.api.stats().bindings, 0);
    assert_eq!(app.signin.logout("alice").await.unwrap(), LogoutOutcome::AlreadySignedOut);

    cancel_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_invalid_period_never_touches_store() {
    let app = TestApp::new();
    for seconds in [0, 1, 60, 599] {
        let err = app
            .signin
            .sign_in("alice", "viewer", Duration::from_secs(seconds))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRule);
    }
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_renewal_only_moves_expiry_forward() {
    let app = TestApp::new();
    app.signin.sign_in("alice", "viewer", Duration::from_secs(3600)).await.unwrap();
    app.reconcile("alice").await;
    let mut last = app.signin.status("alice").await.unwrap().valid_until;

    for (minutes_later, period_minutes) in [(5, 15), (10, 60), (1, 10)] {
        app.advance(Duration::from_secs(minutes_later * 60));
        let outcome = app
            .signin
            .sign_in("alice", "viewer", Duration::from_secs(period_minutes * 60))
            .await
            .unwrap();
        assert!(matches!(outcome, SignInOutcome::Ready(_)), "renewal keeps access");
        app.reconcile("alice").await;

        let until = app.signin.status("alice").await.unwrap().valid_until;
        assert!(until >= last, "expiry moved backwards: {until} < {last}");
        last = until;
    }
}

#[tokio::test]
async fn test_role_change_replaces_access() {
    let app = TestApp::new();
    app.signin.sign_in("alice", "admin", FIFTEEN_MINUTES).await.unwrap();
    app.reconcile("alice").await;

    let outcome = app.signin.sign_in("alice", "viewer", FIFTEEN_MINUTES).await.unwrap();
    assert!(matches!(outcome, SignInOutcome::NotReady { .. }));
    app.reconcile("alice").await;

    let binding = app
        .api
        .get_binding("meshgate-user-alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(binding.role, "viewer");
    assert_eq!(app.signin.status("alice").await.unwrap().role, "viewer");
}

#[tokio::test]
async fn test_persistent_failure_surfaces_then_recovers() {
    let app = TestApp::new();
    app.signin.sign_in("alice", "viewer", FIFTEEN_MINUTES).await.unwrap();
    app.api.fail_next(u32::MAX);

    for _ in 0..5 {
        app.reconcile("alice").await;
    }

    let err = app.signin.status("alice").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);

    app.api.fail_next(0);
    app.reconcile("alice").await;

    let view = app.signin.status("alice").await.unwrap();
    assert!(view.provisioned);
}

#[tokio::test]
async fn test_deleting_record_revokes_access() {
    let app = TestApp::new();
    app.signin.sign_in("alice", "viewer", FIFTEEN_MINUTES).await.unwrap();
    app.reconcile("alice").await;
    assert_eq!(app.api.stats().bindings, 1);

    app.store.delete("alice", None).await.unwrap();
    app.reconcile("alice").await;
    assert_eq!(app.api.stats().bindings, 0);
}

#[tokio::test]
async fn test_usernames_reconcile_independently() {
    let app = TestApp::new();
    for username in ["alice", "bob", "carol"] {
        app.signin.sign_in(username, "viewer", FIFTEEN_MINUTES).await.unwrap();
    }
    app.api.fail_next(1);
    for username in ["alice", "bob", "carol"] {
        app.reconcile(username).await;
    }

    let provisioned = [
        app.signin.status("alice").await.unwrap().provisioned,
        app.signin.status("bob").await.unwrap().provisioned,
        app.signin.status("carol").await.unwrap().provisioned,
    ];
    assert_eq!(provisioned, [false, true, true]);
}
