//! HTTP surface: status codes, retry hints, and error mapping.

use axum::http::{StatusCode, header};

use meshgate_core::traits::RecordStore;

use crate::helpers::{ALICE, BOB, CAROL, CI_RUNNER, DAVE, TestApp};

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let resp = app.request("GET", "/api/health", "10.9.9.9").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_login_accepted_then_ready() {
    let app = TestApp::new();

    let resp = app.request("POST", "/api/v1alpha1/login", ALICE).await;
    assert_eq!(resp.status, StatusCode::ACCEPTED);
    assert_eq!(resp.headers[header::RETRY_AFTER], "1");
    assert_eq!(resp.body["data"]["username"], "alice");
    assert_eq!(resp.body["data"]["provisioned"], false);
    assert_eq!(resp.body["data"]["estimated"], true);

    app.reconcile("alice").await;

    let resp = app.request("GET", "/api/v1alpha1/login", ALICE).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["provisioned"], true);
    assert_eq!(resp.body["data"]["phase"], "provisioned");

    let resp = app.request("POST", "/api/v1alpha1/login", ALICE).await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn test_status_without_sign_in_is_not_found() {
    let app = TestApp::new();
    let resp = app.request("GET", "/api/v1alpha1/login", ALICE).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_denied_callers() {
    let app = TestApp::new();
    for peer in [CI_RUNNER, CAROL, "10.9.9.9"] {
        let resp = app.request("POST", "/api/v1alpha1/login", peer).await;
        assert_eq!(resp.status, StatusCode::FORBIDDEN, "peer {peer}");
        assert_eq!(resp.body["error"], "AUTH_DENIED");
    }
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_ambiguous_grant_is_bad_request() {
    let app = TestApp::new();
    let resp = app.request("POST", "/api/v1alpha1/login", BOB).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["error"], "MALFORMED_GRANT");
    assert!(app.store.get("bob").await.unwrap().is_none());
}

#[tokio::test]
async fn test_short_period_is_unprocessable() {
    let app = TestApp::new();
    let resp = app.request("POST", "/api/v1alpha1/login", DAVE).await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(resp.body["error"], "INVALID_RULE");
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_kubeconfig_follows_provisioning() {
    let app = TestApp::new();
    app.request("POST", "/api/v1alpha1/login", ALICE).await;

    let resp = app.request("GET", "/api/v1alpha1/kubeconfig", ALICE).await;
    assert_eq!(resp.status, StatusCode::ACCEPTED);
    assert_eq!(resp.body["error"], "NOT_READY");
    assert!(resp.headers.contains_key(header::RETRY_AFTER));

    app.reconcile("alice").await;

    let resp = app.request("GET", "/api/v1alpha1/kubeconfig", ALICE).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["apiVersion"], "v1");
    assert_eq!(resp.body["kind"], "Config");
    assert_eq!(resp.body["users"][0]["name"], "meshgate-user-alice");
    assert!(resp.body["users"][0]["user"]["token"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn test_logout_flow() {
    let app = TestApp::new();
    app.request("POST", "/api/v1alpha1/login", ALICE).await;
    app.reconcile("alice").await;

    let resp = app.request("POST", "/api/v1alpha1/logout", ALICE).await;
    assert_eq!(resp.status, StatusCode::ACCEPTED);
    assert_eq!(resp.body["data"]["outcome"], "pending");

    app.reconcile("alice").await;

    let resp = app.request("POST", "/api/v1alpha1/logout", ALICE).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["outcome"], "already_signed_out");

    let resp = app.request("GET", "/api/v1alpha1/kubeconfig", ALICE).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_kubeconfig_withheld_during_role_change() {
    let app = TestApp::new();
    app.request("POST", "/api/v1alpha1/login", ALICE).await;
    app.reconcile("alice").await;

    // The old binding stays until the reconciler replaces it.
    app.signin
        .sign_in("alice", "admin", std::time::Duration::from_secs(15 * 60))
        .await
        .unwrap();
    let resp = app.request("GET", "/api/v1alpha1/kubeconfig", ALICE).await;
    assert_eq!(resp.status, StatusCode::ACCEPTED);
    assert_eq!(resp.body["error"], "NOT_READY");

    app.reconcile("alice").await;
    let resp = app.request("GET", "/api/v1alpha1/kubeconfig", ALICE).await;
    assert_eq!(resp.status, StatusCode::OK);
}
