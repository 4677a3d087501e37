//! Shared test helpers for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

use meshgate_access::{AccessProvisioner, CredentialIssuer, MemoryAccessApi, NameResolver};
use meshgate_api::AppState;
use meshgate_auth::{CapabilityExtractor, SignInManager, StaticIdentityResolver};
use meshgate_core::config::{AppConfig, RetentionPolicy};
use meshgate_core::traits::ManualClock;
use meshgate_core::types::Identity;
use meshgate_store::MemoryRecordStore;
use meshgate_worker::{ReconcileRunner, Reconciler};

/// Capability key used by every test peer.
pub const KEY: &str = "meshgate.dev/cap/cluster-access";

/// One `viewer` grant for 15 minutes.
pub const ALICE: &str = "100.64.0.1";
/// Two grants under the key.
pub const BOB: &str = "100.64.0.2";
/// Tagged node.
pub const CI_RUNNER: &str = "100.64.0.3";
/// No grant.
pub const CAROL: &str = "100.64.0.4";
/// Grant below the minimum validity.
pub const DAVE: &str = "100.64.0.5";

/// Fixed start time of every test.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

fn peers() -> StaticIdentityResolver {
    let viewer = json!({"role": "viewer", "period": "15m"});
    StaticIdentityResolver::new()
        .with_peer(
            ALICE.parse().unwrap(),
            Identity::user("alice").with_grant(KEY, viewer.clone()),
        )
        .with_peer(
            BOB.parse().unwrap(),
            Identity::user("bob")
                .with_grant(KEY, viewer.clone())
                .with_grant(KEY, json!({"role": "admin", "period": "1h"})),
        )
        .with_peer(
            CI_RUNNER.parse().unwrap(),
            Identity {
                is_service_account: true,
                ..Identity::user("ci-runner").with_grant(KEY, viewer)
            },
        )
        .with_peer(CAROL.parse().unwrap(), Identity::user("carol"))
        .with_peer(
            DAVE.parse().unwrap(),
            Identity::user("dave").with_grant(KEY, json!({"role": "viewer", "period": "5m"})),
        )
}

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Record store
    pub store: MemoryRecordStore,
    /// Downstream cluster double
    pub api: Arc<MemoryAccessApi>,
    /// Wall clock
    pub clock: Arc<ManualClock>,
    /// Reconcile runner (not started)
    pub runner: Arc<ReconcileRunner>,
    /// Sign-in façade
    pub signin: Arc<SignInManager>,
    /// Capability extractor
    pub capabilities: CapabilityExtractor,
}

impl TestApp {
    /// Create a new test application that deletes records on revocation
    pub fn new() -> Self {
        Self::with_retention(RetentionPolicy::Delete)
    }

    /// Create a new test application with the given retention policy
    pub fn with_retention(retention: RetentionPolicy) -> Self {
        let mut config = AppConfig::default();
        config.access.retention = retention;
        config.reconciler.logout_wait_seconds = 0;
        Self::with_config(config)
    }

    /// Create a new test application from a full configuration
    pub fn with_config(config: AppConfig) -> Self {
        let store = MemoryRecordStore::new();
        let api = Arc::new(MemoryAccessApi::new());
        let clock = Arc::new(ManualClock::new(t0()));

        let names = NameResolver::new(&config.access.name_prefix);
        let provisioner = AccessProvisioner::new(
            api.clone(),
            names.clone(),
            config.access.cluster.namespace.clone(),
        );
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(store.clone()),
            provisioner,
            clock.clone(),
            config.access.retention,
        ));
        let runner = Arc::new(ReconcileRunner::new(
            reconciler,
            Arc::new(store.clone()),
            config.reconciler.clone(),
        ));

        let capabilities = CapabilityExtractor::new(config.access.capability_key.clone());
        let signin = Arc::new(SignInManager::new(
            Arc::new(store.clone()),
            clock.clone(),
            &config.reconciler,
        ));
        let credentials = Arc::new(CredentialIssuer::new(
            Arc::new(store.clone()),
            api.clone(),
            names,
            config.access.cluster.clone(),
            clock.clone(),
        ));

        let state = AppState {
            config: Arc::new(config),
            identity: Arc::new(peers()),
            capabilities: Arc::new(capabilities.clone()),
            signin: Arc::clone(&signin),
            credentials,
        };

        Self {
            router: meshgate_api::build_router(state),
            store,
            api,
            clock,
            runner,
            signin,
            capabilities,
        }
    }

    /// Queue `username` and process every ready key, standing in for the
    /// watch notification or scheduled wake that would trigger it.
    pub async fn reconcile(&self, username: &str) {
        let queue = self.runner.queue();
        queue.add(username).await;
        while !queue.is_empty().await {
            let Some(key) = queue.get().await else { break };
            self.runner.process_key(&key).await;
        }
    }

    /// Advance the wall clock
    pub fn advance(&self, by: Duration) {
        self.clock
            .advance(chrono::Duration::from_std(by).expect("duration in range"));
    }

    /// Make a request from the given mesh peer
    pub async fn request(&self, method: &str, path: &str, peer: &str) -> TestResponse {
        let remote: SocketAddr = format!("{peer}:40000").parse().expect("valid peer address");

        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");
        req.extensions_mut().insert(ConnectInfo(remote));

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");

        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Simplified test response
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Parsed JSON body
    pub body: Value,
}
