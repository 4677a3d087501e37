//! Route definitions for the Meshgate HTTP API.
//!
//! All routes are mounted under `/api`. The router receives `AppState`
//! and passes it to all handlers via Axum's `State` extractor.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`;
/// callers are identified by their peer address.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(signin_routes())
        .merge(health_routes());

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Sign-in endpoints: login, status, logout, kubeconfig
fn signin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1alpha1/login",
            post(handlers::signin::login).get(handlers::signin::status),
        )
        .route("/v1alpha1/logout", post(handlers::signin::logout))
        .route("/v1alpha1/kubeconfig", get(handlers::signin::kubeconfig))
}

/// Health endpoint
fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}
