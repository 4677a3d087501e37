//! Application state shared across all handlers and extractors.

use std::sync::Arc;

use meshgate_access::CredentialIssuer;
use meshgate_auth::{CapabilityExtractor, SignInManager};
use meshgate_core::config::AppConfig;
use meshgate_core::traits::IdentityResolver;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
/// All fields are `Arc`-wrapped for cheap cloning across tasks.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Mesh who-is lookup
    pub identity: Arc<dyn IdentityResolver>,
    /// Capability grant to access rule
    pub capabilities: Arc<CapabilityExtractor>,
    /// Sign-in façade
    pub signin: Arc<SignInManager>,
    /// Credential materialization
    pub credentials: Arc<CredentialIssuer>,
}
