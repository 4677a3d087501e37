//! Downstream provisioning API (the target cluster).

use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::grant::{Principal, RoleBinding};

/// Generic object API of the cluster where access is granted.
///
/// Create calls fail with `ErrorKind::AlreadyExists` on collision and
/// delete calls fail with `ErrorKind::NotFound` when the object is absent,
/// mirroring the API server. Callers decide which of those are benign.
#[async_trait]
pub trait AccessApi: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch a principal by name.
    async fn get_principal(&self, name: &str) -> AppResult<Option<Principal>>;

    /// Create a principal.
    async fn create_principal(&self, principal: &Principal) -> AppResult<()>;

    /// Replace the mutable parts (labels, annotations) of a principal.
    async fn update_principal(&self, principal: &Principal) -> AppResult<()>;

    /// Delete a principal.
    async fn delete_principal(&self, name: &str) -> AppResult<()>;

    /// Fetch a role binding by name.
    async fn get_binding(&self, name: &str) -> AppResult<Option<RoleBinding>>;

    /// Create a role binding.
    async fn create_binding(&self, binding: &RoleBinding) -> AppResult<()>;

    /// Replace the mutable parts (labels, annotations) of a role binding.
    async fn update_binding(&self, binding: &RoleBinding) -> AppResult<()>;

    /// Delete a role binding.
    async fn delete_binding(&self, name: &str) -> AppResult<()>;

    /// List every binding carrying the managed-by label.
    async fn list_managed_bindings(&self) -> AppResult<Vec<RoleBinding>>;

    /// Issue a bearer token for a principal, valid for at most `ttl`.
    async fn issue_token(&self, principal: &str, ttl: Duration) -> AppResult<String>;
}
