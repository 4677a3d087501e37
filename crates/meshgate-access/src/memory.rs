//! In-process cluster object API backed by `DashMap`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use uuid::Uuid;

use meshgate_core::error::AppError;
use meshgate_core::result::AppResult;
use meshgate_core::traits::AccessApi;
use meshgate_core::types::grant::{Principal, RoleBinding};

/// Snapshot of stored objects and call counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApiStats {
    /// Stored principals.
    pub principals: usize,
    /// Stored bindings.
    pub bindings: usize,
    /// Successful create calls.
    pub creates: u64,
    /// Successful update calls.
    pub updates: u64,
    /// Successful delete calls.
    pub deletes: u64,
    /// Issued tokens.
    pub tokens_issued: u64,
}

/// [`AccessApi`] that keeps objects in memory.
///
/// Used for single-node development and as the cluster double in tests;
/// [`MemoryAccessApi::fail_next`] injects failures into mutating calls.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccessApi {
    principals: Arc<DashMap<String, Principal>>,
    bindings: Arc<DashMap<String, RoleBinding>>,
    creates: Arc<AtomicU64>,
    updates: Arc<AtomicU64>,
    deletes: Arc<AtomicU64>,
    tokens_issued: Arc<AtomicU64>,
    pending_failures: Arc<AtomicU32>,
}

impl MemoryAccessApi {
    /// Creates an empty API.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` mutating calls fail with an internal error.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Current object counts and call counters.
    pub fn stats(&self) -> ApiStats {
        ApiStats {
            principals: self.principals.len(),
            bindings: self.bindings.len(),
            creates: self.creates.load(Ordering::SeqCst),
            updates: self.updates.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
            tokens_issued: self.tokens_issued.load(Ordering::SeqCst),
        }
    }

    fn injected_failure(&self, op: &str) -> AppResult<()> {
        let took = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            return Err(AppError::internal(format!("injected failure during {op}")));
        }
        Ok(())
    }
}

#[async_trait]
impl AccessApi for MemoryAccessApi {
    async fn get_principal(&self, name: &str) -> AppResult<Option<Principal>> {
        Ok(self.principals.get(name).map(|p| p.value().clone()))
    }

    async fn create_principal(&self, principal: &Principal) -> AppResult<()> {
        self.injected_failure("create_principal")?;
        match self.principals.entry(principal.name.clone()) {
            Entry::Occupied(_) => Err(AppError::already_exists(format!(
                "principal '{}' already exists",
                principal.name
            ))),
            Entry::Vacant(slot) => {
                slot.insert(principal.clone());
                self.creates.fetch_add(1, Ordering::SeqCst);
                debug!(name = %principal.name, "Principal created");
                Ok(())
            }
        }
    }

    async fn update_principal(&self, principal: &Principal) -> AppResult<()> {
        self.injected_failure("update_principal")?;
        let mut stored = self.principals.get_mut(&principal.name).ok_or_else(|| {
            AppError::not_found(format!("principal '{}' not found", principal.name))
        })?;

        if stored.namespace != principal.namespace {
            return Err(AppError::validation(format!(
                "principal '{}': namespace is immutable",
                principal.name
            )));
        }

        stored.labels = principal.labels.clone();
        stored.annotations = principal.annotations.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_principal(&self, name: &str) -> AppResult<()> {
        self.injected_failure("delete_principal")?;
        match self.principals.remove(name) {
            Some(_) => {
                self.deletes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(AppError::not_found(format!("principal '{name}' not found"))),
        }
    }

    async fn get_binding(&self, name: &str) -> AppResult<Option<RoleBinding>> {
        Ok(self.bindings.get(name).map(|b| b.value().clone()))
    }

    async fn create_binding(&self, binding: &RoleBinding) -> AppResult<()> {
        self.injected_failure("create_binding")?;
        match self.bindings.entry(binding.name.clone()) {
            Entry::Occupied(_) => Err(AppError::already_exists(format!(
                "role binding '{}' already exists",
                binding.name
            ))),
            Entry::Vacant(slot) => {
                slot.insert(binding.clone());
                self.creates.fetch_add(1, Ordering::SeqCst);
                debug!(name = %binding.name, role = %binding.role, "Role binding created");
                Ok(())
            }
        }
    }

    async fn update_binding(&self, binding: &RoleBinding) -> AppResult<()> {
        self.injected_failure("update_binding")?;
        let mut stored = self.bindings.get_mut(&binding.name).ok_or_else(|| {
            AppError::not_found(format!("role binding '{}' not found", binding.name))
        })?;

        if stored.role != binding.role {
            return Err(AppError::validation(format!(
                "role binding '{}': role reference is immutable",
                binding.name
            )));
        }

        stored.labels = binding.labels.clone();
        stored.annotations = binding.annotations.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_binding(&self, name: &str) -> AppResult<()> {
        self.injected_failure("delete_binding")?;
        match self.bindings.remove(name) {
            Some(_) => {
                self.deletes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(AppError::not_found(format!("role binding '{name}' not found"))),
        }
    }

    async fn list_managed_bindings(&self) -> AppResult<Vec<RoleBinding>> {
        Ok(self
            .bindings
            .iter()
            .filter(|b| b.value().is_managed())
            .map(|b| b.value().clone())
            .collect())
    }

    async fn issue_token(&self, principal: &str, ttl: Duration) -> AppResult<String> {
        if !self.principals.contains_key(principal) {
            return Err(AppError::not_found(format!("principal '{principal}' not found")));
        }

        let mut raw = Vec::with_capacity(32);
        raw.extend_from_slice(Uuid::new_v4().as_bytes());
        raw.extend_from_slice(Uuid::new_v4().as_bytes());
        self.tokens_issued.fetch_add(1, Ordering::SeqCst);

        debug!(principal = %principal, ttl_seconds = ttl.as_secs(), "Token issued");
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }
}
