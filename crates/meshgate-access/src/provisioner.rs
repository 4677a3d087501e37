//! Idempotent provisioning of the downstream principal and role binding.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{Instrument, Span, debug, info, info_span, warn};

use meshgate_core::error::{AppError, ErrorKind};
use meshgate_core::traits::AccessApi;
use meshgate_core::types::grant::{
    AccessGrant, MANAGED_BY_LABEL, MANAGED_BY_VALUE, Principal, RoleBinding,
    USERNAME_ANNOTATION, VALID_UNTIL_ANNOTATION,
};

use crate::naming::NameResolver;

/// What happened to the principal during provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalChange {
    /// The principal was created.
    Created,
    /// The labels or annotations were updated in place.
    Updated,
    /// The principal already matched the desired state.
    Unchanged,
}

/// What happened to the role binding during provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingChange {
    /// The binding was created.
    Created,
    /// The binding pointed at another role and was deleted and recreated.
    Replaced,
    /// The expiry annotation or labels were updated in place.
    Updated,
    /// The binding already matched the desired state.
    Unchanged,
}

/// Result of a [`AccessProvisioner::provision`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    /// Name of the principal and binding.
    pub object_name: String,
    /// Principal change.
    pub principal: PrincipalChange,
    /// Binding change.
    pub binding: BindingChange,
}

impl ProvisionOutcome {
    /// Whether the call left the cluster untouched.
    pub fn is_noop(&self) -> bool {
        self.principal == PrincipalChange::Unchanged && self.binding == BindingChange::Unchanged
    }
}

/// Creates, converges, and removes the access objects of a username.
///
/// Every operation is safe to repeat: provisioning is an upsert that
/// converges to the desired end-state, and deprovisioning treats missing
/// objects as already removed.
#[derive(Clone)]
pub struct AccessProvisioner {
    /// Downstream cluster API.
    api: Arc<dyn AccessApi>,
    /// Username to object-name mapping.
    names: NameResolver,
    /// Namespace of the principals.
    namespace: String,
    /// Span all provisioning work runs in.
    span: Span,
}

impl std::fmt::Debug for AccessProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessProvisioner")
            .field("names", &self.names)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl AccessProvisioner {
    /// Creates a provisioner.
    pub fn new(api: Arc<dyn AccessApi>, names: NameResolver, namespace: impl Into<String>) -> Self {
        Self {
            api,
            names,
            namespace: namespace.into(),
            span: info_span!("access_provisioner"),
        }
    }

    /// Runs all work inside `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Object name used for `username`.
    pub fn object_name(&self, username: &str) -> String {
        self.names.object_name(username)
    }

    /// The principal + binding pair `username` should have.
    pub fn desired_grant(
        &self,
        username: &str,
        role: &str,
        valid_until: DateTime<Utc>,
    ) -> AccessGrant {
        let name = self.object_name(username);

        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());

        let mut principal_annotations = BTreeMap::new();
        principal_annotations.insert(USERNAME_ANNOTATION.to_string(), username.to_string());

        let mut binding_annotations = principal_annotations.clone();
        binding_annotations.insert(
            VALID_UNTIL_ANNOTATION.to_string(),
            valid_until.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        AccessGrant {
            principal: Principal {
                name: name.clone(),
                namespace: self.namespace.clone(),
                labels: labels.clone(),
                annotations: principal_annotations,
            },
            binding: RoleBinding {
                name: name.clone(),
                principal: name,
                principal_namespace: self.namespace.clone(),
                role: role.to_string(),
                labels,
                annotations: binding_annotations,
            },
        }
    }

    /// Ensures `username` holds exactly `role` until `valid_until`.
    pub async fn provision(
        &self,
        username: &str,
        role: &str,
        valid_until: DateTime<Utc>,
    ) -> Result<ProvisionOutcome, AppError> {
        let desired = self.desired_grant(username, role, valid_until);

        async {
            let principal = match self.api.create_principal(&desired.principal).await {
                Ok(()) => PrincipalChange::Created,
                Err(e) if e.is(ErrorKind::AlreadyExists) => {
                    self.converge_principal(&desired.principal).await?
                }
                Err(e) => return Err(e),
            };

            let binding = match self.api.create_binding(&desired.binding).await {
                Ok(()) => BindingChange::Created,
                Err(e) if e.is(ErrorKind::AlreadyExists) => {
                    self.converge_binding(&desired.binding).await?
                }
                Err(e) => return Err(e),
            };

            let outcome = ProvisionOutcome {
                object_name: desired.principal.name.clone(),
                principal,
                binding,
            };

            if outcome.is_noop() {
                debug!(username = %username, name = %outcome.object_name, "Access already provisioned");
            } else {
                info!(
                    username = %username,
                    role = %role,
                    name = %outcome.object_name,
                    principal = ?outcome.principal,
                    binding = ?outcome.binding,
                    valid_until = %valid_until,
                    "Access provisioned"
                );
            }

            Ok::<_, AppError>(outcome)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Brings an existing principal's metadata to the desired state.
    ///
    /// The principal is never recreated; that would invalidate tokens
    /// already issued for it.
    async fn converge_principal(&self, desired: &Principal) -> Result<PrincipalChange, AppError> {
        let Some(existing) = self.api.get_principal(&desired.name).await? else {
            self.api.create_principal(desired).await?;
            return Ok(PrincipalChange::Created);
        };

        if existing.labels != desired.labels || existing.annotations != desired.annotations {
            self.api.update_principal(desired).await?;
            return Ok(PrincipalChange::Updated);
        }

        Ok(PrincipalChange::Unchanged)
    }

    /// Brings an existing binding to the desired state.
    async fn converge_binding(&self, desired: &RoleBinding) -> Result<BindingChange, AppError> {
        let Some(existing) = self.api.get_binding(&desired.name).await? else {
            // Deleted between the create attempt and the read.
            self.api.create_binding(desired).await?;
            return Ok(BindingChange::Created);
        };

        if existing.role != desired.role
            || existing.principal != desired.principal
            || existing.principal_namespace != desired.principal_namespace
        {
            // The role reference is immutable, so a role change means a new
            // binding. The old one goes first so stale privilege never outlives it.
            warn!(
                name = %desired.name,
                from_role = %existing.role,
                to_role = %desired.role,
                "Replacing role binding"
            );
            self.delete_ignoring_missing_binding(&desired.name).await?;
            self.api.create_binding(desired).await?;
            return Ok(BindingChange::Replaced);
        }

        if existing.annotations != desired.annotations || existing.labels != desired.labels {
            self.api.update_binding(desired).await?;
            return Ok(BindingChange::Updated);
        }

        Ok(BindingChange::Unchanged)
    }

    /// Removes the access objects of `username`.
    ///
    /// Returns `true` if anything was deleted.
    pub async fn deprovision(&self, username: &str) -> Result<bool, AppError> {
        let name = self.object_name(username);

        async {
            let binding_deleted = self.delete_ignoring_missing_binding(&name).await?;
            let principal_deleted = match self.api.delete_principal(&name).await {
                Ok(()) => true,
                Err(e) if e.is(ErrorKind::NotFound) => false,
                Err(e) => return Err(e),
            };

            let deleted = binding_deleted || principal_deleted;
            if deleted {
                info!(username = %username, name = %name, "Access deprovisioned");
            } else {
                debug!(username = %username, name = %name, "Access already deprovisioned");
            }
            Ok::<_, AppError>(deleted)
        }
        .instrument(self.span.clone())
        .await
    }

    async fn delete_ignoring_missing_binding(&self, name: &str) -> Result<bool, AppError> {
        match self.api.delete_binding(name).await {
            Ok(()) => Ok(true),
            Err(e) if e.is(ErrorKind::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Every managed binding, for out-of-band garbage collection.
    pub async fn managed_bindings(&self) -> Result<Vec<RoleBinding>, AppError> {
        self.api.list_managed_bindings().await
    }
}
