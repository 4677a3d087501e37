//! Read-only projection of a provisioned grant into connection credentials.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use meshgate_core::config::ClusterConfig;
use meshgate_core::error::AppError;
use meshgate_core::traits::{AccessApi, Clock, RecordStore};
use meshgate_core::types::RecordPhase;

use crate::naming::NameResolver;

/// Connection credentials for one signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Cluster name.
    pub cluster_name: String,
    /// API server URL.
    pub server_url: String,
    /// Base64 CA bundle, empty for system roots.
    pub ca_data: String,
    /// Namespace of the principal.
    pub namespace: String,
    /// Principal the token belongs to.
    pub principal: String,
    /// Bearer token.
    pub token: String,
    /// When the token and the grant stop working.
    pub expires_at: DateTime<Utc>,
}

/// Produces credentials from provisioned access objects.
///
/// Never creates or changes grants. Credentials are only issued once the
/// sign-in record reports the current spec as provisioned, so a pending
/// role change never yields a token for the old binding.
#[derive(Clone)]
pub struct CredentialIssuer {
    records: Arc<dyn RecordStore>,
    api: Arc<dyn AccessApi>,
    names: NameResolver,
    cluster: ClusterConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CredentialIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialIssuer")
            .field("cluster", &self.cluster.name)
            .finish()
    }
}

impl CredentialIssuer {
    /// Creates an issuer.
    pub fn new(
        records: Arc<dyn RecordStore>,
        api: Arc<dyn AccessApi>,
        names: NameResolver,
        cluster: ClusterConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            records,
            api,
            names,
            cluster,
            clock,
        }
    }

    /// Issues credentials bounded by the grant's expiry annotation.
    pub async fn materialize(&self, username: &str) -> Result<Credentials, AppError> {
        let record = self
            .records
            .get(username)
            .await?
            .ok_or_else(|| AppError::not_found(format!("no sign-in record for '{username}'")))?;

        match record.phase() {
            RecordPhase::Provisioned => {}
            RecordPhase::Pending => {
                if let Some(error) = &record.status.last_error {
                    return Err(AppError::internal(format!(
                        "provisioning for '{username}' failed: {error}"
                    )));
                }
                return Err(AppError::not_ready(format!(
                    "access for '{username}' is not provisioned yet"
                )));
            }
            RecordPhase::Deprovisioning | RecordPhase::Inert => {
                return Err(AppError::not_found(format!("'{username}' is signed out")));
            }
        }

        let name = self.names.object_name(username);
        let binding = self
            .api
            .get_binding(&name)
            .await?
            .filter(|binding| {
                record.status.provisioned_role.as_deref() == Some(binding.role.as_str())
            })
            .ok_or_else(|| {
                AppError::not_ready(format!("access for '{username}' is being converged"))
            })?;

        let expires_at = binding.valid_until().ok_or_else(|| {
            AppError::internal(format!("role binding '{name}' has no expiry annotation"))
        })?;

        let now = self.clock.now();
        let ttl = (expires_at - now)
            .to_std()
            .map_err(|_| AppError::not_found(format!("access for '{username}' has expired")))?;

        let token = self.api.issue_token(&binding.principal, ttl).await?;

        info!(username = %username, principal = %binding.principal, expires_at = %expires_at, "Credentials materialized");

        Ok(Credentials {
            cluster_name: self.cluster.name.clone(),
            server_url: self.cluster.server_url.clone(),
            ca_data: self.cluster.ca_data.clone(),
            namespace: binding.principal_namespace,
            principal: binding.principal,
            token,
            expires_at,
        })
    }
}

/// Kubeconfig document (JSON is valid kubeconfig YAML).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    /// Always `v1`.
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Always `Config`.
    pub kind: String,
    /// Cluster entries.
    pub clusters: Vec<NamedCluster>,
    /// User entries.
    pub users: Vec<NamedUser>,
    /// Context entries.
    pub contexts: Vec<NamedContext>,
    /// Selected context.
    pub current_context: String,
}

/// Named cluster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    /// Entry name.
    pub name: String,
    /// Cluster details.
    pub cluster: ClusterEntry,
}

/// Cluster connection details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    /// API server URL.
    pub server: String,
    /// Base64 CA bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
}

/// Named user entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    /// Entry name.
    pub name: String,
    /// User credentials.
    pub user: UserEntry,
}

/// User credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    /// Bearer token.
    pub token: String,
}

/// Named context entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    /// Entry name.
    pub name: String,
    /// Context details.
    pub context: ContextEntry,
}

/// Context details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Cluster entry name.
    pub cluster: String,
    /// User entry name.
    pub user: String,
    /// Default namespace.
    pub namespace: String,
}

impl Credentials {
    /// Renders a single-context kubeconfig.
    pub fn to_kubeconfig(&self) -> Kubeconfig {
        let context = format!("{}@{}", self.principal, self.cluster_name);
        Kubeconfig {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: vec![NamedCluster {
                name: self.cluster_name.clone(),
                cluster: ClusterEntry {
                    server: self.server_url.clone(),
                    certificate_authority_data: (!self.ca_data.is_empty())
                        .then(|| self.ca_data.clone()),
                },
            }],
            users: vec![NamedUser {
                name: self.principal.clone(),
                user: UserEntry {
                    token: self.token.clone(),
                },
            }],
            contexts: vec![NamedContext {
                name: context.clone(),
                context: ContextEntry {
                    cluster: self.cluster_name.clone(),
                    user: self.principal.clone(),
                    namespace: self.namespace.clone(),
                },
            }],
            current_context: context,
        }
    }
}
