//! Capability, retention, and downstream cluster configuration.

use serde::{Deserialize, Serialize};

/// Access control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Capability key whose grants authorize cluster access.
    #[serde(default = "default_capability_key")]
    pub capability_key: String,
    /// What happens to a sign-in record once its access is revoked.
    #[serde(default)]
    pub retention: RetentionPolicy,
    /// Prefix for every downstream object name.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Cluster connection details used for credential materialization.
    #[serde(default)]
    pub cluster: ClusterConfig,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            capability_key: default_capability_key(),
            retention: RetentionPolicy::default(),
            name_prefix: default_name_prefix(),
            cluster: ClusterConfig::default(),
        }
    }
}

/// Retention policy applied after expiry or logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Delete the sign-in record.
    #[default]
    Delete,
    /// Keep the record, reset to unprovisioned and inert.
    Retain,
}

impl std::fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetentionPolicy::Delete => write!(f, "delete"),
            RetentionPolicy::Retain => write!(f, "retain"),
        }
    }
}

/// Downstream cluster connection details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name written into kubeconfig documents.
    #[serde(default = "default_cluster_name")]
    pub name: String,
    /// API server URL.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Base64-encoded CA bundle. Empty means the client's system roots.
    #[serde(default)]
    pub ca_data: String,
    /// Namespace that holds the provisioned principals.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            server_url: default_server_url(),
            ca_data: String::new(),
            namespace: default_namespace(),
        }
    }
}

fn default_capability_key() -> String {
    "meshgate.dev/cap/cluster-access".to_string()
}

fn default_name_prefix() -> String {
    "meshgate-user".to_string()
}

fn default_cluster_name() -> String {
    "meshgate".to_string()
}

fn default_server_url() -> String {
    "https://kubernetes.default.svc".to_string()
}

fn default_namespace() -> String {
    "meshgate-system".to_string()
}
