//! Mesh identity resolution configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identity resolver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Peers known to the static development resolver.
    #[serde(default)]
    pub static_peers: Vec<StaticPeerConfig>,
}

/// A single mesh peer entry for the static resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticPeerConfig {
    /// Peer IP address on the mesh.
    pub address: String,
    /// Login name of the node owner.
    pub login_name: String,
    /// Whether the node is tagged (a service identity).
    #[serde(default)]
    pub tagged: bool,
    /// Whether traffic from this peer arrives via public ingress.
    #[serde(default)]
    pub via_public_ingress: bool,
    /// Capability grants, keyed by capability key.
    #[serde(default)]
    pub grants: HashMap<String, Vec<serde_json::Value>>,
}
