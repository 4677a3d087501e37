//! Mesh network identity of an inbound caller.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identity produced by the mesh identity resolver for one request.
///
/// Never persisted. Capability grant payloads are kept as raw JSON here
/// and decoded by the capability extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Login name of the node owner (e.g. `alice@example.com`).
    pub login_name: String,
    /// Tagged nodes act as service identities and cannot sign in.
    pub is_service_account: bool,
    /// Traffic arrived through the public ingress rather than the mesh.
    pub via_public_ingress: bool,
    /// Capability grants keyed by capability key.
    pub capability_grants: HashMap<String, Vec<serde_json::Value>>,
}

impl Identity {
    /// Creates a user identity with no grants.
    pub fn user(login_name: impl Into<String>) -> Self {
        Self {
            login_name: login_name.into(),
            ..Self::default()
        }
    }

    /// Adds a grant payload under the given capability key.
    pub fn with_grant(mut self, key: impl Into<String>, payload: serde_json::Value) -> Self {
        self.capability_grants
            .entry(key.into())
            .or_default()
            .push(payload);
        self
    }

    /// Returns the grants recorded for a capability key.
    pub fn grants_for(&self, key: &str) -> &[serde_json::Value] {
        self.capability_grants
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
