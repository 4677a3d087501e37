//! Downstream access objects: the principal and its role binding.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Annotation carrying the owning username.
pub const USERNAME_ANNOTATION: &str = "meshgate.dev/username";
/// Annotation mirroring `status.valid_until` (RFC 3339).
pub const VALID_UNTIL_ANNOTATION: &str = "meshgate.dev/valid-until";
/// Label marking objects managed by Meshgate.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Value of [`MANAGED_BY_LABEL`].
pub const MANAGED_BY_VALUE: &str = "meshgate";

/// An identity principal (service account) in the target cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Object name.
    pub name: String,
    /// Namespace holding the principal.
    pub namespace: String,
    /// Object labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Object annotations.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// A binding from a principal to a cluster role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    /// Object name.
    pub name: String,
    /// Name of the bound principal.
    pub principal: String,
    /// Namespace of the bound principal.
    pub principal_namespace: String,
    /// Referenced cluster role. Immutable once created.
    pub role: String,
    /// Object labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Object annotations.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl RoleBinding {
    /// Owning username, if annotated.
    pub fn username(&self) -> Option<&str> {
        self.annotations.get(USERNAME_ANNOTATION).map(String::as_str)
    }

    /// Parsed expiry annotation.
    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.annotations
            .get(VALID_UNTIL_ANNOTATION)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Whether the binding is managed by Meshgate.
    pub fn is_managed(&self) -> bool {
        self.labels.get(MANAGED_BY_LABEL).map(String::as_str) == Some(MANAGED_BY_VALUE)
    }
}

/// The principal + binding pair that constitutes granted access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// The identity principal.
    pub principal: Principal,
    /// The role binding.
    pub binding: RoleBinding,
}
