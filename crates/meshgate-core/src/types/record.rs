//! The persisted sign-in record and its derived views.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::duration;

/// Desired and observed state of one user's temporary access.
///
/// Keyed by `username`, which never changes after creation. The façade
/// writes `spec`; the reconciler writes `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInRecord {
    /// Record key.
    pub username: String,
    /// Desired state.
    pub spec: SignInSpec,
    /// Observed provisioning state.
    pub status: SignInStatus,
    /// Store-assigned version used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,
    /// When the record was first created.
    pub created_at: DateTime<Utc>,
}

/// Desired state written by the façade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInSpec {
    /// Cluster role to bind.
    pub role: String,
    /// Validity period counted from provisioning.
    #[serde(with = "duration::as_str")]
    pub validity_period: Duration,
    /// Time of the last spec update.
    pub updated_at: DateTime<Utc>,
    /// Incremented on every spec write.
    pub generation: u64,
    /// Immediate-deprovision intent set by logout.
    #[serde(default)]
    pub logout_requested: bool,
}

/// Observed state written by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInStatus {
    /// Whether the downstream access grant exists.
    pub provisioned: bool,
    /// Expiry of the active grant.
    pub valid_until: Option<DateTime<Utc>>,
    /// Role the active grant is bound to.
    pub provisioned_role: Option<String>,
    /// Spec generation the reconciler last converged.
    pub observed_generation: u64,
    /// Last provisioning failure, once retries are exhausted.
    pub last_error: Option<String>,
    /// Consecutive failed attempts behind `last_error`.
    #[serde(default)]
    pub failed_attempts: u32,
}

/// Lifecycle phase derived from spec and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordPhase {
    /// Spec accepted, access not provisioned yet.
    Pending,
    /// Access is active.
    Provisioned,
    /// Logout requested, revocation not yet observed.
    Deprovisioning,
    /// Access revoked and the record is retained without effect.
    Inert,
}

impl std::fmt::Display for RecordPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordPhase::Pending => write!(f, "pending"),
            RecordPhase::Provisioned => write!(f, "provisioned"),
            RecordPhase::Deprovisioning => write!(f, "deprovisioning"),
            RecordPhase::Inert => write!(f, "inert"),
        }
    }
}

impl SignInRecord {
    /// Builds a new, unprovisioned record at generation 1.
    pub fn new(
        username: impl Into<String>,
        role: impl Into<String>,
        validity_period: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.into(),
            spec: SignInSpec {
                role: role.into(),
                validity_period,
                updated_at: now,
                generation: 1,
                logout_requested: false,
            },
            status: SignInStatus::default(),
            resource_version: 0,
            created_at: now,
        }
    }

    /// Whether the spec has changed since the reconciler last converged.
    pub fn has_unobserved_spec(&self) -> bool {
        self.status.observed_generation < self.spec.generation
    }

    /// Derives the lifecycle phase.
    pub fn phase(&self) -> RecordPhase {
        if self.spec.logout_requested && self.has_unobserved_spec() {
            RecordPhase::Deprovisioning
        } else if self.status.provisioned {
            RecordPhase::Provisioned
        } else if self.has_unobserved_spec() {
            RecordPhase::Pending
        } else {
            RecordPhase::Inert
        }
    }

    /// Estimated expiry for a record that has not been provisioned yet.
    pub fn estimated_valid_until(&self) -> DateTime<Utc> {
        let period = chrono::Duration::from_std(self.spec.validity_period)
            .unwrap_or(chrono::Duration::MAX);
        self.spec
            .updated_at
            .checked_add_signed(period)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Externally visible projection of the record.
    pub fn view(&self) -> SignInView {
        let (valid_until, estimated) = match (self.status.provisioned, self.status.valid_until) {
            (true, Some(until)) => (until, false),
            _ => (self.estimated_valid_until(), true),
        };

        SignInView {
            username: self.username.clone(),
            role: self.spec.role.clone(),
            provisioned: self.status.provisioned,
            valid_until,
            estimated,
            phase: self.phase(),
        }
    }
}

/// What callers of `Status` see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInView {
    /// Record key.
    pub username: String,
    /// Requested role.
    pub role: String,
    /// Whether access is active.
    pub provisioned: bool,
    /// Expiry, actual or estimated.
    pub valid_until: DateTime<Utc>,
    /// `true` when `valid_until` is an estimate.
    pub estimated: bool,
    /// Lifecycle phase.
    pub phase: RecordPhase,
}
