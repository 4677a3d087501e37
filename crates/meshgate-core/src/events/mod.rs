//! Record-change notifications emitted by the record store.
//!
//! The reconciler consumes these through an [`EventSource`] and only uses
//! the key: every reconciliation re-reads the record, so events carry no
//! payload beyond the reason.
//!
//! [`EventSource`]: crate::traits::record_store::EventSource

use serde::{Deserialize, Serialize};

/// Why a key needs reconciling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventReason {
    /// The record was created.
    Created,
    /// The record was updated.
    Updated,
    /// The record was deleted.
    Deleted,
    /// Periodic or recovery resync.
    Resync,
}

impl std::fmt::Display for EventReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventReason::Created => write!(f, "created"),
            EventReason::Updated => write!(f, "updated"),
            EventReason::Deleted => write!(f, "deleted"),
            EventReason::Resync => write!(f, "resync"),
        }
    }
}

/// A change notification for one record key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEvent {
    /// Username of the changed record.
    pub key: String,
    /// What happened.
    pub reason: EventReason,
}

impl RecordEvent {
    /// Creates a new event.
    pub fn new(key: impl Into<String>, reason: EventReason) -> Self {
        Self {
            key: key.into(),
            reason,
        }
    }
}
