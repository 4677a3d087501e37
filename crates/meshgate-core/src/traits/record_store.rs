//! Record store and change-notification traits.

use async_trait::async_trait;

use crate::events::RecordEvent;
use crate::result::AppResult;
use crate::types::record::SignInRecord;

/// Versioned store of sign-in records keyed by username.
///
/// Writes use optimistic concurrency: `update` and `delete` fail with
/// `ErrorKind::Conflict` when the caller's `resource_version` is stale,
/// and `create` fails with `ErrorKind::Conflict` when the key exists.
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch a record by username.
    async fn get(&self, username: &str) -> AppResult<Option<SignInRecord>>;

    /// Create a record. Returns it with its assigned version.
    async fn create(&self, record: SignInRecord) -> AppResult<SignInRecord>;

    /// Replace a record whose `resource_version` matches the stored one.
    async fn update(&self, record: SignInRecord) -> AppResult<SignInRecord>;

    /// Delete a record. `None` skips the version check.
    ///
    /// Returns `false` if the record did not exist.
    async fn delete(&self, username: &str, resource_version: Option<u64>) -> AppResult<bool>;

    /// List every record key, for full resyncs.
    async fn list_keys(&self) -> AppResult<Vec<String>>;

    /// Subscribe to change notifications.
    fn watch(&self) -> Box<dyn EventSource>;
}

/// Item yielded by an [`EventSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    /// A record changed.
    Event(RecordEvent),
    /// The subscriber fell behind and missed this many events.
    /// Consumers must fall back to a full resync.
    Lagged(u64),
}

/// Stream of record-change notifications.
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next signal. `None` means the source is closed.
    async fn next_signal(&mut self) -> Option<WatchSignal>;
}
