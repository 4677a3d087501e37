//! In-memory record store using `DashMap` and a Tokio broadcast channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;
use tracing::debug;

use meshgate_core::error::AppError;
use meshgate_core::events::{EventReason, RecordEvent};
use meshgate_core::result::AppResult;
use meshgate_core::traits::record_store::{EventSource, RecordStore, WatchSignal};
use meshgate_core::types::record::SignInRecord;

/// Default capacity of the change-notification channel.
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// In-memory, versioned record store.
///
/// Suitable for single-node deployments only. Every successful write
/// assigns a fresh, store-wide increasing `resource_version`.
#[derive(Debug, Clone)]
pub struct MemoryRecordStore {
    /// Records keyed by username.
    records: Arc<DashMap<String, SignInRecord>>,
    /// Version counter shared by all keys.
    version: Arc<AtomicU64>,
    /// Change-notification fan-out.
    events: broadcast::Sender<RecordEvent>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Creates an empty store whose watchers may lag behind by at most
    /// `capacity` events before they are told to resync.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            records: Arc::new(DashMap::new()),
            version: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish(&self, key: &str, reason: EventReason) {
        // No subscribers is not an error; the next resync picks the key up.
        let _ = self.events.send(RecordEvent::new(key, reason));
        debug!(key = %key, reason = %reason, "Record change published");
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, username: &str) -> AppResult<Option<SignInRecord>> {
        Ok(self.records.get(username).map(|entry| entry.value().clone()))
    }

    async fn create(&self, mut record: SignInRecord) -> AppResult<SignInRecord> {
        let key = record.username.clone();
        match self.records.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::conflict(format!(
                    "sign-in record '{key}' already exists"
                )));
            }
            Entry::Vacant(slot) => {
                record.resource_version = self.next_version();
                slot.insert(record.clone());
            }
        }

        self.publish(&key, EventReason::Created);
        Ok(record)
    }

    async fn update(&self, mut record: SignInRecord) -> AppResult<SignInRecord> {
        let key = record.username.clone();
        {
            let mut stored = self
                .records
                .get_mut(&key)
                .ok_or_else(|| AppError::not_found(format!("sign-in record '{key}' not found")))?;

            if stored.resource_version != record.resource_version {
                return Err(AppError::conflict(format!(
                    "sign-in record '{key}' was modified (have version {}, stored {})",
                    record.resource_version, stored.resource_version
                )));
            }

            record.resource_version = self.next_version();
            *stored = record.clone();
        }

        self.publish(&key, EventReason::Updated);
        Ok(record)
    }

    async fn delete(&self, username: &str, resource_version: Option<u64>) -> AppResult<bool> {
        match self.records.entry(username.to_string()) {
            Entry::Vacant(_) => return Ok(false),
            Entry::Occupied(slot) => {
                if let Some(expected) = resource_version {
                    let stored = slot.get().resource_version;
                    if stored != expected {
                        return Err(AppError::conflict(format!(
                            "sign-in record '{username}' was modified (have version {expected}, stored {stored})"
                        )));
                    }
                }
                slot.remove();
            }
        }

        self.publish(username, EventReason::Deleted);
        Ok(true)
    }

    async fn list_keys(&self) -> AppResult<Vec<String>> {
        Ok(self.records.iter().map(|entry| entry.key().clone()).collect())
    }

    fn watch(&self) -> Box<dyn EventSource> {
        Box::new(BroadcastEventSource {
            rx: self.events.subscribe(),
        })
    }
}

/// [`EventSource`] over a broadcast receiver.
#[derive(Debug)]
pub struct BroadcastEventSource {
    rx: broadcast::Receiver<RecordEvent>,
}

#[async_trait]
impl EventSource for BroadcastEventSource {
    async fn next_signal(&mut self) -> Option<WatchSignal> {
        match self.rx.recv().await {
            Ok(event) => Some(WatchSignal::Event(event)),
            Err(broadcast::error::RecvError::Lagged(missed)) => Some(WatchSignal::Lagged(missed)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
