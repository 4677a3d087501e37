//! Reconcile runner. Feeds record changes into the work queue and runs
//! the reconcile workers until shutdown.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{self, Instrument};

use meshgate_core::config::ReconcilerConfig;
use meshgate_core::events::{EventReason, RecordEvent};
use meshgate_core::result::AppResult;
use meshgate_core::traits::{RecordStore, WatchSignal};

use crate::queue::WorkQueue;
use crate::reconciler::{Action, Reconciler};

/// Runs reconcile workers over a shared [`WorkQueue`]
#[derive(Debug)]
pub struct ReconcileRunner {
    /// Per-key reconcile logic
    reconciler: Arc<Reconciler>,
    /// Record store to watch and resync from
    store: Arc<dyn RecordStore>,
    /// Pending keys
    queue: Arc<WorkQueue>,
    /// Worker configuration
    config: ReconcilerConfig,
}

impl ReconcileRunner {
    /// Create a new runner
    pub fn new(
        reconciler: Arc<Reconciler>,
        store: Arc<dyn RecordStore>,
        config: ReconcilerConfig,
    ) -> Self {
        let queue = Arc::new(WorkQueue::new(config.base_backoff(), config.max_backoff()));
        Self {
            reconciler,
            store,
            queue,
            config,
        }
    }

    /// The queue workers pull from
    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    /// Queues every stored record
    pub async fn resync(&self) -> AppResult<usize> {
        let keys = self.store.list_keys().await?;
        let queued = keys.len();
        for key in keys {
            self.enqueue(RecordEvent::new(key, EventReason::Resync)).await;
        }
        tracing::debug!("Resync queued {} records", queued);
        Ok(queued)
    }

    /// Queues the key of a record-change notification
    pub async fn enqueue(&self, event: RecordEvent) {
        tracing::trace!("Record {} {}", event.key, event.reason);
        self.queue.add_change(&event.key).await;
    }

    /// Reconciles one key and decides when it runs next.
    ///
    /// The caller must have taken `key` from the queue.
    pub async fn process_key(&self, key: &str) {
        let span = tracing::info_span!("reconcile", username = %key);
        let result = self.reconciler.reconcile(key).instrument(span.clone()).await;

        match result {
            Ok(Action::RequeueAfter(delay)) => {
                self.queue.forget(key).await;
                self.queue.add_after(key, delay).await;
                tracing::debug!(parent: &span, "Next reconcile in {}s", delay.as_secs());
            }
            Ok(Action::AwaitChange) => {
                self.queue.forget(key).await;
            }
            Err(e) if e.is_stale() => {
                tracing::debug!(parent: &span, "Record changed during reconcile: {}", e);
                self.queue.add(key).await;
            }
            Err(e) => {
                let delay = self.queue.add_rate_limited(key).await;
                let attempts = self.queue.num_requeues(key).await;
                tracing::warn!(
                    parent: &span,
                    attempt = attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    "Reconcile failed: {}",
                    e
                );

                if attempts >= self.config.max_retries {
                    if attempts == self.config.max_retries {
                        tracing::error!(
                            parent: &span,
                            "Giving up fast retries after {} attempts: {}",
                            attempts,
                            e
                        );
                    }
                    if let Err(write_err) =
                        self.reconciler.surface_failure(key, attempts, &e).await
                    {
                        tracing::error!(parent: &span, "Failed to record failure: {}", write_err);
                    }
                }
            }
        }

        self.queue.done(key).await;
    }

    /// Start the runner; runs until the cancel signal is received
    pub async fn run(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        tracing::info!(
            "Reconcile runner started with concurrency={}, max_retries={}",
            self.config.concurrency,
            self.config.max_retries
        );

        // Subscribe before listing so no change slips between the two.
        let mut events = self.store.watch();
        if let Err(e) = self.resync().await {
            tracing::error!("Initial resync failed: {}", e);
        }

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.concurrency.max(1) {
            let runner = Arc::clone(&self);
            workers.spawn(async move {
                while let Some(key) = runner.queue.get().await {
                    runner.process_key(&key).await;
                }
                tracing::debug!("Reconcile worker {} stopped", worker_id);
            });
        }

        let mut watching = true;
        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        tracing::info!("Reconcile runner received shutdown signal");
                        break;
                    }
                }
                signal = events.next_signal(), if watching => match signal {
                    Some(WatchSignal::Event(event)) => self.enqueue(event).await,
                    Some(WatchSignal::Lagged(missed)) => {
                        tracing::warn!("Record watch lagged by {} events, resyncing", missed);
                        if let Err(e) = self.resync().await {
                            tracing::error!("Resync after lag failed: {}", e);
                        }
                    }
                    None => {
                        tracing::warn!("Record watch closed; relying on periodic resync");
                        watching = false;
                    }
                },
            }
        }

        self.queue.shut_down().await;
        tracing::info!("Waiting for in-flight reconciles to complete...");

        let drained = tokio::time::timeout(self.config.drain_timeout(), async {
            while workers.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                "In-flight reconciles did not finish within {}s, aborting",
                self.config.drain_timeout_seconds
            );
            workers.abort_all();
        }

        tracing::info!("Reconcile runner shut down complete");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use meshgate_access::{AccessProvisioner, MemoryAccessApi, NameResolver};
    use meshgate_core::config::RetentionPolicy;
    use meshgate_core::traits::ManualClock;
    use meshgate_core::types::SignInRecord;
    use meshgate_store::MemoryRecordStore;

    use super::*;

    fn runner(config: ReconcilerConfig) -> (MemoryRecordStore, Arc<MemoryAccessApi>, Arc<ReconcileRunner>) {
        let store = MemoryRecordStore::new();
        let api = Arc::new(MemoryAccessApi::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()));
        let provisioner = AccessProvisioner::new(
            api.clone(),
            NameResolver::new("meshgate-user"),
            "meshgate-system",
        );
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(store.clone()),
            provisioner,
            clock,
            RetentionPolicy::Delete,
        ));
        let runner = Arc::new(ReconcileRunner::new(reconciler, Arc::new(store.clone()), config));
        (store, api, runner)
    }

    fn record(username: &str) -> SignInRecord {
        SignInRecord::new(
            username,
            "viewer",
            Duration::from_secs(900),
            Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_surface_after_max_retries() {
        let config = ReconcilerConfig {
            max_retries: 3,
            ..ReconcilerConfig::default()
        };
        let (store, api, runner) = runner(config);
        store.create(record("alice")).await.unwrap();
        api.fail_next(100);

        for attempt in 1..=3 {
            runner.queue().add("alice").await;
            let key = runner.queue().get().await.unwrap();
            runner.process_key(&key).await;
            assert_eq!(runner.queue().num_requeues("alice").await, attempt);
        }

        let surfaced = store.get("alice").await.unwrap().unwrap();
        assert_eq!(surfaced.status.failed_attempts, 3);
        assert!(surfaced.status.last_error.is_some());
        assert!(!surfaced.status.provisioned);
    }

    #[tokio::test(start_paused = true)]
    async fn test_surfaced_failure_keeps_backoff() {
        let config = ReconcilerConfig {
            max_retries: 1,
            ..ReconcilerConfig::default()
        };
        let (store, api, runner) = runner(config);
        store.create(record("alice")).await.unwrap();
        let mut watch = store.watch();
        api.fail_next(100);

        runner.queue().add("alice").await;
        let key = runner.queue().get().await.unwrap();
        runner.process_key(&key).await;
        let retry_at = runner.queue().scheduled_at("alice").await;
        assert!(retry_at.is_some());

        // The status write that surfaced the failure comes back as a change.
        let Some(WatchSignal::Event(event)) = watch.next_signal().await else {
            panic!("expected the surfaced failure to be published");
        };
        assert_eq!(event.key, "alice");
        runner.enqueue(event).await;

        assert!(runner.queue().is_empty().await);
        assert_eq!(runner.queue().scheduled_at("alice").await, retry_at);
        assert!(store.get("alice").await.unwrap().unwrap().status.last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_backoff_and_schedules_expiry() {
        let (store, api, runner) = runner(ReconcilerConfig::default());
        store.create(record("alice")).await.unwrap();
        api.fail_next(1);

        runner.queue().add("alice").await;
        let key = runner.queue().get().await.unwrap();
        runner.process_key(&key).await;
        assert_eq!(runner.queue().num_requeues("alice").await, 1);

        // Released after the first backoff step.
        let key = runner.queue().get().await.unwrap();
        runner.process_key(&key).await;
        assert_eq!(runner.queue().num_requeues("alice").await, 0);
        assert!(runner.queue().scheduled_at("alice").await.is_some());
        assert!(store.get("alice").await.unwrap().unwrap().status.provisioned);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reconciles_changes_and_drains() {
        let (store, api, runner) = runner(ReconcilerConfig::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&runner).run(cancel_rx));

        store.create(record("alice")).await.unwrap();
        store.create(record("bob")).await.unwrap();

        for _ in 0..50 {
            if api.stats().bindings == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(api.stats().bindings, 2);

        cancel_tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(runner.queue().get().await.is_none());
    }
}
