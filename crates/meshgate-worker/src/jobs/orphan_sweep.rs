//! Out-of-band detection of managed grants that outlived their record.
//!
//! Expiry is normally enforced by the reconciler's scheduled wake. This
//! sweep is the backstop for grants left behind while the controller was
//! down or a record was removed without a reconcile pass. It never touches
//! a grant itself: suspect keys go through the work queue, so revocation
//! stays serialized with every other pass for the same user.

use std::sync::Arc;

use meshgate_access::AccessProvisioner;
use meshgate_core::result::AppResult;
use meshgate_core::traits::{Clock, RecordStore};

use crate::queue::WorkQueue;

/// Requeues usernames whose managed grant has no live record behind it
#[derive(Clone)]
pub struct OrphanSweepJob {
    store: Arc<dyn RecordStore>,
    provisioner: AccessProvisioner,
    clock: Arc<dyn Clock>,
    queue: Arc<WorkQueue>,
}

impl std::fmt::Debug for OrphanSweepJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrphanSweepJob").finish()
    }
}

impl OrphanSweepJob {
    /// Create a new sweep job
    pub fn new(
        store: Arc<dyn RecordStore>,
        provisioner: AccessProvisioner,
        clock: Arc<dyn Clock>,
        queue: Arc<WorkQueue>,
    ) -> Self {
        Self {
            store,
            provisioner,
            clock,
            queue,
        }
    }

    /// Run one sweep, returning the number of requeued usernames
    pub async fn run(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let mut requeued = 0;

        for binding in self.provisioner.managed_bindings().await? {
            let Some(username) = binding.username() else {
                tracing::warn!("Managed binding '{}' has no username annotation", binding.name);
                continue;
            };

            let suspect = match self.store.get(username).await? {
                None => true,
                Some(_) => binding.valid_until().is_none_or(|until| until <= now),
            };
            if !suspect {
                continue;
            }

            tracing::warn!("Requeueing '{}' for orphaned grant '{}'", username, binding.name);
            self.queue.add(username).await;
            requeued += 1;
        }

        if requeued > 0 {
            tracing::info!("Orphan sweep requeued {} usernames", requeued);
        }
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use meshgate_access::{MemoryAccessApi, NameResolver};
    use meshgate_core::config::RetentionPolicy;
    use meshgate_core::traits::ManualClock;
    use meshgate_core::types::SignInRecord;
    use meshgate_store::MemoryRecordStore;

    use super::*;
    use crate::reconciler::Reconciler;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    struct Harness {
        store: MemoryRecordStore,
        api: Arc<MemoryAccessApi>,
        provisioner: AccessProvisioner,
        clock: Arc<ManualClock>,
        queue: Arc<WorkQueue>,
        reconciler: Reconciler,
        job: OrphanSweepJob,
    }

    fn setup() -> Harness {
        let store = MemoryRecordStore::new();
        let api = Arc::new(MemoryAccessApi::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let provisioner = AccessProvisioner::new(
            api.clone(),
            NameResolver::new("meshgate-user"),
            "meshgate-system",
        );
        let queue = Arc::new(WorkQueue::new(Duration::from_millis(100), Duration::from_secs(1)));
        let reconciler = Reconciler::new(
            Arc::new(store.clone()),
            provisioner.clone(),
            clock.clone(),
            RetentionPolicy::Delete,
        );
        let job = OrphanSweepJob::new(
            Arc::new(store.clone()),
            provisioner.clone(),
            clock.clone(),
            queue.clone(),
        );
        Harness {
            store,
            api,
            provisioner,
            clock,
            queue,
            reconciler,
            job,
        }
    }

    fn provisioned_record(username: &str, until: DateTime<Utc>) -> SignInRecord {
        let mut record = SignInRecord::new(username, "viewer", Duration::from_secs(900), t0());
        record.status.observed_generation = 1;
        record.status.provisioned = true;
        record.status.provisioned_role = Some("viewer".to_string());
        record.status.valid_until = Some(until);
        record
    }

    async fn drain(queue: &WorkQueue, reconciler: &Reconciler) {
        while !queue.is_empty().await {
            let key = queue.get().await.unwrap();
            reconciler.reconcile(&key).await.unwrap();
            queue.done(&key).await;
        }
    }

    #[tokio::test]
    async fn test_grant_without_record_is_requeued_then_revoked() {
        let h = setup();
        h.provisioner
            .provision("ghost", "viewer", t0() + chrono::Duration::minutes(15))
            .await
            .unwrap();

        assert_eq!(h.job.run().await.unwrap(), 1);
        // The sweep itself leaves the grant alone.
        assert_eq!(h.api.stats().bindings, 1);
        assert_eq!(h.queue.len().await, 1);

        drain(&h.queue, &h.reconciler).await;
        assert_eq!(h.api.stats().bindings, 0);
    }

    #[tokio::test]
    async fn test_only_expired_grant_is_requeued() {
        let h = setup();
        for (username, minutes) in [("alice", 15), ("bob", 60)] {
            let until = t0() + chrono::Duration::minutes(minutes);
            h.store.create(provisioned_record(username, until)).await.unwrap();
            h.provisioner.provision(username, "viewer", until).await.unwrap();
        }

        h.clock.advance(chrono::Duration::minutes(20));
        assert_eq!(h.job.run().await.unwrap(), 1);
        assert_eq!(h.queue.get().await.as_deref(), Some("alice"));
        h.queue.done("alice").await;

        h.reconciler.reconcile("alice").await.unwrap();
        let remaining = h.provisioner.managed_bindings().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].username(), Some("bob"));
    }

    #[tokio::test]
    async fn test_renewal_between_sweep_and_reconcile_keeps_grant() {
        let h = setup();
        let until = t0() + chrono::Duration::minutes(15);
        h.store.create(provisioned_record("alice", until)).await.unwrap();
        h.provisioner.provision("alice", "viewer", until).await.unwrap();

        h.clock.advance(chrono::Duration::minutes(16));
        assert_eq!(h.job.run().await.unwrap(), 1);

        // A renewal lands after the sweep flagged the expired grant.
        let mut record = h.store.get("alice").await.unwrap().unwrap();
        record.spec.generation += 1;
        record.spec.updated_at = h.clock.now();
        h.store.update(record).await.unwrap();

        drain(&h.queue, &h.reconciler).await;

        let record = h.store.get("alice").await.unwrap().unwrap();
        let renewed = h.clock.now() + chrono::Duration::minutes(15);
        assert!(record.status.provisioned);
        assert_eq!(record.status.valid_until, Some(renewed));

        let bindings = h.provisioner.managed_bindings().await.unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].valid_until(), Some(renewed));
        assert_eq!(h.api.stats().principals, 1);
    }
}
