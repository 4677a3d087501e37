//! Periodic full resync. Requeues every record so missed events and
//! lost wakes are recovered.

use std::sync::Arc;

use meshgate_core::result::AppResult;

use crate::runner::ReconcileRunner;

/// Queues every stored record for reconciliation
#[derive(Debug, Clone)]
pub struct ResyncJob {
    runner: Arc<ReconcileRunner>,
}

impl ResyncJob {
    /// Create a new resync job
    pub fn new(runner: Arc<ReconcileRunner>) -> Self {
        Self { runner }
    }

    /// Run one resync, returning the number of queued records
    pub async fn run(&self) -> AppResult<usize> {
        let queued = self.runner.resync().await?;
        tracing::info!("Periodic resync queued {} records", queued);
        Ok(queued)
    }
}
