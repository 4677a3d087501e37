//! Reconciler work-queue and scheduling configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reconciler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Number of keys reconciled in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Consecutive failures before the error is surfaced on the record.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry delay in milliseconds. Doubles per failure.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
    /// Upper bound for the retry delay in seconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_seconds: u64,
    /// Cron expression for the periodic full resync.
    #[serde(default = "default_resync_cron")]
    pub resync_cron: String,
    /// Cron expression for the orphaned-grant sweep.
    #[serde(default = "default_orphan_sweep_cron")]
    pub orphan_sweep_cron: String,
    /// Maximum time to wait for in-flight reconciliations on shutdown.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,
    /// How long `Logout` waits for deprovisioning before returning.
    #[serde(default = "default_logout_wait")]
    pub logout_wait_seconds: u64,
    /// Retry hint returned to callers while provisioning is pending.
    #[serde(default = "default_retry_after")]
    pub retry_after_seconds: u64,
}

impl ReconcilerConfig {
    /// First retry delay.
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    /// Maximum retry delay.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds)
    }

    /// Graceful drain timeout.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }

    /// Logout wait budget.
    pub fn logout_wait(&self) -> Duration {
        Duration::from_secs(self.logout_wait_seconds)
    }

    /// Retry hint for pending provisioning.
    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_seconds)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_seconds: default_max_backoff(),
            resync_cron: default_resync_cron(),
            orphan_sweep_cron: default_orphan_sweep_cron(),
            drain_timeout_seconds: default_drain_timeout(),
            logout_wait_seconds: default_logout_wait(),
            retry_after_seconds: default_retry_after(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    300
}

fn default_resync_cron() -> String {
    "0 */5 * * * *".to_string()
}

fn default_orphan_sweep_cron() -> String {
    "30 * * * * *".to_string()
}

fn default_drain_timeout() -> u64 {
    30
}

fn default_logout_wait() -> u64 {
    10
}

fn default_retry_after() -> u64 {
    1
}
