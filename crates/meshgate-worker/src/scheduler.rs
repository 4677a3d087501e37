//! Cron scheduler for the periodic resync and the orphaned-grant sweep.

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use meshgate_core::config::ReconcilerConfig;
use meshgate_core::error::AppError;

use crate::jobs::{OrphanSweepJob, ResyncJob};

/// Cron-based scheduler for periodic reconciler maintenance
pub struct CronScheduler {
    /// The underlying job scheduler
    scheduler: JobScheduler,
    /// Full resync job
    resync: ResyncJob,
    /// Orphaned-grant sweep job
    sweep: OrphanSweepJob,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler
    pub async fn new(resync: ResyncJob, sweep: OrphanSweepJob) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            resync,
            sweep,
        })
    }

    /// Register all scheduled tasks
    pub async fn register_default_tasks(&self, config: &ReconcilerConfig) -> Result<(), AppError> {
        self.register_resync(&config.resync_cron).await?;
        self.register_orphan_sweep(&config.orphan_sweep_cron).await?;

        tracing::info!("All scheduled tasks registered");
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {}", e)))?;

        tracing::info!("Cron scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {}", e)))?;

        tracing::info!("Cron scheduler shut down");
        Ok(())
    }

    /// Full resync of every record
    async fn register_resync(&self, schedule: &str) -> Result<(), AppError> {
        let resync = self.resync.clone();
        let job = CronJob::new_async(schedule, move |_uuid, _lock| {
            let resync = resync.clone();
            Box::pin(async move {
                if let Err(e) = resync.run().await {
                    tracing::error!("Periodic resync failed: {}", e);
                }
            })
        })
        .map_err(|e| {
            AppError::configuration(format!("Invalid resync schedule '{}': {}", schedule, e))
        })?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add resync schedule: {}", e)))?;

        tracing::info!("Registered: resync ({})", schedule);
        Ok(())
    }

    /// Orphaned-grant sweep
    async fn register_orphan_sweep(&self, schedule: &str) -> Result<(), AppError> {
        let sweep = self.sweep.clone();
        let job = CronJob::new_async(schedule, move |_uuid, _lock| {
            let sweep = sweep.clone();
            Box::pin(async move {
                if let Err(e) = sweep.run().await {
                    tracing::error!("Orphan sweep failed: {}", e);
                }
            })
        })
        .map_err(|e| {
            AppError::configuration(format!(
                "Invalid orphan sweep schedule '{}': {}",
                schedule, e
            ))
        })?;

        self.scheduler.add(job).await.map_err(|e| {
            AppError::internal(format!("Failed to add orphan sweep schedule: {}", e))
        })?;

        tracing::info!("Registered: orphan_sweep ({})", schedule);
        Ok(())
    }
}
