//! Periodic maintenance jobs run by the cron scheduler.

pub mod orphan_sweep;
pub mod resync;

pub use orphan_sweep::OrphanSweepJob;
pub use resync::ResyncJob;
