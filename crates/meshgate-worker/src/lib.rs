//! Reconciliation workers and scheduled maintenance for Meshgate.
//!
//! This crate provides:
//! - A keyed work queue with de-duplication, delayed wakes, and backoff
//! - The reconciler that converges one sign-in record at a time
//! - A runner that feeds record changes to a pool of reconcile workers
//! - A cron scheduler for periodic resyncs and the orphaned-grant sweep

pub mod jobs;
pub mod queue;
pub mod reconciler;
pub mod runner;
pub mod scheduler;

pub use queue::WorkQueue;
pub use reconciler::{Action, ReconcileError, Reconciler};
pub use runner::ReconcileRunner;
pub use scheduler::CronScheduler;
