//! # meshgate-store
//!
//! Sign-in record store implementations.
//!
//! The production record store is an external, watched, versioned API;
//! [`MemoryRecordStore`] implements the same contract in-process for
//! single-node deployments and tests.

pub mod memory;

pub use memory::MemoryRecordStore;
