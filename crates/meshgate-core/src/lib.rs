//! # meshgate-core
//!
//! Core crate for Meshgate. Contains the collaborator traits (record store,
//! downstream access API, identity resolver, clock), configuration schemas,
//! domain types, record-change events, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Meshgate crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
