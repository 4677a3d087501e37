//! # meshgate-api
//!
//! HTTP API layer for Meshgate built on Axum.
//!
//! Callers are identified by their mesh address; there are no passwords or
//! tokens on this surface. Provides the sign-in endpoints, the mesh identity
//! extractor, DTOs, and error mapping.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
