//! # meshgate-auth
//!
//! Authorization and sign-in orchestration for Meshgate.
//!
//! ## Modules
//!
//! - `capability`: turns a mesh identity's capability grants into a validated [`AccessRule`]
//! - `identity`: mesh identity resolvers
//! - `signin`: the sign-in façade (`sign_in`, `status`, `logout`) over the record store
//!
//! [`AccessRule`]: meshgate_core::types::AccessRule

pub mod capability;
pub mod identity;
pub mod signin;

pub use capability::{CapabilityExtractor, CapabilityGrant};
pub use identity::StaticIdentityResolver;
pub use signin::{LogoutOutcome, SignInManager, SignInOutcome};
