//! Sign-in façade over the record store.

pub mod manager;

pub use manager::{LogoutOutcome, SignInManager, SignInOutcome};
