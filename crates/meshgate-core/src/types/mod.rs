//! Shared domain types.

pub mod access_rule;
pub mod duration;
pub mod grant;
pub mod identity;
pub mod record;
pub mod username;

pub use access_rule::{AccessRule, MIN_VALIDITY};
pub use grant::{AccessGrant, Principal, RoleBinding};
pub use identity::Identity;
pub use record::{RecordPhase, SignInRecord, SignInSpec, SignInStatus, SignInView};
