//! Capability grant decoding and access-rule extraction.

pub mod extractor;
pub mod grant;

pub use extractor::CapabilityExtractor;
pub use grant::{CapabilityGrant, GrantV1};
