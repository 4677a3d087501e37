//! Collaborator traits defined in `meshgate-core` and implemented by other crates.

pub mod access_api;
pub mod clock;
pub mod identity;
pub mod record_store;

pub use access_api::AccessApi;
pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::IdentityResolver;
pub use record_store::{EventSource, RecordStore, WatchSignal};
