//! # meshgate-access
//!
//! Everything that touches the downstream cluster.
//!
//! ## Modules
//!
//! - `naming`: deterministic, length-bounded object names per username
//! - `provisioner`: idempotent provision/deprovision of the principal + binding
//! - `credentials`: read-only projection of a grant into connection credentials
//! - `memory`: in-process [`AccessApi`](meshgate_core::traits::AccessApi) implementation

pub mod credentials;
pub mod memory;
pub mod naming;
pub mod provisioner;

pub use credentials::{CredentialIssuer, Credentials, Kubeconfig};
pub use memory::MemoryAccessApi;
pub use naming::NameResolver;
pub use provisioner::{AccessProvisioner, BindingChange, PrincipalChange, ProvisionOutcome};
