//! Mesh identity lookup.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::identity::Identity;

/// Resolves the mesh identity behind a remote address.
///
/// Fails with `ErrorKind::AuthDenied` when the address is not a known peer.
#[async_trait]
pub trait IdentityResolver: Send + Sync + std::fmt::Debug + 'static {
    /// Look up the identity of the peer at `remote_addr`.
    async fn who_is(&self, remote_addr: SocketAddr) -> AppResult<Identity>;
}
