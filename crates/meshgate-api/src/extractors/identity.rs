//! `MeshIdentity` extractor resolves the caller's mesh identity from the
//! connection's peer address.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

use meshgate_core::error::AppError;
use meshgate_core::types::Identity;

use crate::error::ApiError;
use crate::state::AppState;

/// Identity of the mesh peer that sent the request.
#[derive(Debug, Clone)]
pub struct MeshIdentity(pub Identity);

impl MeshIdentity {
    /// The login name, used as the sign-in record key.
    pub fn username(&self) -> &str {
        &self.0.login_name
    }
}

impl std::ops::Deref for MeshIdentity {
    type Target = Identity;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequestParts<AppState> for MeshIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ConnectInfo(remote) = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .copied()
            .ok_or_else(|| AppError::internal("Peer address unavailable on this connection"))?;

        let identity = state.identity.who_is(remote).await?;
        tracing::debug!(remote = %remote, login_name = %identity.login_name, "Mesh peer identified");

        Ok(MeshIdentity(identity))
    }
}
