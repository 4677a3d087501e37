//! Identity resolver backed by a fixed peer table from configuration.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use tracing::{debug, info};

use meshgate_core::config::IdentityConfig;
use meshgate_core::error::AppError;
use meshgate_core::result::AppResult;
use meshgate_core::traits::IdentityResolver;
use meshgate_core::types::Identity;

/// Resolves callers by their source IP against a configured peer table.
///
/// Intended for development and tests, where no mesh control plane is
/// available to answer who-is queries.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    peers: HashMap<IpAddr, Identity>,
}

impl StaticIdentityResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the peer table from configuration.
    pub fn from_config(config: &IdentityConfig) -> AppResult<Self> {
        let mut resolver = Self::new();
        for peer in &config.static_peers {
            let address: IpAddr = peer.address.parse().map_err(|e| {
                AppError::configuration(format!(
                    "identity.static_peers: invalid address '{}': {e}",
                    peer.address
                ))
            })?;
            if resolver.peers.contains_key(&address) {
                return Err(AppError::configuration(format!(
                    "identity.static_peers: duplicate address '{address}'"
                )));
            }

            resolver = resolver.with_peer(
                address,
                Identity {
                    login_name: peer.login_name.clone(),
                    is_service_account: peer.tagged,
                    via_public_ingress: peer.via_public_ingress,
                    capability_grants: peer.grants.clone(),
                },
            );
        }

        info!(peers = resolver.peers.len(), "Static identity resolver loaded");
        Ok(resolver)
    }

    /// Adds or replaces one peer.
    pub fn with_peer(mut self, address: IpAddr, identity: Identity) -> Self {
        self.peers.insert(address, identity);
        self
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn who_is(&self, remote: SocketAddr) -> AppResult<Identity> {
        let ip = remote.ip().to_canonical();
        match self.peers.get(&ip) {
            Some(identity) => Ok(identity.clone()),
            None => {
                debug!(remote = %remote, "Unknown mesh peer");
                Err(AppError::auth_denied(format!("unknown mesh peer {ip}")))
            }
        }
    }
}
