//! Capability extraction: mesh identity in, validated access rule out.

use tracing::debug;

use meshgate_core::error::AppError;
use meshgate_core::types::{AccessRule, Identity};

use super::grant::CapabilityGrant;

/// Derives the [`AccessRule`] a mesh identity is entitled to.
///
/// Pure: no I/O, and the result depends only on the identity and the
/// configured capability key.
#[derive(Debug, Clone)]
pub struct CapabilityExtractor {
    /// Key under which the mesh publishes this service's grants.
    capability_key: String,
}

impl CapabilityExtractor {
    /// Creates an extractor for the given capability key.
    pub fn new(capability_key: impl Into<String>) -> Self {
        Self {
            capability_key: capability_key.into(),
        }
    }

    /// The capability key grants are read from.
    pub fn capability_key(&self) -> &str {
        &self.capability_key
    }

    /// Resolves the single access rule granted to `identity`.
    ///
    /// - tagged (service) identities and public-ingress callers: `AuthDenied`
    /// - no grant under the key: `AuthDenied`
    /// - more than one grant, or one that does not decode: `MalformedGrant`
    /// - a period below the minimum validity: `InvalidRule`
    pub fn resolve(&self, identity: &Identity) -> Result<AccessRule, AppError> {
        if identity.is_service_account {
            return Err(AppError::auth_denied(
                "tagged nodes cannot sign in interactively",
            ));
        }
        if identity.via_public_ingress {
            return Err(AppError::auth_denied(
                "sign-in is only available from inside the mesh",
            ));
        }
        if identity.login_name.trim().is_empty() {
            return Err(AppError::auth_denied("identity has no login name"));
        }

        let rule = match identity.grants_for(&self.capability_key) {
            [] => {
                return Err(AppError::auth_denied(format!(
                    "no '{}' capability granted to {}",
                    self.capability_key, identity.login_name
                )));
            }
            [single] => CapabilityGrant::decode(single)?.into_rule()?,
            many => {
                return Err(AppError::malformed_grant(format!(
                    "expected exactly one '{}' grant, found {}",
                    self.capability_key,
                    many.len()
                )));
            }
        };

        debug!(
            login_name = %identity.login_name,
            role = %rule.role(),
            period_secs = rule.period().as_secs(),
            "Capability resolved"
        );
        Ok(rule)
    }
}
