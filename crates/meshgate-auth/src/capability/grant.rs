//! Schema-versioned capability grant payloads.
//!
//! Grants arrive as arbitrary JSON. Each payload is decoded into exactly
//! one [`CapabilityGrant`] variant selected by its `version` field
//! (absent means `v1`). Unknown versions and unknown fields are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use meshgate_core::error::{AppError, ErrorKind};
use meshgate_core::types::AccessRule;
use meshgate_core::types::duration::parse_duration;

/// Field selecting the payload schema.
const VERSION_FIELD: &str = "version";

/// A decoded capability grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "version", rename_all = "lowercase")]
pub enum CapabilityGrant {
    /// `{"role": "...", "period": "15m"}`
    V1(GrantV1),
}

/// Version 1 grant body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantV1 {
    /// Cluster role to bind.
    pub role: String,
    /// Go-style duration string.
    pub period: String,
}

impl CapabilityGrant {
    /// Decodes one raw grant payload.
    pub fn decode(payload: &Value) -> Result<Self, AppError> {
        let Value::Object(fields) = payload else {
            return Err(AppError::malformed_grant("grant payload must be a JSON object"));
        };

        let version = match fields.get(VERSION_FIELD) {
            None => "v1",
            Some(Value::String(v)) => v.as_str(),
            Some(other) => {
                return Err(AppError::malformed_grant(format!(
                    "grant version must be a string, got {other}"
                )));
            }
        };

        let mut body = fields.clone();
        body.remove(VERSION_FIELD);

        match version {
            "v1" => serde_json::from_value::<GrantV1>(Value::Object(body))
                .map(CapabilityGrant::V1)
                .map_err(|e| AppError::malformed_grant(format!("invalid v1 grant: {e}"))),
            other => Err(AppError::malformed_grant(format!(
                "unsupported grant version '{other}'"
            ))),
        }
    }

    /// Converts the grant into a validated access rule.
    ///
    /// Syntax problems are `MalformedGrant`; a period below the minimum
    /// validity is `InvalidRule`.
    pub fn into_rule(self) -> Result<AccessRule, AppError> {
        match self {
            CapabilityGrant::V1(grant) => {
                if grant.role.trim().is_empty() {
                    return Err(AppError::malformed_grant("grant role must not be empty"));
                }
                let period = parse_duration(&grant.period).map_err(|e| {
                    AppError::malformed_grant(format!("grant period: {}", e.message))
                })?;
                AccessRule::new(grant.role, period).map_err(|e| match e.kind {
                    ErrorKind::InvalidRule => e,
                    _ => AppError::malformed_grant(e.message),
                })
            }
        }
    }
}
