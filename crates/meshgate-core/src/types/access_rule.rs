//! Validated access rule derived from a capability grant.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::duration::{self, format_duration};

/// Policy floor for the validity period of any access rule.
pub const MIN_VALIDITY: Duration = Duration::from_secs(10 * 60);

/// The role and period a principal may be granted.
///
/// Can only be constructed through [`AccessRule::new`], so every value
/// satisfies `period >= MIN_VALIDITY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRule {
    role: String,
    #[serde(with = "duration::as_str")]
    period: Duration,
}

impl AccessRule {
    /// Validates and builds a rule.
    pub fn new(role: impl Into<String>, period: Duration) -> Result<Self, AppError> {
        let role = role.into();
        if role.trim().is_empty() {
            return Err(AppError::validation("role must not be empty"));
        }
        if period < MIN_VALIDITY {
            return Err(AppError::invalid_rule(format!(
                "period {} is below the minimum validity of {}",
                format_duration(period),
                format_duration(MIN_VALIDITY)
            )));
        }
        Ok(Self { role, period })
    }

    /// The cluster role to bind.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// How long access stays valid after provisioning.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl<'de> Deserialize<'de> for AccessRule {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            role: String,
            #[serde(with = "duration::as_str")]
            period: Duration,
        }

        let raw = Raw::deserialize(deserializer)?;
        AccessRule::new(raw.role, raw.period).map_err(serde::de::Error::custom)
    }
}
