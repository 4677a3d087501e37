//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meshgate_auth::LogoutOutcome;
use meshgate_core::types::{RecordPhase, SignInView};

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Sign-in state of the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInResponse {
    /// Record key (the caller's login name).
    pub username: String,
    /// Requested role.
    pub role: String,
    /// Whether access is active.
    pub provisioned: bool,
    /// Expiry of the access, actual or estimated.
    pub valid_until: DateTime<Utc>,
    /// `true` while `valid_until` is only an estimate.
    pub estimated: bool,
    /// Lifecycle phase.
    pub phase: RecordPhase,
}

impl From<SignInView> for SignInResponse {
    fn from(view: SignInView) -> Self {
        Self {
            username: view.username,
            role: view.role,
            provisioned: view.provisioned,
            valid_until: view.valid_until,
            estimated: view.estimated,
            phase: view.phase,
        }
    }
}

/// Logout result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// Record key.
    pub username: String,
    /// `signed_out`, `pending`, or `already_signed_out`.
    pub outcome: String,
}

impl LogoutResponse {
    /// Builds the response for an outcome.
    pub fn new(username: impl Into<String>, outcome: LogoutOutcome) -> Self {
        let outcome = match outcome {
            LogoutOutcome::SignedOut => "signed_out",
            LogoutOutcome::Pending => "pending",
            LogoutOutcome::AlreadySignedOut => "already_signed_out",
        };
        Self {
            username: username.into(),
            outcome: outcome.to_string(),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: String,
    /// Server version.
    pub version: String,
}
