//! Username validation.

use crate::error::AppError;

/// Longest username accepted as a record key.
pub const MAX_USERNAME_LEN: usize = 256;

/// Checks that a username is usable as a record key.
pub fn validate_username(username: &str) -> Result<(), AppError> {
    if username.trim().is_empty() {
        return Err(AppError::validation("username must not be empty"));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(AppError::validation(format!(
            "username exceeds {MAX_USERNAME_LEN} bytes"
        )));
    }
    if username.chars().any(char::is_control) {
        return Err(AppError::validation("username contains control characters"));
    }
    Ok(())
}
