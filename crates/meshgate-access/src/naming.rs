//! Deterministic object names derived from usernames.
//!
//! Names follow DNS-1123 label rules: lowercase alphanumerics and `-`,
//! at most 63 characters, starting and ending with an alphanumeric.
//! When sanitizing loses information or the name must be truncated, a
//! short SHA-256 suffix of the raw username keeps distinct users apart.

use sha2::{Digest, Sha256};

/// Maximum length of an object name.
pub const MAX_NAME_LEN: usize = 63;

/// Hex characters of the disambiguating hash suffix.
const HASH_SUFFIX_LEN: usize = 8;

/// Maps usernames to downstream object names.
#[derive(Debug, Clone)]
pub struct NameResolver {
    /// Sanitized prefix, possibly empty.
    prefix: String,
}

impl NameResolver {
    /// Creates a resolver with the given name prefix.
    pub fn new(prefix: impl AsRef<str>) -> Self {
        let mut prefix = sanitize(prefix.as_ref());
        prefix.truncate(MAX_NAME_LEN / 2);
        Self {
            prefix: prefix.trim_end_matches('-').to_string(),
        }
    }

    /// Object name shared by the principal and the binding of `username`.
    pub fn object_name(&self, username: &str) -> String {
        let sanitized = sanitize(username);
        let base = match (self.prefix.is_empty(), sanitized.is_empty()) {
            (true, _) => sanitized.clone(),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}-{}", self.prefix, sanitized),
        };

        let lossy = sanitized != username || sanitized.is_empty();
        if !lossy && base.len() <= MAX_NAME_LEN {
            return base;
        }

        let keep = MAX_NAME_LEN - HASH_SUFFIX_LEN - 1;
        let mut head = base;
        head.truncate(keep);
        let head = head.trim_end_matches('-');
        let suffix = hash_suffix(username);

        if head.is_empty() {
            suffix
        } else {
            format!("{head}-{suffix}")
        }
    }
}

/// Lowercases, replaces invalid characters with `-`, collapses runs of
/// `-`, and trims them from both ends.
fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

fn hash_suffix(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    digest
        .iter()
        .take(HASH_SUFFIX_LEN / 2)
        .map(|b| format!("{b:02x}"))
        .collect()
}
