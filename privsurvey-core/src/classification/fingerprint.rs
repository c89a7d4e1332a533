//! Cache key derived from a column's classification-relevant attributes.

use crate::models::ColumnDescriptor;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bumped whenever the encoding below changes, invalidating old cache files.
const FINGERPRINT_VERSION: &[u8] = b"privsurvey-fp-v1";

/// Stable SHA-256 hash over (normalized name, normalized type, sample digest).
///
/// The table name is deliberately absent so identical columns in different
/// tables share one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a column.
    pub fn of(column: &ColumnDescriptor) -> Self {
        Self::from_parts(
            &column.normalized_name(),
            &column.normalized_type(),
            column.sample_digest().map(|d| d.as_str()),
        )
    }

    /// Computes a fingerprint from already normalized parts.
    pub fn from_parts(normalized_name: &str, normalized_type: &str, digest: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_VERSION);
        hasher.update([0u8]);
        hasher.update(normalized_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(normalized_type.as_bytes());
        hasher.update([0u8]);
        hasher.update(digest.unwrap_or_default().as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
