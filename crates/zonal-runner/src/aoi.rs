//! AOI identity and result-directory naming.

use sha2::{Digest, Sha256};
use std::fmt;

/// Hex digits of the name hash appended to altered identifiers.
const HASH_SUFFIX_LEN: usize = 8;

/// An area of interest: the reference handed to the remote engine and the
/// filesystem-safe identifier its artifacts are stored under.
///
/// Identifiers keep `[A-Za-z0-9_-]` and replace everything else with `_`.
/// When anything was replaced, a `-` and the first 8 hex digits of the
/// SHA-256 of the original reference are appended so two references never
/// share a directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AoiId {
    reference: String,
    id: String,
}

impl AoiId {
    pub fn new(reference: impl Into<String>) -> Self {
        let reference = reference.into();
        let mut altered = reference.is_empty();
        let mut id: String = reference
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    altered = true;
                    '_'
                }
            })
            .collect();

        if altered {
            let digest = hex::encode(Sha256::digest(reference.as_bytes()));
            id.push('-');
            id.push_str(&digest[..HASH_SUFFIX_LEN]);
        }

        Self { reference, id }
    }

    /// The reference as given (asset path, feature collection id, country code).
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Sanitized identifier used for directory and file names.
    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for AoiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
