// src/kitchen/verify.rs

//! Integrity verification of fetched archives

use crate::error::{Error, Result};
use crate::hash::{Hash, hash_file};
use std::path::Path;
use tracing::{debug, warn};

/// Check that the archive at `path` matches `expected`
///
/// Returns the computed digest on success. A mismatch is fatal; no later
/// stage may consume the archive.
pub fn verify_archive(url: &str, path: &Path, expected: &Hash) -> Result<Hash> {
    let actual = hash_file(expected.algorithm, path)?;
    if actual != *expected {
        warn!(
            "Checksum mismatch for {}: expected {}, got {}",
            url,
            expected.to_prefixed_string(),
            actual.to_prefixed_string()
        );
        return Err(Error::Integrity {
            url: url.to_string(),
            algorithm: expected.algorithm,
            expected: expected.value.clone(),
            actual: actual.value,
        });
    }
    debug!("Verified {} ({})", url, actual.to_prefixed_string());
    Ok(actual)
}
