//! Archive integrity checks

use sha2::{Digest, Sha256};

use crate::error::{RepoError, Result};

/// Hex-encoded SHA256 digest of `data`
pub fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Strip `sha256:` / `sha256-` prefixes and normalize case
pub fn normalize_digest(digest: &str) -> String {
    let lower = digest.trim().to_lowercase();
    lower
        .strip_prefix("sha256:")
        .or_else(|| lower.strip_prefix("sha256-"))
        .unwrap_or(&lower)
        .to_string()
}

/// Check if two digests match (supports various formats)
pub fn digest_matches(expected: &str, actual: &str) -> bool {
    normalize_digest(expected) == normalize_digest(actual)
}

/// Verify `data` against the digest published in the index
///
/// Returns the computed digest. An entry without a digest cannot be verified
/// and is rejected.
pub fn verify(data: &[u8], expected: Option<&str>) -> Result<String> {
    let actual = compute_digest(data);

    match expected {
        Some(expected) if digest_matches(expected, &actual) => Ok(actual),
        Some(expected) => Err(RepoError::DigestMismatch {
            dependency: None,
            expected: expected.to_string(),
            actual,
        }),
        None => Err(RepoError::DigestMismatch {
            dependency: None,
            expected: "<missing>".to_string(),
            actual,
        }),
    }
}
