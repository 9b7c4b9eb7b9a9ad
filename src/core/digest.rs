//! Content fingerprints used to detect change without shipping content.

use sha2::Digest;
use sha2::Sha256;

use super::ConfigRecord;

/// Digest reported for a key that has no record. No real digest is empty.
pub const NOT_FOUND_DIGEST: &str = "";

/// Lowercase hex SHA-256 of the content bytes (64 chars).
pub fn digest_of(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn digest_of_record(record: Option<&ConfigRecord>) -> &str {
    record.map(|r| r.digest.as_str()).unwrap_or(NOT_FOUND_DIGEST)
}

/// Exact, case-sensitive comparison.
#[inline]
pub fn differs(
    client_digest: &str,
    server_digest: &str,
) -> bool {
    client_digest != server_digest
}
