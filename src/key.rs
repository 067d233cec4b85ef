//! Content-addressed cache keys for source identifiers (URLs or local paths).

use std::fmt;

use md5::{Digest, Md5};

/// Hex length of an MD5 digest.
pub const CACHE_KEY_LEN: usize = 32;

/// Fixed-length fingerprint of a source identifier. Doubles as the file stem of
/// every artifact stored for that source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lowercase hex MD5 of the identifier's UTF-8 bytes. Total: any string, including "".
pub fn derive_key(source_identifier: &str) -> CacheKey {
    let mut hasher = Md5::new();
    hasher.update(source_identifier.as_bytes());
    CacheKey(hex::encode(hasher.finalize()))
}
