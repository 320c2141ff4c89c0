//! Content-addressed cache key generation.

use sha2::{Digest, Sha256};

/// Compute the cache key for a site search.
///
/// Queries differing only in case or surrounding whitespace share a key.
pub fn search_cache_key(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}
