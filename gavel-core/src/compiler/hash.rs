//! Content-addressing for [`super::spec::GraphSpec`]: a stable hash used
//! as the cache key in [`crate::cache::GraphCache`], so compiling the same
//! spec twice (byte-for-byte, modulo field order) reuses the same
//! compiled graph.
//!
//! Hashing goes through `serde_json` rather than hashing the raw YAML
//! text: two specs that are semantically identical but differ in
//! formatting (comments, key order, quoting style) must hash identically,
//! and JSON re-serialization of the already-typed `GraphSpec` normalizes
//! all of that away for free.

use sha2::{Digest, Sha256};

use super::spec::GraphSpec;
use crate::error::Result;

/// The hex-encoded SHA-256 digest of `spec`'s canonical JSON form.
pub fn content_hash(spec: &GraphSpec) -> Result<String> {
    let bytes = serde_json::to_vec(spec)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}
