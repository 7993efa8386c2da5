// crates/elemgraph-core/src/core/hashing.rs
// ============================================================================
// Module: Elemgraph Content Hashing
// Description: RFC 8785 JSON canonicalization and element content hashing.
// Purpose: Provide deterministic content hashes for conflict-free merge.
// Dependencies: serde, serde_jcs, serde_json, sha2
// ============================================================================

//! ## Overview
//! Every persisted element row carries a SHA-256 hash over the RFC 8785 (JCS)
//! canonicalization of its wire form with the volatile instants removed. Two
//! updates that yield identical field values therefore produce the same hash,
//! and the last-writer-wins import uses hash comparison to classify
//! "same content, different clocks" collisions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Top-level wire fields excluded from the content hash.
///
/// `updatedAt` is volatile by definition; `createdAt` is excluded so a record
/// re-created from an export with a fresh creation instant still matches.
const VOLATILE_FIELDS: [&str; 2] = ["createdAt", "updatedAt"];

// ============================================================================
// SECTION: Content Hash
// ============================================================================

/// Lowercase hex SHA-256 content hash of an element.
///
/// # Invariants
/// - Always 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wraps an already-computed hex digest.
    #[must_use]
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes raw bytes with SHA-256.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentHash(hex_encode(&hasher.finalize()))
}

/// Hashes the canonical JSON form of a serializable value.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<ContentHash, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(&bytes))
}

/// Computes the content hash of an element wire value.
///
/// Strips the volatile top-level instants before canonicalization so the
/// hash is a pure function of (type, stable fields, sorted tags,
/// stable-ordered metadata).
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn content_hash_of_value(wire: &Value) -> Result<ContentHash, HashError> {
    let mut projection = wire.clone();
    if let Value::Object(fields) = &mut projection {
        for field in VOLATILE_FIELDS {
            fields.remove(field);
        }
    }
    hash_canonical_json(&projection)
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
