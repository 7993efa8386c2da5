// crates/elemgraph-verify/src/lib.rs
// ============================================================================
// Module: Elemgraph Ed25519 Verifier
// Description: SignatureVerifier implementation over ed25519-dalek.
// Purpose: Verify base64 Ed25519 signatures for entity identity operations.
// Dependencies: base64, ed25519-dalek, elemgraph-core
// ============================================================================

//! ## Overview
//! The engine consumes signature verification as a collaborator interface;
//! this crate provides the production implementation. Malformed keys or
//! signatures are a failed verification, never a panic: the verifier fails
//! closed on any decoding or parsing problem.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::Signature;
use ed25519_dalek::Verifier as _;
use ed25519_dalek::VerifyingKey;
use elemgraph_core::SignatureVerifier;

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Ed25519 signature verifier over base64-encoded key and signature material.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl Ed25519Verifier {
    /// Creates a new verifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decodes a base64 value into a fixed-size byte array.
    fn decode_fixed<const N: usize>(encoded: &str) -> Option<[u8; N]> {
        let decoded = BASE64.decode(encoded).ok()?;
        decoded.try_into().ok()
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, message: &str, signature_b64: &str, public_key_b64: &str) -> bool {
        let Some(key_bytes) = Self::decode_fixed::<32>(public_key_b64) else {
            return false;
        };
        let Some(signature_bytes) = Self::decode_fixed::<64>(signature_b64) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let signature = Signature::from_bytes(&signature_bytes);
        key.verify(message.as_bytes(), &signature).is_ok()
    }
}
