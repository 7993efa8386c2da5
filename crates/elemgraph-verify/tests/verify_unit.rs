// crates/elemgraph-verify/tests/verify_unit.rs
// ============================================================================
// Module: Ed25519 Verifier Unit Tests
// Description: Tests for signature verification and fail-closed decoding.
// ============================================================================
//! ## Overview
//! Validates that well-formed signatures verify, tampered messages fail,
//! and malformed key or signature material fails closed without panicking.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    missing_docs,
    clippy::missing_docs_in_private_items,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::Signer as _;
use ed25519_dalek::SigningKey;
use elemgraph_core::SignatureVerifier;
use elemgraph_verify::Ed25519Verifier;

fn keypair() -> (SigningKey, String) {
    let signing = SigningKey::from_bytes(&[7u8; 32]);
    let public = BASE64.encode(signing.verifying_key().as_bytes());
    (signing, public)
}

fn sign(signing: &SigningKey, message: &str) -> String {
    BASE64.encode(signing.sign(message.as_bytes()).to_bytes())
}

#[test]
fn test_valid_signature_verifies() {
    let (signing, public) = keypair();
    let signature = sign(&signing, "rotate me");
    assert!(Ed25519Verifier::new().verify("rotate me", &signature, &public));
}

#[test]
fn test_tampered_message_fails() {
    let (signing, public) = keypair();
    let signature = sign(&signing, "rotate me");
    assert!(!Ed25519Verifier::new().verify("rotate you", &signature, &public));
}

#[test]
fn test_wrong_key_fails() {
    let (signing, _) = keypair();
    let other = SigningKey::from_bytes(&[9u8; 32]);
    let other_public = BASE64.encode(other.verifying_key().as_bytes());
    let signature = sign(&signing, "rotate me");
    assert!(!Ed25519Verifier::new().verify("rotate me", &signature, &other_public));
}

#[test]
fn test_malformed_material_fails_closed() {
    let verifier = Ed25519Verifier::new();
    let (signing, public) = keypair();
    let signature = sign(&signing, "rotate me");

    assert!(!verifier.verify("rotate me", "not base64!!", &public));
    assert!(!verifier.verify("rotate me", &signature, "not base64!!"));
    assert!(!verifier.verify("rotate me", &BASE64.encode([0u8; 10]), &public));
    assert!(!verifier.verify("rotate me", &signature, &BASE64.encode([0u8; 10])));
    assert!(!verifier.verify("rotate me", "", ""));
}
