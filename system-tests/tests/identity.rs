// system-tests/tests/identity.rs
// ============================================================================
// Module: Entity Identity Scenarios
// Description: Key rotation, revocation, and signature verification.
// ============================================================================
//! ## Overview
//! Covers the entity key lifecycle against the real Ed25519 verifier:
//! registration validation, rotation proofs (including expiry), revocation
//! terminality, and message verification failures.

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
use elemgraph_core::Clock;
use elemgraph_core::Element;
use elemgraph_core::EngineError;
use elemgraph_core::Entity;
use elemgraph_core::EventFilter;
use elemgraph_core::EventKind;
use elemgraph_core::NewElement;
use elemgraph_core::NewEntity;
use elemgraph_core::RotationProof;
use elemgraph_core::rotation_message;
use elemgraph_verify::Ed25519Verifier;
use system_tests::alice;
use system_tests::as_alice;
use system_tests::harness;

fn keypair(seed: u8) -> (SigningKey, String) {
    let signing = SigningKey::from_bytes(&[seed; 32]);
    let public = BASE64.encode(signing.verifying_key().as_bytes());
    (signing, public)
}

fn create_entity(
    engine: &elemgraph_core::ElementEngine<elemgraph_store_sqlite::SqliteBackend>,
    name: &str,
    public_key: Option<String>,
) -> Entity {
    let input = NewElement::Entity(NewEntity {
        name: name.to_string(),
        public_key,
        ..NewEntity::default()
    });
    match engine.create(input, &as_alice()).unwrap() {
        Element::Entity(entity) => entity,
        _ => panic!("expected an entity"),
    }
}

// ============================================================================
// SECTION: Registration
// ============================================================================

#[test]
fn test_entity_names_are_unique_and_validated() {
    let h = harness();
    create_entity(&h.engine, "scout", None);

    let duplicate = NewElement::Entity(NewEntity {
        name: "scout".to_string(),
        ..NewEntity::default()
    });
    assert!(matches!(
        h.engine.create(duplicate, &as_alice()).unwrap_err(),
        EngineError::DuplicateName { .. }
    ));

    for bad in ["9lives", "system", "has space"] {
        let input = NewElement::Entity(NewEntity {
            name: bad.to_string(),
            ..NewEntity::default()
        });
        assert!(
            h.engine.create(input, &as_alice()).is_err(),
            "expected {bad:?} to be rejected"
        );
    }
}

#[test]
fn test_malformed_key_material_is_rejected_at_registration() {
    let h = harness();
    let input = NewElement::Entity(NewEntity {
        name: "keyed".to_string(),
        public_key: Some("definitely not base64".to_string()),
        ..NewEntity::default()
    });
    assert!(matches!(
        h.engine.create(input, &as_alice()).unwrap_err(),
        EngineError::InvalidNewKey { .. }
    ));
}

// ============================================================================
// SECTION: Rotation
// ============================================================================

#[test]
fn test_key_rotation_with_a_valid_proof() {
    let h = harness();
    let (old_signing, old_public) = keypair(1);
    let (_, new_public) = keypair(2);
    let entity = create_entity(&h.engine, "rotator", Some(old_public));

    let signed_at = h.clock.now();
    let message = rotation_message(&entity.core.id, &new_public, signed_at);
    let proof = RotationProof {
        signature: BASE64.encode(old_signing.sign(message.as_bytes()).to_bytes()),
        signed_at,
    };
    let rotated = h
        .engine
        .rotate_entity_key(&Ed25519Verifier::new(), &entity.core.id, &new_public, &proof, &alice())
        .unwrap();
    assert_eq!(rotated.public_key.as_deref(), Some(new_public.as_str()));
    assert!(rotated.key_rotated_at.is_some());

    let events = h.engine.get_events(&entity.core.id, &EventFilter::default()).unwrap();
    assert!(events.iter().any(|event| event.event_type == EventKind::KeyRotated));
}

#[test]
fn test_expired_rotation_proofs_are_rejected() {
    let h = harness();
    let (old_signing, old_public) = keypair(1);
    let (_, new_public) = keypair(2);
    let entity = create_entity(&h.engine, "sleepy", Some(old_public));

    let signed_at = h.clock.now();
    let message = rotation_message(&entity.core.id, &new_public, signed_at);
    let proof = RotationProof {
        signature: BASE64.encode(old_signing.sign(message.as_bytes()).to_bytes()),
        signed_at,
    };
    h.clock.advance_millis(10 * 60 * 1_000);

    let error = h
        .engine
        .rotate_entity_key(&Ed25519Verifier::new(), &entity.core.id, &new_public, &proof, &alice())
        .unwrap_err();
    assert!(matches!(error, EngineError::SignatureExpired { .. }));
}

#[test]
fn test_rotation_with_the_wrong_key_is_rejected() {
    let h = harness();
    let (_, old_public) = keypair(1);
    let (imposter, _) = keypair(9);
    let (_, new_public) = keypair(2);
    let entity = create_entity(&h.engine, "guarded", Some(old_public));

    let signed_at = h.clock.now();
    let message = rotation_message(&entity.core.id, &new_public, signed_at);
    let proof = RotationProof {
        signature: BASE64.encode(imposter.sign(message.as_bytes()).to_bytes()),
        signed_at,
    };
    let error = h
        .engine
        .rotate_entity_key(&Ed25519Verifier::new(), &entity.core.id, &new_public, &proof, &alice())
        .unwrap_err();
    assert!(matches!(error, EngineError::InvalidSignature { .. }));
}

#[test]
fn test_rotation_without_a_key_reports_no_current_key() {
    let h = harness();
    let (_, new_public) = keypair(2);
    let entity = create_entity(&h.engine, "keyless", None);
    let proof = RotationProof {
        signature: String::new(),
        signed_at: h.clock.now(),
    };
    let error = h
        .engine
        .rotate_entity_key(&Ed25519Verifier::new(), &entity.core.id, &new_public, &proof, &alice())
        .unwrap_err();
    assert!(matches!(error, EngineError::NoCurrentKey { .. }));
}

// ============================================================================
// SECTION: Revocation and Verification
// ============================================================================

#[test]
fn test_revocation_is_terminal() {
    let h = harness();
    let (signing, public) = keypair(1);
    let entity = create_entity(&h.engine, "revoked", Some(public));

    let revoked = h.engine.revoke_entity_key(&entity.core.id, &alice()).unwrap();
    assert!(revoked.public_key.is_none());
    assert!(revoked.key_revoked_at.is_some());

    assert!(matches!(
        h.engine.revoke_entity_key(&entity.core.id, &alice()).unwrap_err(),
        EngineError::AlreadyRevoked { .. }
    ));

    let signature = BASE64.encode(signing.sign(b"hello").to_bytes());
    let error = h
        .engine
        .verify_entity_signature(&Ed25519Verifier::new(), &entity.core.id, "hello", &signature)
        .unwrap_err();
    assert!(matches!(error, EngineError::NoCurrentKey { .. }));
}

#[test]
fn test_signature_verification_round_trip() {
    let h = harness();
    let (signing, public) = keypair(1);
    let entity = create_entity(&h.engine, "signer", Some(public));
    let verifier = Ed25519Verifier::new();

    let signature = BASE64.encode(signing.sign(b"attest").to_bytes());
    h.engine
        .verify_entity_signature(&verifier, &entity.core.id, "attest", &signature)
        .unwrap();

    let error = h
        .engine
        .verify_entity_signature(&verifier, &entity.core.id, "tampered", &signature)
        .unwrap_err();
    assert!(matches!(error, EngineError::InvalidSignature { .. }));
}

#[test]
fn test_deactivated_entities_cannot_verify() {
    let h = harness();
    let (signing, public) = keypair(1);
    let entity = create_entity(&h.engine, "retired", Some(public));
    h.engine.deactivate_entity(&entity.core.id, &alice()).unwrap();

    let signature = BASE64.encode(signing.sign(b"hello").to_bytes());
    let error = h
        .engine
        .verify_entity_signature(&Ed25519Verifier::new(), &entity.core.id, "hello", &signature)
        .unwrap_err();
    assert!(matches!(error, EngineError::NoCurrentKey { .. }));
}
