// crates/elemgraph-core/src/runtime/identity.rs
// ============================================================================
// Module: Elemgraph Entity Identity
// Description: Entity key rotation, revocation, and signature checks.
// Purpose: Manage Ed25519 key lifecycle through the verifier collaborator.
// Dependencies: crate::{core, interfaces, runtime}, serde_json
// ============================================================================

//! ## Overview
//! Entities may carry a base64 Ed25519 public key. Rotation requires a proof
//! signed by the current key over a canonical rotation message and bounded
//! by a configured acceptance window; revocation is terminal. The engine
//! never touches cryptographic primitives itself; it consumes the
//! [`SignatureVerifier`] collaborator.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde_json::json;

use crate::core::Element;
use crate::core::ElementId;
use crate::core::ElementKind;
use crate::core::EngineError;
use crate::core::Entity;
use crate::core::EventKind;
use crate::core::NewEvent;
use crate::core::Timestamp;
use crate::core::element::validate_public_key;
use crate::core::identifiers::ActorId;
use crate::interfaces::PersistedElement;
use crate::interfaces::SignatureVerifier;
use crate::interfaces::StorageBackend;
use crate::interfaces::WriteOp;
use crate::runtime::engine::ElementEngine;

// ============================================================================
// SECTION: Rotation Proof
// ============================================================================

/// Proof of key possession presented with a rotation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationProof {
    /// Base64 signature over the canonical rotation message, made with the
    /// entity's current key.
    pub signature: String,
    /// Instant the proof was signed.
    pub signed_at: Timestamp,
}

/// Builds the canonical message a rotation proof signs.
#[must_use]
pub fn rotation_message(entity: &ElementId, new_key: &str, signed_at: Timestamp) -> String {
    format!("key-rotation:{entity}:{new_key}:{}", signed_at.unix_millis())
}

// ============================================================================
// SECTION: Identity Operations
// ============================================================================

impl<B: StorageBackend> ElementEngine<B> {
    /// Loads a live entity or fails with the appropriate kind.
    fn load_entity(&self, id: &ElementId) -> Result<Entity, EngineError> {
        let persisted = self.load_live(id)?;
        let actual = persisted.element.kind();
        match persisted.element {
            Element::Entity(entity) => Ok(entity),
            _ => Err(EngineError::TypeMismatch {
                id: id.clone(),
                expected: ElementKind::Entity,
                actual,
            }),
        }
    }

    /// Persists an entity change with its base and auxiliary events.
    fn apply_entity_change(
        &self,
        old: &Entity,
        new: Entity,
        actor: &ActorId,
        auxiliary: Option<NewEvent>,
    ) -> Result<Entity, EngineError> {
        let id = new.core.id.clone();
        let old_wire = Element::Entity(old.clone()).to_wire()?;
        let element = Element::Entity(new);
        let new_wire = element.to_wire()?;
        let base_event = NewEvent {
            element_id: id.clone(),
            event_type: EventKind::Updated,
            actor: actor.clone(),
            old_value: Some(old_wire),
            new_value: Some(new_wire),
            created_at: self.now(),
        };
        let mut ops = vec![
            PersistedElement::put_op(element.clone())?,
            WriteOp::AppendEvent(base_event),
        ];
        if let Some(auxiliary) = auxiliary {
            ops.push(WriteOp::AppendEvent(auxiliary));
        }
        ops.push(WriteOp::MarkDirty(id));
        self.backend().apply(&ops)?;
        match element {
            Element::Entity(entity) => Ok(entity),
            _ => Err(EngineError::InvalidInput {
                message: "entity change lost the entity variant".to_string(),
            }),
        }
    }

    /// Rotates an entity's signing key.
    ///
    /// The proof must be signed by the current key over the canonical
    /// rotation message and be younger than the configured window.
    ///
    /// # Errors
    ///
    /// Returns the `Signature` taxonomy: [`EngineError::NoCurrentKey`],
    /// [`EngineError::AlreadyRevoked`], [`EngineError::InvalidNewKey`],
    /// [`EngineError::SignatureExpired`], or
    /// [`EngineError::InvalidSignature`].
    pub fn rotate_entity_key(
        &self,
        verifier: &dyn SignatureVerifier,
        entity_id: &ElementId,
        new_key: &str,
        proof: &RotationProof,
        actor: &ActorId,
    ) -> Result<Entity, EngineError> {
        Self::require_public_actor(actor)?;
        let entity = self.load_entity(entity_id)?;
        if entity.key_revoked_at.is_some() {
            return Err(EngineError::AlreadyRevoked {
                entity: entity_id.clone(),
            });
        }
        let Some(current_key) = entity.public_key.clone() else {
            return Err(EngineError::NoCurrentKey {
                entity: entity_id.clone(),
            });
        };
        validate_public_key(new_key)?;
        let now = self.now();
        let age = now.millis_since(proof.signed_at);
        if age > self.config().rotation_proof_max_age_ms || age < 0 {
            return Err(EngineError::SignatureExpired {
                entity: entity_id.clone(),
            });
        }
        let message = rotation_message(entity_id, new_key, proof.signed_at);
        if !verifier.verify(&message, &proof.signature, &current_key) {
            return Err(EngineError::InvalidSignature {
                entity: entity_id.clone(),
            });
        }
        let mut rotated = entity.clone();
        rotated.public_key = Some(new_key.to_string());
        rotated.key_rotated_at = Some(now);
        rotated.core.updated_at = now;
        let auxiliary = NewEvent {
            element_id: entity_id.clone(),
            event_type: EventKind::KeyRotated,
            actor: actor.clone(),
            old_value: Some(json!({ "publicKey": current_key })),
            new_value: Some(json!({ "publicKey": new_key })),
            created_at: now,
        };
        self.apply_entity_change(&entity, rotated, actor, Some(auxiliary))
    }

    /// Revokes an entity's signing key. Terminal: a revoked entity cannot
    /// rotate or verify until re-registered.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyRevoked`] on repeat revocation and
    /// [`EngineError::NoCurrentKey`] when no key is registered.
    pub fn revoke_entity_key(
        &self,
        entity_id: &ElementId,
        actor: &ActorId,
    ) -> Result<Entity, EngineError> {
        Self::require_public_actor(actor)?;
        let entity = self.load_entity(entity_id)?;
        if entity.key_revoked_at.is_some() {
            return Err(EngineError::AlreadyRevoked {
                entity: entity_id.clone(),
            });
        }
        let Some(current_key) = entity.public_key.clone() else {
            return Err(EngineError::NoCurrentKey {
                entity: entity_id.clone(),
            });
        };
        let now = self.now();
        let mut revoked = entity.clone();
        revoked.public_key = None;
        revoked.key_revoked_at = Some(now);
        revoked.core.updated_at = now;
        let auxiliary = NewEvent {
            element_id: entity_id.clone(),
            event_type: EventKind::KeyRevoked,
            actor: actor.clone(),
            old_value: Some(json!({ "publicKey": current_key })),
            new_value: None,
            created_at: now,
        };
        self.apply_entity_change(&entity, revoked, actor, Some(auxiliary))
    }

    /// Verifies a signature attributed to an entity against its current key.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoCurrentKey`] when the entity has no usable
    /// key (unregistered, revoked, or deactivated) and
    /// [`EngineError::InvalidSignature`] when verification fails.
    pub fn verify_entity_signature(
        &self,
        verifier: &dyn SignatureVerifier,
        entity_id: &ElementId,
        message: &str,
        signature: &str,
    ) -> Result<(), EngineError> {
        let entity = self.load_entity(entity_id)?;
        if entity.deactivated_at.is_some() || entity.key_revoked_at.is_some() {
            return Err(EngineError::NoCurrentKey {
                entity: entity_id.clone(),
            });
        }
        let Some(current_key) = entity.public_key else {
            return Err(EngineError::NoCurrentKey {
                entity: entity_id.clone(),
            });
        };
        if !verifier.verify(message, signature, &current_key) {
            return Err(EngineError::InvalidSignature {
                entity: entity_id.clone(),
            });
        }
        Ok(())
    }

    /// Deactivates an entity. Idempotent: a deactivated entity is returned
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the entity is missing or the write
    /// fails.
    pub fn deactivate_entity(
        &self,
        entity_id: &ElementId,
        actor: &ActorId,
    ) -> Result<Entity, EngineError> {
        Self::require_public_actor(actor)?;
        let entity = self.load_entity(entity_id)?;
        if entity.deactivated_at.is_some() {
            return Ok(entity);
        }
        let now = self.now();
        let mut deactivated = entity.clone();
        deactivated.deactivated_at = Some(now);
        deactivated.core.updated_at = now;
        self.apply_entity_change(&entity, deactivated, actor, None)
    }
}
