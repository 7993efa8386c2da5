// crates/elemgraph-core/src/core/errors.rs
// ============================================================================
// Module: Elemgraph Error Taxonomy
// Description: Typed failure kinds surfaced by the element engine.
// Purpose: Give callers stable, structured failures with offending detail.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every engine failure carries a kind, a human-readable message, and the
//! identifying detail (id, field, or actor) of the violation. Validation and
//! invariant failures roll back the enclosing transaction; no event is
//! appended for a failed mutation. Post-commit side effects (blocked cache,
//! dirty feed) never surface here; a cache anomaly is repaired by rebuild.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::dependency::DependencyKind;
use crate::core::element::ElementKind;
use crate::core::hashing::HashError;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::ElementId;
use crate::core::identifiers::InvalidIdError;
use crate::interfaces::BackendError;
use crate::interfaces::PlaybookError;

// ============================================================================
// SECTION: Engine Errors
// ============================================================================

/// Failure kinds surfaced by the element engine.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages avoid embedding full element payloads.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------------------------------------------------------------------
    // Not found
    // ------------------------------------------------------------------
    /// Referenced element does not exist.
    #[error("element not found: {id}")]
    NotFound {
        /// Missing element identifier.
        id: ElementId,
    },
    /// Referenced dependency triple does not exist.
    #[error("dependency not found: {src} -> {target} ({kind})")]
    DependencyNotFound {
        /// Source element identifier.
        src: ElementId,
        /// Target element identifier.
        target: ElementId,
        /// Dependency kind.
        kind: DependencyKind,
    },
    /// Referenced document version does not exist.
    #[error("document version not found: {id} v{version}")]
    VersionNotFound {
        /// Document identifier.
        id: ElementId,
        /// Missing version number.
        version: u64,
    },

    // ------------------------------------------------------------------
    // Conflicts
    // ------------------------------------------------------------------
    /// A uniqueness rule on names rejected the mutation.
    #[error("duplicate {kind} name: {name}")]
    DuplicateName {
        /// Element kind carrying the name.
        kind: ElementKind,
        /// The conflicting name.
        name: String,
    },
    /// The dependency triple already exists.
    #[error("duplicate dependency: {src} -> {target} ({kind})")]
    DuplicateDependency {
        /// Source element identifier.
        src: ElementId,
        /// Target element identifier.
        target: ElementId,
        /// Dependency kind.
        kind: DependencyKind,
    },

    // ------------------------------------------------------------------
    // Constraints
    // ------------------------------------------------------------------
    /// The element kind refuses updates and deletes.
    #[error("{kind} elements are immutable: {id}")]
    Immutable {
        /// Offending element identifier.
        id: ElementId,
        /// Immutable element kind.
        kind: ElementKind,
    },
    /// The element is not of the kind the operation requires.
    #[error("type mismatch for {id}: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Offending element identifier.
        id: ElementId,
        /// Kind the operation requires.
        expected: ElementKind,
        /// Kind actually stored.
        actual: ElementKind,
    },
    /// The element's status forbids the operation.
    #[error("invalid status {status} for {id}: {message}")]
    InvalidStatus {
        /// Offending element identifier.
        id: ElementId,
        /// Current status label.
        status: String,
        /// Why the status refuses the operation.
        message: String,
    },
    /// The task already belongs to a plan.
    #[error("task {task} already belongs to plan {plan}")]
    AlreadyInPlan {
        /// Task identifier.
        task: ElementId,
        /// Plan the task already belongs to.
        plan: ElementId,
    },
    /// Direct channels refuse membership changes.
    #[error("direct channel membership is fixed: {channel}")]
    DirectChannelMembership {
        /// Direct channel identifier.
        channel: ElementId,
    },

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------
    /// Structurally invalid input rejected before persistence.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input.
        message: String,
    },
    /// A required field is absent or empty.
    #[error("missing required field: {field}")]
    MissingRequiredField {
        /// Name of the missing field.
        field: String,
    },
    /// An identifier failed structural validation.
    #[error("invalid identifier: {value}")]
    InvalidId {
        /// The rejected identifier text.
        value: String,
    },

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------
    /// The actor is not a member of the channel.
    #[error("{actor} is not a member of channel {channel}")]
    NotAMember {
        /// Channel identifier.
        channel: ElementId,
        /// Non-member actor.
        actor: ActorId,
    },
    /// The actor may not modify the channel's member set.
    #[error("{actor} may not modify members of channel {channel}")]
    CannotModifyMembers {
        /// Channel identifier.
        channel: ElementId,
        /// Refused actor.
        actor: ActorId,
    },

    // ------------------------------------------------------------------
    // Signatures
    // ------------------------------------------------------------------
    /// The entity has no registered, unrevoked key.
    #[error("entity {entity} has no current key")]
    NoCurrentKey {
        /// Entity identifier.
        entity: ElementId,
    },
    /// The signature failed verification against the current key.
    #[error("invalid signature for entity {entity}")]
    InvalidSignature {
        /// Entity identifier.
        entity: ElementId,
    },
    /// The signed proof is older than the accepted window.
    #[error("signature proof expired for entity {entity}")]
    SignatureExpired {
        /// Entity identifier.
        entity: ElementId,
    },
    /// The entity's key was already revoked.
    #[error("key already revoked for entity {entity}")]
    AlreadyRevoked {
        /// Entity identifier.
        entity: ElementId,
    },
    /// The replacement key material is malformed.
    #[error("invalid new key: {message}")]
    InvalidNewKey {
        /// What was wrong with the key material.
        message: String,
    },

    // ------------------------------------------------------------------
    // Infrastructure
    // ------------------------------------------------------------------
    /// File I/O failed during export or import.
    #[error("io error: {message}")]
    Io {
        /// Underlying I/O failure description.
        message: String,
    },
    /// The storage backend reported an error.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// Content hashing failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// The playbook loader reported an error.
    #[error(transparent)]
    Playbook(#[from] PlaybookError),
}

impl From<InvalidIdError> for EngineError {
    fn from(error: InvalidIdError) -> Self {
        Self::InvalidId { value: error.value }
    }
}
