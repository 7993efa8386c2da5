// crates/elemgraph-core/src/core/identifiers.rs
// ============================================================================
// Module: Elemgraph Identifiers
// Description: Element, actor, and playbook identifiers with stable wire forms.
// Purpose: Provide strongly typed identifiers plus root identifier issuance.
// Dependencies: rand, serde, thiserror
// ============================================================================

//! ## Overview
//! Element identifiers are short opaque strings of the form
//! `el-<lowercase-alphanumeric{3..8}>`. Children of a plan or workflow append
//! `.<positive integer>` segments recursively (`el-ab12c.3`, `el-ab12c.3.1`).
//! Actor identifiers are opaque except for the reserved `system:` prefix,
//! which only engine-internal transitions may use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix shared by every root element identifier.
pub const ELEMENT_ID_PREFIX: &str = "el-";
/// Minimum length of the random segment of a root identifier.
pub const MIN_ROOT_SEGMENT_LEN: usize = 3;
/// Maximum length of the random segment of a root identifier.
pub const MAX_ROOT_SEGMENT_LEN: usize = 8;
/// Prefix reserved for engine-internal actors.
pub const SYSTEM_ACTOR_PREFIX: &str = "system:";
/// Reserved actor stamped on automatic block/unblock transitions.
pub const BLOCKED_CACHE_ACTOR: &str = "system:blocked-cache";
/// Reserved actor stamped on automatic workflow transitions.
pub const WORKFLOW_ACTOR: &str = "system:workflow";
/// Alphabet used when issuing root identifiers.
const ROOT_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Error raised when an identifier fails structural validation.
///
/// # Invariants
/// - `value` echoes the rejected input for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid element identifier: {value}")]
pub struct InvalidIdError {
    /// The rejected identifier text.
    pub value: String,
}

// ============================================================================
// SECTION: Element Identifier
// ============================================================================

/// Identifier of a stored element.
///
/// # Invariants
/// - Valid values match `el-[a-z0-9]{3,8}` optionally followed by
///   `.<positive integer>` segments.
/// - Equality is string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    /// Creates an identifier without validation.
    ///
    /// Intended for identifiers the engine issued itself; external input
    /// should go through [`ElementId::parse`].
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parses and validates an identifier from external input.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdError`] when the value does not match the
    /// identifier grammar.
    pub fn parse(value: &str) -> Result<Self, InvalidIdError> {
        let reject = || InvalidIdError {
            value: value.to_string(),
        };
        let rest = value.strip_prefix(ELEMENT_ID_PREFIX).ok_or_else(reject)?;
        let root_segment = rest.split('.').next().ok_or_else(reject)?;
        if root_segment.len() < MIN_ROOT_SEGMENT_LEN
            || root_segment.len() > MAX_ROOT_SEGMENT_LEN
            || !root_segment.bytes().all(|byte| ROOT_ALPHABET.contains(&byte))
        {
            return Err(reject());
        }
        for child_segment in rest.split('.').skip(1) {
            let number: u64 = child_segment.parse().map_err(|_| reject())?;
            if number == 0 || child_segment.starts_with('0') {
                return Err(reject());
            }
        }
        Ok(Self(value.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reports whether this is a root identifier (no child segments).
    #[must_use]
    pub fn is_root(&self) -> bool {
        !self.0.contains('.')
    }

    /// Returns the parent identifier for a child, or `None` for roots.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0.rsplit_once('.').map(|(parent, _)| Self(parent.to_string()))
    }

    /// Returns the child identifier with the given ordinal.
    #[must_use]
    pub fn child(&self, ordinal: u64) -> Self {
        Self(format!("{}.{ordinal}", self.0))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Root Identifier Issuance
// ============================================================================

/// Issues a fresh random root identifier with the given segment length.
///
/// The length is clamped into the valid `3..=8` range. Uniqueness is
/// probabilistic; callers retry against the store on collision.
#[must_use]
pub fn random_root_id(segment_len: usize) -> ElementId {
    let segment_len = segment_len.clamp(MIN_ROOT_SEGMENT_LEN, MAX_ROOT_SEGMENT_LEN);
    let mut rng = rand::thread_rng();
    let mut id = String::with_capacity(ELEMENT_ID_PREFIX.len() + segment_len);
    id.push_str(ELEMENT_ID_PREFIX);
    for _ in 0 .. segment_len {
        let index = rng.gen_range(0 .. ROOT_ALPHABET.len());
        id.push(ROOT_ALPHABET[index] as char);
    }
    ElementId(id)
}

// ============================================================================
// SECTION: Actor Identifier
// ============================================================================

/// Identifier of the actor responsible for a mutation or event.
///
/// # Invariants
/// - Opaque UTF-8 string; values with the `system:` prefix are reserved for
///   engine-internal transitions and rejected on public mutations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Creates a new actor identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reports whether the actor carries the reserved `system:` prefix.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.0.starts_with(SYSTEM_ACTOR_PREFIX)
    }

    /// Returns the reserved actor used for automatic block transitions.
    #[must_use]
    pub fn blocked_cache() -> Self {
        Self(BLOCKED_CACHE_ACTOR.to_string())
    }

    /// Returns the reserved actor used for automatic workflow transitions.
    #[must_use]
    pub fn workflow() -> Self {
        Self(WORKFLOW_ACTOR.to_string())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ActorId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Playbook Identifier
// ============================================================================

/// Identifier of a workflow playbook resolved through the loader.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization or validation is applied by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaybookId(String);

impl PlaybookId {
    /// Creates a new playbook identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaybookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PlaybookId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PlaybookId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
