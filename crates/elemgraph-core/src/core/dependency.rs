// crates/elemgraph-core/src/core/dependency.rs
// ============================================================================
// Module: Elemgraph Dependency Model
// Description: Typed directed edges between elements plus gate metadata.
// Purpose: Provide the edge records backing blocking, hierarchy, and gating.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A dependency is a directed typed edge; the `(source, target, kind)` triple
//! is the primary key. `blocks` edges read "source blocks target, so target
//! is blocked until source closes". `parent-child` edges point from child to
//! parent. `gate` edges carry approval metadata as a closed shape: exactly
//! one of `all_of` or `any_of`; any other shape is rejected as invalid input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::errors::EngineError;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::ElementId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Dependency Kind
// ============================================================================

/// Kind of a directed dependency edge.
///
/// # Invariants
/// - Wire values are stable kebab-case strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Source blocks target until the source closes.
    Blocks,
    /// Child-to-parent containment edge.
    ParentChild,
    /// Informational association.
    RelatesTo,
    /// Source gates target behind named approvals.
    Gate,
}

impl DependencyKind {
    /// Returns the stable wire label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::ParentChild => "parent-child",
            Self::RelatesTo => "relates-to",
            Self::Gate => "gate",
        }
    }

    /// Reports whether the kind participates in blocked-state derivation.
    #[must_use]
    pub const fn affects_blocking(self) -> bool {
        matches!(self, Self::Blocks | Self::Gate)
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// ============================================================================
// SECTION: Dependency Record
// ============================================================================

/// A persisted dependency edge.
///
/// # Invariants
/// - `(source_id, target_id, kind)` is unique.
/// - `metadata` is only interpreted for gate edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRecord {
    /// Source element identifier.
    pub source_id: ElementId,
    /// Target element identifier.
    pub target_id: ElementId,
    /// Edge kind.
    #[serde(rename = "type")]
    pub kind: DependencyKind,
    /// Creation instant.
    pub created_at: Timestamp,
    /// Actor that created the edge.
    pub created_by: ActorId,
    /// Optional edge metadata (gate approval state, annotations).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl DependencyRecord {
    /// Parses the gate approval state out of the edge metadata.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when the edge is not a gate or
    /// the metadata does not match the closed gate shape.
    pub fn gate_spec(&self) -> Result<GateSpec, EngineError> {
        if self.kind != DependencyKind::Gate {
            return Err(EngineError::InvalidInput {
                message: format!(
                    "dependency {} -> {} is not a gate",
                    self.source_id, self.target_id
                ),
            });
        }
        let metadata = self.metadata.as_ref().ok_or_else(|| EngineError::InvalidInput {
            message: "gate dependency is missing approval metadata".to_string(),
        })?;
        GateSpec::from_metadata(metadata)
    }
}

// ============================================================================
// SECTION: Gate Approval State
// ============================================================================

/// Approver quorum declared on a gate edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateQuorum {
    /// Every listed approver must approve.
    AllOf(Vec<ActorId>),
    /// Any single listed approver suffices.
    AnyOf(Vec<ActorId>),
}

impl GateQuorum {
    /// Returns the declared approver list.
    #[must_use]
    pub fn approvers(&self) -> &[ActorId] {
        match self {
            Self::AllOf(approvers) | Self::AnyOf(approvers) => approvers,
        }
    }
}

/// Raw serde shape used to keep the gate metadata enumeration closed.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct GateMetadataShape {
    /// All-of quorum approvers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    all_of: Option<Vec<ActorId>>,
    /// Any-of quorum approvers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    any_of: Option<Vec<ActorId>>,
    /// Approvals recorded so far.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    approvals: BTreeSet<ActorId>,
    /// Explicit satisfaction override.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    satisfied: bool,
}

/// Approval state of a gate edge.
///
/// # Invariants
/// - The quorum list is non-empty.
/// - `satisfied` is sticky once set by [`GateSpec::mark_satisfied`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSpec {
    /// Declared approver quorum.
    pub quorum: GateQuorum,
    /// Approvals recorded so far.
    pub approvals: BTreeSet<ActorId>,
    /// Explicit satisfaction override.
    pub satisfied: bool,
}

impl GateSpec {
    /// Creates a fresh gate state with no recorded approvals.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when the approver list is empty.
    pub fn new(quorum: GateQuorum) -> Result<Self, EngineError> {
        if quorum.approvers().is_empty() {
            return Err(EngineError::InvalidInput {
                message: "gate quorum requires at least one approver".to_string(),
            });
        }
        Ok(Self {
            quorum,
            approvals: BTreeSet::new(),
            satisfied: false,
        })
    }

    /// Parses gate state from edge metadata, rejecting unknown shapes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when the metadata carries
    /// unknown keys, both quorums, or neither.
    pub fn from_metadata(metadata: &Value) -> Result<Self, EngineError> {
        let shape: GateMetadataShape =
            serde_json::from_value(metadata.clone()).map_err(|err| EngineError::InvalidInput {
                message: format!("gate metadata does not match the closed shape: {err}"),
            })?;
        let quorum = match (shape.all_of, shape.any_of) {
            (Some(all_of), None) => GateQuorum::AllOf(all_of),
            (None, Some(any_of)) => GateQuorum::AnyOf(any_of),
            _ => {
                return Err(EngineError::InvalidInput {
                    message: "gate metadata requires exactly one of all_of or any_of".to_string(),
                });
            }
        };
        if quorum.approvers().is_empty() {
            return Err(EngineError::InvalidInput {
                message: "gate quorum requires at least one approver".to_string(),
            });
        }
        Ok(Self {
            quorum,
            approvals: shape.approvals,
            satisfied: shape.satisfied,
        })
    }

    /// Serializes the gate state back into edge metadata.
    #[must_use]
    pub fn to_metadata(&self) -> Value {
        let shape = match &self.quorum {
            GateQuorum::AllOf(approvers) => GateMetadataShape {
                all_of: Some(approvers.clone()),
                any_of: None,
                approvals: self.approvals.clone(),
                satisfied: self.satisfied,
            },
            GateQuorum::AnyOf(approvers) => GateMetadataShape {
                all_of: None,
                any_of: Some(approvers.clone()),
                approvals: self.approvals.clone(),
                satisfied: self.satisfied,
            },
        };
        serde_json::to_value(shape).unwrap_or(Value::Null)
    }

    /// Reports whether the gate is currently satisfied.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        if self.satisfied {
            return true;
        }
        match &self.quorum {
            GateQuorum::AllOf(approvers) => {
                approvers.iter().all(|approver| self.approvals.contains(approver))
            }
            GateQuorum::AnyOf(approvers) => {
                approvers.iter().any(|approver| self.approvals.contains(approver))
            }
        }
    }

    /// Returns the approvers still required for satisfaction.
    ///
    /// Empty when the gate is satisfied. For an unsatisfied any-of quorum,
    /// every listed approver is still a candidate.
    #[must_use]
    pub fn unsatisfied_approvers(&self) -> Vec<ActorId> {
        if self.is_satisfied() {
            return Vec::new();
        }
        match &self.quorum {
            GateQuorum::AllOf(approvers) => approvers
                .iter()
                .filter(|approver| !self.approvals.contains(*approver))
                .cloned()
                .collect(),
            GateQuorum::AnyOf(approvers) => approvers.clone(),
        }
    }

    /// Records an approval; returns whether the state changed.
    pub fn record_approval(&mut self, approver: &ActorId) -> bool {
        self.approvals.insert(approver.clone())
    }

    /// Removes an approval; returns whether the state changed.
    pub fn remove_approval(&mut self, approver: &ActorId) -> bool {
        self.approvals.remove(approver)
    }

    /// Marks the gate explicitly satisfied; returns whether the state changed.
    pub fn mark_satisfied(&mut self) -> bool {
        let changed = !self.satisfied;
        self.satisfied = true;
        changed
    }
}

// ============================================================================
// SECTION: Blocked Cache Row
// ============================================================================

/// One derived blocked-state row.
///
/// # Invariants
/// - The row set for an element is a pure function of element statuses and
///   dependency edges, reproducible by a full rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedRow {
    /// The element treated as blocked.
    pub element_id: ElementId,
    /// The element (or gate source) responsible for the block.
    pub blocked_by: ElementId,
    /// Human-readable reason.
    pub reason: String,
}
