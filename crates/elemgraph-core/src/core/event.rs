// crates/elemgraph-core/src/core/event.rs
// ============================================================================
// Module: Elemgraph Event Log Model
// Description: Append-only event records and change-field computation.
// Purpose: Capture every state change with actor and payload provenance.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every committed mutation appends at least one event inside the same
//! transaction as the state change, so event ordering by id matches commit
//! order. Base events are `created`, `updated`, `deleted`, `closed`, and
//! `reopened`; auxiliary events cover dependencies, memberships, automatic
//! transitions, and key lifecycle.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ActorId;
use crate::core::identifiers::ElementId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event Kind
// ============================================================================

/// Event-type tag recorded on every log entry.
///
/// # Invariants
/// - Wire values are stable snake_case strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Element was created.
    Created,
    /// Element fields, tags, or metadata changed.
    Updated,
    /// Element was soft-deleted.
    Deleted,
    /// Task or plan entered a closed state.
    Closed,
    /// Task or plan left a closed state.
    Reopened,
    /// A dependency edge was added.
    DependencyAdded,
    /// A dependency edge was removed.
    DependencyRemoved,
    /// The blocked cache transitioned the task to blocked.
    AutoBlocked,
    /// The blocked cache restored the task's pre-block status.
    AutoUnblocked,
    /// A workflow advanced from pending to running.
    AutoStarted,
    /// A workflow completed because all tasks closed.
    AutoCompleted,
    /// A workflow failed because a task was tombstoned.
    AutoFailed,
    /// An actor joined a channel.
    MemberAdded,
    /// An actor left or was removed from a channel.
    MemberRemoved,
    /// A gate edge was explicitly satisfied.
    GateSatisfied,
    /// An approval was recorded on a gate edge.
    ApprovalRecorded,
    /// An approval was withdrawn from a gate edge.
    ApprovalRemoved,
    /// An entity's signing key was rotated.
    KeyRotated,
    /// An entity's signing key was revoked.
    KeyRevoked,
}

impl EventKind {
    /// Returns the stable wire label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Closed => "closed",
            Self::Reopened => "reopened",
            Self::DependencyAdded => "dependency_added",
            Self::DependencyRemoved => "dependency_removed",
            Self::AutoBlocked => "auto_blocked",
            Self::AutoUnblocked => "auto_unblocked",
            Self::AutoStarted => "auto_started",
            Self::AutoCompleted => "auto_completed",
            Self::AutoFailed => "auto_failed",
            Self::MemberAdded => "member_added",
            Self::MemberRemoved => "member_removed",
            Self::GateSatisfied => "gate_satisfied",
            Self::ApprovalRecorded => "approval_recorded",
            Self::ApprovalRemoved => "approval_removed",
            Self::KeyRotated => "key_rotated",
            Self::KeyRevoked => "key_revoked",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// ============================================================================
// SECTION: Event Records
// ============================================================================

/// A committed event log entry.
///
/// # Invariants
/// - `id` is assigned by the backend and matches commit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Monotonic event identifier.
    pub id: i64,
    /// Element the event targets.
    pub element_id: ElementId,
    /// Event-type tag.
    pub event_type: EventKind,
    /// Actor responsible for the change.
    pub actor: ActorId,
    /// Payload before the change, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    /// Payload after the change, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    /// Creation instant.
    pub created_at: Timestamp,
}

/// An event awaiting its backend-assigned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Element the event targets.
    pub element_id: ElementId,
    /// Event-type tag.
    pub event_type: EventKind,
    /// Actor responsible for the change.
    pub actor: ActorId,
    /// Payload before the change, when applicable.
    pub old_value: Option<Value>,
    /// Payload after the change, when applicable.
    pub new_value: Option<Value>,
    /// Creation instant.
    pub created_at: Timestamp,
}

impl NewEvent {
    /// Builds an event with no payloads.
    #[must_use]
    pub const fn bare(
        element_id: ElementId,
        event_type: EventKind,
        actor: ActorId,
        created_at: Timestamp,
    ) -> Self {
        Self {
            element_id,
            event_type,
            actor,
            old_value: None,
            new_value: None,
            created_at,
        }
    }
}

// ============================================================================
// SECTION: Event Filter
// ============================================================================

/// Filter applied when reading an element's event log.
///
/// Default ordering is `created_at` descending (ties broken by id).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    /// Restrict to these event-type tags.
    #[serde(default)]
    pub event_types: Option<Vec<EventKind>>,
    /// Restrict to events recorded by this actor.
    #[serde(default)]
    pub actor: Option<ActorId>,
    /// Only events at or after this instant.
    #[serde(default)]
    pub since: Option<Timestamp>,
    /// Only events at or before this instant.
    #[serde(default)]
    pub until: Option<Timestamp>,
    /// Maximum number of rows to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

// ============================================================================
// SECTION: Changed Fields
// ============================================================================

/// Computes the sorted union of added, removed, and value-changed top-level
/// keys between two event payloads.
///
/// A `None` (or non-object) side contributes no keys of its own, so the
/// result is all keys of the other side.
#[must_use]
pub fn compute_changed_fields(old: Option<&Value>, new: Option<&Value>) -> Vec<String> {
    let empty = serde_json::Map::new();
    let old_fields = old.and_then(Value::as_object).unwrap_or(&empty);
    let new_fields = new.and_then(Value::as_object).unwrap_or(&empty);
    let mut changed = BTreeSet::new();
    for (key, old_value) in old_fields {
        match new_fields.get(key) {
            Some(new_value) if new_value == old_value => {}
            _ => {
                changed.insert(key.clone());
            }
        }
    }
    for key in new_fields.keys() {
        if !old_fields.contains_key(key) {
            changed.insert(key.clone());
        }
    }
    changed.into_iter().collect()
}
