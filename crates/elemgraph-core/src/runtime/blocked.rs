// crates/elemgraph-core/src/runtime/blocked.rs
// ============================================================================
// Module: Elemgraph Blocked Cache Service
// Description: Derived blocked-state index with incremental maintenance.
// Purpose: Keep (element, blocker, reason) rows bit-equal to a full rebuild.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The blocked cache is a projection over element statuses and dependency
//! edges. The single maintenance primitive is [`reevaluate`]: recompute one
//! element's full row set from its live incoming `blocks` and `gate` edges
//! (with transitive blocker propagation) and replace the stored rows. Edge
//! events, status events, and gate changes all reduce to re-evaluation over
//! the affected targets, which makes the incremental state identical to
//! [`ElementEngine::rebuild_blocked_cache`] output by construction.
//!
//! Automatic block/unblock transitions are returned as explicit records; the
//! engine applies them through an internal update path that appends
//! `auto_blocked` / `auto_unblocked` events and does not re-enter this
//! module.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;

use crate::core::BlockedRow;
use crate::core::DependencyKind;
use crate::core::Element;
use crate::core::ElementId;
use crate::core::EngineError;
use crate::core::EventKind;
use crate::core::GateSpec;
use crate::core::MAX_TRAVERSAL_DEPTH;
use crate::core::NewEvent;
use crate::core::TaskStatus;
use crate::core::identifiers::ActorId;
use crate::interfaces::StorageBackend;
use crate::interfaces::WriteOp;
use crate::runtime::engine::ElementEngine;

// ============================================================================
// SECTION: Transition Records
// ============================================================================

/// An automatic status transition decided by the cache layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoTransition {
    /// The element gained its first blocker while auto-blockable.
    Block {
        /// Element to transition.
        id: ElementId,
        /// Status recorded for later restoration.
        prev_status: TaskStatus,
    },
    /// The element lost its last blocker after being auto-blocked.
    Unblock {
        /// Element to transition.
        id: ElementId,
        /// Status to restore.
        restore: TaskStatus,
    },
}

// ============================================================================
// SECTION: Blocker Semantics
// ============================================================================

/// Reports whether an element, as a blocker, still holds its dependents.
///
/// Tombstoned elements and elements in a terminal status release their
/// dependents; everything else blocks while the edge exists.
#[must_use]
pub fn blocker_still_blocks(element: &Element) -> bool {
    if element.is_deleted() {
        return false;
    }
    match element {
        Element::Task(task) => task.status.blocks_dependents(),
        Element::Plan(plan) => !plan.status.is_terminal(),
        Element::Workflow(workflow) => {
            !matches!(workflow.status, crate::core::WorkflowStatus::Completed)
        }
        _ => true,
    }
}

// ============================================================================
// SECTION: Row Computation
// ============================================================================

/// Computes the full blocked row set for one element from its incoming
/// `blocks` and `gate` edges.
///
/// `blocks` edges contribute a row per live, unreleased blocker plus rows
/// for that blocker's own transitive blockers (original blocker ids are
/// preserved so later resolution fires correctly). `gate` edges contribute
/// one row per unsatisfied approver. Malformed gate metadata fails closed
/// with a single diagnostic row.
///
/// # Errors
///
/// Returns [`EngineError`] when a backend read fails.
pub fn rows_for<B: StorageBackend>(
    backend: &B,
    target: &ElementId,
) -> Result<BTreeSet<BlockedRow>, EngineError> {
    let mut rows = BTreeSet::new();
    for edge in backend.dependents_of(target, Some(&[DependencyKind::Blocks]))? {
        let Some(persisted) = backend.element(&edge.source_id)? else {
            continue;
        };
        if !blocker_still_blocks(&persisted.element) {
            continue;
        }
        rows.insert(BlockedRow {
            element_id: target.clone(),
            blocked_by: edge.source_id.clone(),
            reason: format!("blocked by {}", edge.source_id),
        });
        let mut visited = BTreeSet::from([target.clone(), edge.source_id.clone()]);
        collect_transitive(backend, &edge.source_id, &mut visited, 1, &mut |blocker| {
            rows.insert(BlockedRow {
                element_id: target.clone(),
                blocked_by: blocker.clone(),
                reason: format!("blocked by {blocker}"),
            });
        })?;
    }
    for edge in backend.dependents_of(target, Some(&[DependencyKind::Gate]))? {
        match edge.gate_spec() {
            Ok(gate) => {
                for approver in gate.unsatisfied_approvers() {
                    rows.insert(BlockedRow {
                        element_id: target.clone(),
                        blocked_by: edge.source_id.clone(),
                        reason: format!("awaiting approval from {approver}"),
                    });
                }
            }
            Err(_) => {
                rows.insert(BlockedRow {
                    element_id: target.clone(),
                    blocked_by: edge.source_id.clone(),
                    reason: "gate metadata invalid".to_string(),
                });
            }
        }
    }
    Ok(rows)
}

/// Walks a blocker's own incoming `blocks` edges, emitting every transitive
/// blocker. Bounded by the shared traversal depth cap and a visited set, so
/// cycles terminate.
fn collect_transitive<B: StorageBackend>(
    backend: &B,
    id: &ElementId,
    visited: &mut BTreeSet<ElementId>,
    depth: usize,
    emit: &mut impl FnMut(&ElementId),
) -> Result<(), EngineError> {
    if depth >= MAX_TRAVERSAL_DEPTH {
        return Ok(());
    }
    for edge in backend.dependents_of(id, Some(&[DependencyKind::Blocks]))? {
        if visited.contains(&edge.source_id) {
            continue;
        }
        let Some(persisted) = backend.element(&edge.source_id)? else {
            continue;
        };
        if !blocker_still_blocks(&persisted.element) {
            continue;
        }
        visited.insert(edge.source_id.clone());
        emit(&edge.source_id);
        collect_transitive(backend, &edge.source_id, visited, depth + 1, emit)?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Re-evaluation
// ============================================================================

/// Recomputes one element's blocked rows and replaces the stored set.
///
/// Returns the automatic transition to apply, if the element crossed the
/// blocked/unblocked boundary. No write happens when the rows are unchanged.
///
/// # Errors
///
/// Returns [`EngineError`] when a backend operation fails.
pub fn reevaluate<B: StorageBackend>(
    backend: &B,
    target: &ElementId,
) -> Result<Option<AutoTransition>, EngineError> {
    let old_rows: BTreeSet<BlockedRow> = backend.blocked_rows(target)?.into_iter().collect();
    let new_rows = rows_for(backend, target)?;
    if old_rows == new_rows {
        return Ok(None);
    }
    let mut ops = vec![WriteOp::ReplaceBlockedRows {
        element_id: target.clone(),
        rows: new_rows.iter().cloned().collect(),
    }];
    let mut transition = None;
    let element = backend.element(target)?;
    if old_rows.is_empty()
        && !new_rows.is_empty()
        && let Some(persisted) = &element
        && let Element::Task(task) = &persisted.element
        && task.core.deleted_at.is_none()
        && task.status.can_auto_block()
    {
        ops.push(WriteOp::SetRestoreStatus {
            element_id: target.clone(),
            status: task.status,
        });
        transition = Some(AutoTransition::Block {
            id: target.clone(),
            prev_status: task.status,
        });
    } else if !old_rows.is_empty() && new_rows.is_empty() {
        let restore = backend.restore_status(target)?;
        ops.push(WriteOp::ClearRestoreStatus(target.clone()));
        if let Some(restore) = restore
            && let Some(persisted) = &element
            && let Element::Task(task) = &persisted.element
            && task.core.deleted_at.is_none()
            && task.status == TaskStatus::Blocked
        {
            transition = Some(AutoTransition::Unblock {
                id: target.clone(),
                restore,
            });
        }
    }
    backend.apply(&ops)?;
    Ok(transition)
}

/// Collects the elements whose blocked state may depend on the given
/// element: targets of its outgoing blocking edges plus every element the
/// cache currently records as blocked by it.
///
/// # Errors
///
/// Returns [`EngineError`] when a backend read fails.
pub fn affected_targets<B: StorageBackend>(
    backend: &B,
    id: &ElementId,
) -> Result<BTreeSet<ElementId>, EngineError> {
    let mut targets = BTreeSet::new();
    for edge in
        backend.dependencies_of(id, Some(&[DependencyKind::Blocks, DependencyKind::Gate]))?
    {
        targets.insert(edge.target_id);
    }
    for row in backend.blocked_rows_by_blocker(id)? {
        targets.insert(row.element_id);
    }
    targets.remove(id);
    Ok(targets)
}

// ============================================================================
// SECTION: Rebuild
// ============================================================================

/// Report returned by a full blocked-cache rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    /// Live elements inspected.
    pub elements_checked: u64,
    /// Elements left with at least one blocked row.
    pub elements_blocked: u64,
    /// Wall-clock duration of the rebuild.
    pub duration: Duration,
}

/// Result of a gate satisfaction or approval change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateResolution {
    /// Whether the gate is now fully satisfied.
    pub satisfied: bool,
    /// Approvals currently recorded on the edge.
    pub approvals: Vec<ActorId>,
    /// Approvers still required (empty when satisfied).
    pub remaining: Vec<ActorId>,
}

impl GateResolution {
    /// Builds a resolution snapshot from a gate state.
    fn from_spec(gate: &GateSpec) -> Self {
        Self {
            satisfied: gate.is_satisfied(),
            approvals: gate.approvals.iter().cloned().collect(),
            remaining: gate.unsatisfied_approvers(),
        }
    }
}

impl<B: StorageBackend> ElementEngine<B> {
    /// Deletes all blocked rows and recomputes them from scratch.
    ///
    /// The output is identical to the incrementally maintained state; the
    /// rebuild fires no automatic transitions and does not touch dirtiness.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when a backend operation fails.
    pub fn rebuild_blocked_cache(&self) -> Result<RebuildReport, EngineError> {
        let started = Instant::now();
        let ids = self.backend().element_ids(false)?;
        let mut ops = vec![WriteOp::ClearBlockedCache];
        let mut elements_blocked = 0u64;
        for id in &ids {
            let rows = rows_for(self.backend(), id)?;
            if !rows.is_empty() {
                elements_blocked += 1;
                ops.push(WriteOp::ReplaceBlockedRows {
                    element_id: id.clone(),
                    rows: rows.into_iter().collect(),
                });
            }
        }
        self.backend().apply(&ops)?;
        Ok(RebuildReport {
            elements_checked: u64::try_from(ids.len()).unwrap_or(u64::MAX),
            elements_blocked,
            duration: started.elapsed(),
        })
    }

    /// Marks a gate edge explicitly satisfied (idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DependencyNotFound`] when the gate edge is
    /// absent.
    pub fn satisfy_gate(
        &self,
        source: &ElementId,
        target: &ElementId,
        actor: &ActorId,
    ) -> Result<GateResolution, EngineError> {
        Self::require_public_actor(actor)?;
        self.mutate_gate(source, target, actor, EventKind::GateSatisfied, |gate| {
            gate.mark_satisfied()
        })
    }

    /// Records an approval on a gate edge and re-evaluates the gate.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DependencyNotFound`] when the gate edge is
    /// absent.
    pub fn record_approval(
        &self,
        source: &ElementId,
        target: &ElementId,
        approver: &ActorId,
    ) -> Result<GateResolution, EngineError> {
        Self::require_public_actor(approver)?;
        let approver_id = approver.clone();
        self.mutate_gate(source, target, approver, EventKind::ApprovalRecorded, move |gate| {
            gate.record_approval(&approver_id)
        })
    }

    /// Withdraws an approval from a gate edge and re-evaluates the gate.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DependencyNotFound`] when the gate edge is
    /// absent.
    pub fn remove_approval(
        &self,
        source: &ElementId,
        target: &ElementId,
        approver: &ActorId,
    ) -> Result<GateResolution, EngineError> {
        Self::require_public_actor(approver)?;
        let approver_id = approver.clone();
        self.mutate_gate(source, target, approver, EventKind::ApprovalRemoved, move |gate| {
            gate.remove_approval(&approver_id)
        })
    }

    /// Shared gate mutation path: load, mutate, persist, re-evaluate.
    fn mutate_gate(
        &self,
        source: &ElementId,
        target: &ElementId,
        actor: &ActorId,
        event_kind: EventKind,
        mutate: impl FnOnce(&mut GateSpec) -> bool,
    ) -> Result<GateResolution, EngineError> {
        let Some(edge) = self.backend().dependency(source, target, DependencyKind::Gate)?
        else {
            return Err(EngineError::DependencyNotFound {
                src: source.clone(),
                target: target.clone(),
                kind: DependencyKind::Gate,
            });
        };
        let old_metadata = edge.metadata.clone();
        let mut gate = edge.gate_spec()?;
        let changed = mutate(&mut gate);
        if changed {
            let metadata = gate.to_metadata();
            let event = NewEvent {
                element_id: target.clone(),
                event_type: event_kind,
                actor: actor.clone(),
                old_value: old_metadata,
                new_value: Some(metadata.clone()),
                created_at: self.now(),
            };
            self.backend().apply(&[
                WriteOp::SetDependencyMetadata {
                    source: source.clone(),
                    target: target.clone(),
                    kind: DependencyKind::Gate,
                    metadata: Some(metadata),
                },
                WriteOp::AppendEvent(event),
                WriteOp::MarkDirty(target.clone()),
            ])?;
            let transition = reevaluate(self.backend(), target)?;
            if let Some(transition) = transition {
                self.apply_auto_transitions(&[transition])?;
            }
        }
        Ok(GateResolution::from_spec(&gate))
    }
}
