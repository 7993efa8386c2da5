// crates/elemgraph-core/src/runtime/plans.rs
// ============================================================================
// Module: Elemgraph Plan Operations
// Description: Plan membership, progress, hierarchical ids, and bulk ops.
// Purpose: Group tasks under plans and operate on them in bulk.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! A task belongs to at most one plan through a single `parent-child` edge
//! pointing from the task to the plan. Tasks created inside a plan receive
//! hierarchical identifiers (`<plan>.<n>`) allocated atomically by the
//! backend. Bulk operations iterate the plan's live tasks with the shared
//! filter surface, skip no-ops, collect per-task errors, and keep going.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Serialize;

use crate::core::DependencyKind;
use crate::core::DependencyRecord;
use crate::core::Element;
use crate::core::ElementFilter;
use crate::core::ElementId;
use crate::core::ElementKind;
use crate::core::ElementPatch;
use crate::core::EngineError;
use crate::core::FieldsPatch;
use crate::core::NewElement;
use crate::core::NewTask;
use crate::core::Plan;
use crate::core::Task;
use crate::core::TaskFilter;
use crate::core::TaskPatch;
use crate::core::TaskStatus;
use crate::core::Timestamp;
use crate::core::identifiers::ActorId;
use crate::interfaces::StorageBackend;
use crate::runtime::engine::ElementEngine;
use crate::runtime::engine::MutateOptions;

// ============================================================================
// SECTION: Result Shapes
// ============================================================================

/// Task status breakdown for a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanProgress {
    /// Plan identifier.
    pub plan_id: ElementId,
    /// Live tasks in the plan.
    pub total: u64,
    /// Task counts by status.
    pub counts: BTreeMap<TaskStatus, u64>,
    /// Closed-task count.
    pub closed: u64,
    /// Fraction of tasks closed (0.0 for an empty plan).
    pub fraction_closed: f64,
}

/// One per-task failure collected by a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTaskError {
    /// Task the operation failed on.
    pub id: ElementId,
    /// Failure description.
    pub message: String,
}

/// Outcome of a bulk plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    /// Tasks actually updated.
    pub updated_count: usize,
    /// Tasks skipped as no-ops.
    pub skipped_count: usize,
    /// Identifiers of updated tasks.
    pub updated_ids: Vec<ElementId>,
    /// Identifiers of skipped tasks.
    pub skipped_ids: Vec<ElementId>,
    /// Per-task failures; the operation continues past them.
    pub errors: Vec<BulkTaskError>,
}

impl BulkOutcome {
    /// Records an updated task.
    fn updated(&mut self, id: ElementId) {
        self.updated_count += 1;
        self.updated_ids.push(id);
    }

    /// Records a skipped task.
    fn skipped(&mut self, id: ElementId) {
        self.skipped_count += 1;
        self.skipped_ids.push(id);
    }

    /// Records a per-task failure.
    fn failed(&mut self, id: ElementId, error: &EngineError) {
        self.errors.push(BulkTaskError {
            id,
            message: error.to_string(),
        });
    }
}

// ============================================================================
// SECTION: Plan Operations
// ============================================================================

impl<B: StorageBackend> ElementEngine<B> {
    /// Loads a live plan or fails with the appropriate kind.
    fn load_plan(&self, id: &ElementId) -> Result<Plan, EngineError> {
        let persisted = self.load_live(id)?;
        let actual = persisted.element.kind();
        match persisted.element {
            Element::Plan(plan) => Ok(plan),
            _ => Err(EngineError::TypeMismatch {
                id: id.clone(),
                expected: ElementKind::Plan,
                actual,
            }),
        }
    }

    /// Links an existing task into a plan with a `parent-child` edge.
    ///
    /// Verifies both element kinds and the at-most-one-plan invariant.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyInPlan`] when the task already belongs
    /// to a plan.
    pub fn add_task_to_plan(
        &self,
        task_id: &ElementId,
        plan_id: &ElementId,
        actor: &ActorId,
    ) -> Result<DependencyRecord, EngineError> {
        ElementEngine::<B>::require_public_actor(actor)?;
        let task = self.load_live(task_id)?;
        if task.element.kind() != ElementKind::Task {
            return Err(EngineError::TypeMismatch {
                id: task_id.clone(),
                expected: ElementKind::Task,
                actual: task.element.kind(),
            });
        }
        self.load_plan(plan_id)?;
        for edge in self.backend().dependencies_of(task_id, Some(&[DependencyKind::ParentChild]))? {
            if let Some(parent) = self.backend().element(&edge.target_id)?
                && parent.element.kind() == ElementKind::Plan
            {
                return Err(EngineError::AlreadyInPlan {
                    task: task_id.clone(),
                    plan: edge.target_id,
                });
            }
        }
        self.add_dependency(task_id, plan_id, DependencyKind::ParentChild, None, actor)
    }

    /// Returns the plan's live member tasks, filtered.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the plan is missing or a read fails.
    pub fn get_tasks_in_plan(
        &self,
        plan_id: &ElementId,
        filter: &ElementFilter,
    ) -> Result<Vec<Task>, EngineError> {
        self.load_plan(plan_id)?;
        let member_edges =
            self.backend().dependents_of(plan_id, Some(&[DependencyKind::ParentChild]))?;
        let member_ids: Vec<ElementId> =
            member_edges.into_iter().map(|edge| edge.source_id).collect();
        let mut tasks = Vec::new();
        for persisted in self.backend().elements(&member_ids)? {
            let Element::Task(task) = persisted.element else {
                continue;
            };
            if task.core.deleted_at.is_some() && !filter.include_deleted {
                continue;
            }
            if task_matches(&task, filter) {
                tasks.push(task);
            }
        }
        tasks.sort_by(|a, b| a.core.id.cmp(&b.core.id));
        Ok(tasks)
    }

    /// Counts the plan's tasks by status and reports a progress summary.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the plan is missing or a read fails.
    pub fn get_plan_progress(&self, plan_id: &ElementId) -> Result<PlanProgress, EngineError> {
        let tasks = self.get_tasks_in_plan(plan_id, &ElementFilter::default())?;
        let mut counts: BTreeMap<TaskStatus, u64> = BTreeMap::new();
        for task in &tasks {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        let total = u64::try_from(tasks.len()).unwrap_or(u64::MAX);
        let closed = counts.get(&TaskStatus::Closed).copied().unwrap_or(0);
        #[allow(clippy::cast_precision_loss, reason = "progress fraction is advisory")]
        let fraction_closed = if total == 0 {
            0.0
        } else {
            closed as f64 / total as f64
        };
        Ok(PlanProgress {
            plan_id: plan_id.clone(),
            total,
            counts,
            closed,
            fraction_closed,
        })
    }

    /// Creates a task inside a plan under a hierarchical child identifier.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidStatus`] when the plan is not in draft
    /// or active.
    pub fn create_task_in_plan(
        &self,
        plan_id: &ElementId,
        input: NewTask,
        options: &MutateOptions,
    ) -> Result<Task, EngineError> {
        ElementEngine::<B>::require_public_actor(&options.actor)?;
        let plan = self.load_plan(plan_id)?;
        if !plan.status.accepts_tasks() {
            return Err(EngineError::InvalidStatus {
                id: plan_id.clone(),
                status: plan.status.to_string(),
                message: "plan does not accept new tasks".to_string(),
            });
        }
        let ordinal = self.backend().next_child_number(plan_id)?;
        let task_id = plan_id.child(ordinal);
        let element = self.create_with_id(task_id.clone(), NewElement::Task(input), options)?;
        self.add_dependency(&task_id, plan_id, DependencyKind::ParentChild, None, &options.actor)?;
        match element {
            Element::Task(task) => Ok(task),
            _ => Err(EngineError::InvalidInput {
                message: "task factory produced a non-task element".to_string(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Bulk operations
    // ------------------------------------------------------------------

    /// Closes every matching live task in the plan, skipping those already
    /// closed or tombstoned.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the plan itself is missing; per-task
    /// failures are collected in the outcome instead.
    pub fn bulk_close_plan_tasks(
        &self,
        plan_id: &ElementId,
        filter: &ElementFilter,
        reason: Option<String>,
        actor: &ActorId,
    ) -> Result<BulkOutcome, EngineError> {
        let tasks = self.get_tasks_in_plan(plan_id, filter)?;
        let options = MutateOptions::new(actor.clone());
        let mut outcome = BulkOutcome::default();
        for task in tasks {
            let id = task.core.id.clone();
            if matches!(task.status, TaskStatus::Closed | TaskStatus::Tombstone) {
                outcome.skipped(id);
                continue;
            }
            let patch = ElementPatch {
                fields: Some(FieldsPatch::Task(TaskPatch {
                    status: Some(TaskStatus::Closed),
                    close_reason: reason.clone().map(Some),
                    ..TaskPatch::default()
                })),
                ..ElementPatch::default()
            };
            match self.update(&id, patch, &options) {
                Ok(_) => outcome.updated(id),
                Err(error) => outcome.failed(id, &error),
            }
        }
        Ok(outcome)
    }

    /// Defers every matching live task in the plan; valid only from open,
    /// in-progress, or blocked.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the plan itself is missing; per-task
    /// failures are collected in the outcome instead.
    pub fn bulk_defer_plan_tasks(
        &self,
        plan_id: &ElementId,
        filter: &ElementFilter,
        until: Option<Timestamp>,
        actor: &ActorId,
    ) -> Result<BulkOutcome, EngineError> {
        let tasks = self.get_tasks_in_plan(plan_id, filter)?;
        let options = MutateOptions::new(actor.clone());
        let mut outcome = BulkOutcome::default();
        for task in tasks {
            let id = task.core.id.clone();
            if task.status == TaskStatus::Deferred {
                outcome.skipped(id);
                continue;
            }
            if !task.status.can_defer() {
                outcome.skipped(id);
                continue;
            }
            let patch = ElementPatch {
                fields: Some(FieldsPatch::Task(TaskPatch {
                    status: Some(TaskStatus::Deferred),
                    scheduled_for: until.map(Some),
                    ..TaskPatch::default()
                })),
                ..ElementPatch::default()
            };
            match self.update(&id, patch, &options) {
                Ok(_) => outcome.updated(id),
                Err(error) => outcome.failed(id, &error),
            }
        }
        Ok(outcome)
    }

    /// Reassigns every matching live task in the plan, skipping tasks that
    /// already carry the requested assignee.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the plan itself is missing; per-task
    /// failures are collected in the outcome instead.
    pub fn bulk_reassign_plan_tasks(
        &self,
        plan_id: &ElementId,
        filter: &ElementFilter,
        assignee: Option<ActorId>,
        actor: &ActorId,
    ) -> Result<BulkOutcome, EngineError> {
        let tasks = self.get_tasks_in_plan(plan_id, filter)?;
        let options = MutateOptions::new(actor.clone());
        let mut outcome = BulkOutcome::default();
        for task in tasks {
            let id = task.core.id.clone();
            if task.assignee == assignee {
                outcome.skipped(id);
                continue;
            }
            let patch = ElementPatch {
                fields: Some(FieldsPatch::Task(TaskPatch {
                    assignee: Some(assignee.clone()),
                    ..TaskPatch::default()
                })),
                ..ElementPatch::default()
            };
            match self.update(&id, patch, &options) {
                Ok(_) => outcome.updated(id),
                Err(error) => outcome.failed(id, &error),
            }
        }
        Ok(outcome)
    }

    /// Adds and/or removes tags across every matching live task in the
    /// plan, skipping tasks whose tag set would not change.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when neither tag list is
    /// supplied; per-task failures are collected in the outcome instead.
    pub fn bulk_tag_plan_tasks(
        &self,
        plan_id: &ElementId,
        filter: &ElementFilter,
        add_tags: &[String],
        remove_tags: &[String],
        actor: &ActorId,
    ) -> Result<BulkOutcome, EngineError> {
        if add_tags.is_empty() && remove_tags.is_empty() {
            return Err(EngineError::InvalidInput {
                message: "bulk tag requires at least one of add_tags or remove_tags".to_string(),
            });
        }
        let tasks = self.get_tasks_in_plan(plan_id, filter)?;
        let options = MutateOptions::new(actor.clone());
        let mut outcome = BulkOutcome::default();
        for task in tasks {
            let id = task.core.id.clone();
            let mut tags: BTreeSet<String> = task.core.tags.clone();
            for tag in add_tags {
                tags.insert(tag.clone());
            }
            for tag in remove_tags {
                tags.remove(tag);
            }
            if tags == task.core.tags {
                outcome.skipped(id);
                continue;
            }
            let patch = ElementPatch {
                tags: Some(tags),
                ..ElementPatch::default()
            };
            match self.update(&id, patch, &options) {
                Ok(_) => outcome.updated(id),
                Err(error) => outcome.failed(id, &error),
            }
        }
        Ok(outcome)
    }
}

// ============================================================================
// SECTION: In-Memory Filter Matching
// ============================================================================

/// Applies the shared filter surface to a task already loaded in memory.
fn task_matches(task: &Task, filter: &ElementFilter) -> bool {
    if let Some(created_by) = &filter.created_by
        && &task.core.created_by != created_by
    {
        return false;
    }
    if let Some(after) = filter.created_after
        && task.core.created_at < after
    {
        return false;
    }
    if let Some(before) = filter.created_before
        && task.core.created_at > before
    {
        return false;
    }
    if let Some(after) = filter.updated_after
        && task.core.updated_at < after
    {
        return false;
    }
    if let Some(before) = filter.updated_before
        && task.core.updated_at > before
    {
        return false;
    }
    if !filter.tags_all.iter().all(|tag| task.core.tags.contains(tag)) {
        return false;
    }
    if !filter.tags_any.is_empty()
        && !filter.tags_any.iter().any(|tag| task.core.tags.contains(tag))
    {
        return false;
    }
    filter.task.as_ref().is_none_or(|task_filter| task_filter_matches(task, task_filter))
}

/// Applies the task-specific filter fields.
fn task_filter_matches(task: &Task, filter: &TaskFilter) -> bool {
    if let Some(statuses) = &filter.statuses
        && !statuses.contains(&task.status)
    {
        return false;
    }
    if let Some(priority) = filter.priority
        && task.priority != priority
    {
        return false;
    }
    if let Some(complexity) = filter.complexity
        && task.complexity != complexity
    {
        return false;
    }
    if let Some(assignee) = &filter.assignee
        && task.assignee.as_ref() != Some(assignee)
    {
        return false;
    }
    if let Some(owner) = &filter.owner
        && task.owner.as_ref() != Some(owner)
    {
        return false;
    }
    if let Some(task_types) = &filter.task_types
        && !task_types.contains(&task.task_type)
    {
        return false;
    }
    if let Some(has_deadline) = filter.has_deadline
        && task.deadline.is_some() != has_deadline
    {
        return false;
    }
    if let Some(deadline_before) = filter.deadline_before
        && !task.deadline.is_some_and(|deadline| deadline <= deadline_before)
    {
        return false;
    }
    true
}
