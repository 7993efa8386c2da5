// crates/elemgraph-core/src/runtime/engine.rs
// ============================================================================
// Module: Elemgraph Element Engine
// Description: The mutation kernel: CRUD, dependencies, traversal, queries.
// Purpose: Execute every element mutation inside one backend transaction.
// Dependencies: crate::{core, interfaces, runtime}, serde, serde_json
// ============================================================================

//! ## Overview
//! The element engine is the single canonical mutation path. Every mutation
//! validates input, composes a write batch (element row, tags, edges, one or
//! more events, dirty mark), and hands it to the backend for atomic
//! application. Blocked-cache maintenance and automatic status transitions
//! run after the transaction commits, so reads inside the mutation reflect
//! the pre-mutation cache state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::DependencyKind;
use crate::core::DependencyRecord;
use crate::core::Document;
use crate::core::Element;
use crate::core::ElementFilter;
use crate::core::ElementId;
use crate::core::ElementKind;
use crate::core::ElementPatch;
use crate::core::EngineError;
use crate::core::EventFilter;
use crate::core::EventKind;
use crate::core::EventRecord;
use crate::core::FieldsPatch;
use crate::core::MAX_LIST_LIMIT;
use crate::core::MAX_TRAVERSAL_DEPTH;
use crate::core::NewElement;
use crate::core::NewEvent;
use crate::core::Page;
use crate::core::SEARCH_RESULT_LIMIT;
use crate::core::Task;
use crate::core::TaskStatus;
use crate::core::Timestamp;
use crate::core::WorkflowStatus;
use crate::core::element::validate_entity_name;
use crate::core::hashing::ContentHash;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::random_root_id;
use crate::interfaces::Clock;
use crate::interfaces::DocumentVersionRecord;
use crate::interfaces::PersistedElement;
use crate::interfaces::StorageBackend;
use crate::interfaces::SystemClock;
use crate::interfaces::WriteOp;
use crate::runtime::blocked;
use crate::runtime::blocked::AutoTransition;
use crate::runtime::workflow::compute_workflow_status;

// ============================================================================
// SECTION: Engine Configuration
// ============================================================================

/// Configuration for the element engine.
///
/// # Invariants
/// - `id_segment_len` is clamped to the identifier grammar's 3..=8 range.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Length of the random segment of issued root identifiers.
    #[serde(default = "default_id_segment_len")]
    pub id_segment_len: usize,
    /// Attempts before growing the identifier segment on collision.
    #[serde(default = "default_id_retry_attempts")]
    pub id_retry_attempts: usize,
    /// Maximum accepted age of a key-rotation proof in milliseconds.
    #[serde(default = "default_rotation_proof_max_age_ms")]
    pub rotation_proof_max_age_ms: i64,
}

/// Returns the default root identifier segment length.
const fn default_id_segment_len() -> usize {
    5
}

/// Returns the default identifier collision retry budget.
const fn default_id_retry_attempts() -> usize {
    16
}

/// Returns the default rotation proof acceptance window (5 minutes).
const fn default_rotation_proof_max_age_ms() -> i64 {
    5 * 60 * 1_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id_segment_len: default_id_segment_len(),
            id_retry_attempts: default_id_retry_attempts(),
            rotation_proof_max_age_ms: default_rotation_proof_max_age_ms(),
        }
    }
}

// ============================================================================
// SECTION: Operation Options
// ============================================================================

/// Options common to mutating operations.
#[derive(Debug, Clone)]
pub struct MutateOptions {
    /// Actor performing the mutation.
    pub actor: ActorId,
}

impl MutateOptions {
    /// Builds options for the given actor.
    #[must_use]
    pub const fn new(actor: ActorId) -> Self {
        Self { actor }
    }
}

/// Options for soft deletion.
#[derive(Debug, Clone)]
pub struct DeleteOptions {
    /// Actor performing the deletion.
    pub actor: ActorId,
    /// Optional reason recorded on the `deleted` event.
    pub reason: Option<String>,
}

impl DeleteOptions {
    /// Builds options for the given actor with no reason.
    #[must_use]
    pub const fn new(actor: ActorId) -> Self {
        Self {
            actor,
            reason: None,
        }
    }
}

/// Options for single-element reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Expand a task's description and design documents.
    pub hydrate: bool,
}

/// A fetched element with optional hydrated document references.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedElement {
    /// The element.
    pub element: Element,
    /// Stored content hash.
    pub content_hash: ContentHash,
    /// Hydrated description document, when requested and present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Document>,
    /// Hydrated design document, when requested and present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design: Option<Document>,
}

// ============================================================================
// SECTION: Query Result Shapes
// ============================================================================

/// A blocked task joined with its cache rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedTask {
    /// The blocked task.
    pub task: Task,
    /// Blocker element ids, sorted.
    pub blocked_by: Vec<ElementId>,
    /// Joined human-readable reason.
    pub block_reason: String,
}

/// Summary of one element inside a dependency tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSummary {
    /// Element identifier.
    pub id: ElementId,
    /// Element kind.
    pub kind: ElementKind,
    /// Short label (title or name).
    pub label: String,
    /// Lifecycle status label, when the kind carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// One edge of a dependency tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEdge {
    /// Edge kind.
    pub kind: DependencyKind,
    /// The node on the far side of the edge.
    pub node: TreeNode,
}

/// One node of a dependency tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// Element summary for the node.
    pub element: ElementSummary,
    /// Outgoing dependency edges, expanded recursively.
    pub dependencies: Vec<TreeEdge>,
    /// Incoming dependent edges; populated on the root only.
    pub dependents: Vec<TreeEdge>,
}

/// A bounded dependency tree rooted at one element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyTree {
    /// Root node.
    pub root: TreeNode,
    /// Deepest dependency level reached (0 for a leaf).
    pub max_dependency_depth: usize,
    /// Deepest dependent level reached (0 or 1).
    pub max_dependent_depth: usize,
    /// Number of unique elements in the tree.
    pub node_count: usize,
}

/// Aggregate engine statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    /// Element counts by kind (live only).
    pub elements: BTreeMap<ElementKind, u64>,
    /// Total live elements.
    pub total_elements: u64,
    /// Total events in the log.
    pub events: u64,
    /// Elements currently present in the blocked cache.
    pub blocked_elements: u64,
    /// Element ids awaiting export.
    pub dirty_elements: u64,
    /// On-disk size of the store in bytes.
    pub file_size: u64,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// The element graph engine.
///
/// # Invariants
/// - Every mutation is one backend transaction; cache and dirty-feed effects
///   are post-commit.
/// - Reserved `system:` actors are rejected on public mutations.
pub struct ElementEngine<B> {
    /// Storage backend; the process-wide serialisation point.
    backend: B,
    /// Engine configuration.
    config: EngineConfig,
    /// Time source for stamping instants.
    clock: Arc<dyn Clock>,
}

impl<B: StorageBackend> ElementEngine<B> {
    /// Creates an engine over the given backend with the wall clock.
    #[must_use]
    pub fn new(backend: B, config: EngineConfig) -> Self {
        Self::with_clock(backend, config, Arc::new(SystemClock))
    }

    /// Creates an engine with an explicit time source.
    #[must_use]
    pub fn with_clock(backend: B, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            config,
            clock,
        }
    }

    /// Returns the backend handle.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the engine configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the current instant from the engine clock.
    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Reports whether the backend connection is open.
    pub fn is_open(&self) -> bool {
        self.backend.is_open()
    }

    /// Closes the backend connection.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when teardown fails.
    pub fn close(&self) -> Result<(), EngineError> {
        Ok(self.backend.close()?)
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    /// Rejects reserved actors on public mutation paths.
    pub(crate) fn require_public_actor(actor: &ActorId) -> Result<(), EngineError> {
        if actor.is_reserved() {
            return Err(EngineError::InvalidInput {
                message: format!("actor {actor} is reserved for engine-internal events"),
            });
        }
        Ok(())
    }

    /// Issues a fresh root identifier, retrying on collision and growing the
    /// segment when the configured budget is exhausted.
    pub(crate) fn issue_root_id(&self) -> Result<ElementId, EngineError> {
        let mut segment_len = self.config.id_segment_len;
        loop {
            for _ in 0 .. self.config.id_retry_attempts.max(1) {
                let id = random_root_id(segment_len);
                if self.backend.element(&id)?.is_none() {
                    return Ok(id);
                }
            }
            if segment_len >= crate::core::identifiers::MAX_ROOT_SEGMENT_LEN {
                return Err(EngineError::InvalidInput {
                    message: "identifier space exhausted".to_string(),
                });
            }
            segment_len += 1;
        }
    }

    /// Loads an element or fails `NotFound`. Soft-deleted elements are
    /// returned; callers that refuse tombstones check explicitly.
    pub(crate) fn load_required(&self, id: &ElementId) -> Result<PersistedElement, EngineError> {
        self.backend.element(id)?.ok_or_else(|| EngineError::NotFound { id: id.clone() })
    }

    /// Loads a live (non-tombstoned) element or fails `NotFound`.
    pub(crate) fn load_live(&self, id: &ElementId) -> Result<PersistedElement, EngineError> {
        let persisted = self.load_required(id)?;
        if persisted.element.is_deleted() {
            return Err(EngineError::NotFound { id: id.clone() });
        }
        Ok(persisted)
    }

    /// Applies automatic block/unblock transitions returned by the cache.
    pub(crate) fn apply_auto_transitions(
        &self,
        transitions: &[AutoTransition],
    ) -> Result<(), EngineError> {
        for transition in transitions {
            match transition {
                AutoTransition::Block { id, .. } => {
                    self.apply_auto_task_status(id, TaskStatus::Blocked, EventKind::AutoBlocked)?;
                }
                AutoTransition::Unblock { id, restore } => {
                    self.apply_auto_task_status(id, *restore, EventKind::AutoUnblocked)?;
                }
            }
        }
        Ok(())
    }

    /// Internal task status update used by automatic transitions.
    ///
    /// Appends an `auto_*` event with the reserved blocked-cache actor and
    /// does not re-signal the blocked cache.
    fn apply_auto_task_status(
        &self,
        id: &ElementId,
        status: TaskStatus,
        event_kind: EventKind,
    ) -> Result<(), EngineError> {
        let Some(persisted) = self.backend.element(id)? else {
            return Ok(());
        };
        let Element::Task(mut task) = persisted.element else {
            return Ok(());
        };
        if task.status == status || task.core.deleted_at.is_some() {
            return Ok(());
        }
        let old_wire = Element::Task(task.clone()).to_wire()?;
        let now = self.now();
        task.status = status;
        task.core.updated_at = now;
        let element = Element::Task(task);
        let new_wire = element.to_wire()?;
        let event = NewEvent {
            element_id: id.clone(),
            event_type: event_kind,
            actor: ActorId::blocked_cache(),
            old_value: Some(old_wire),
            new_value: Some(new_wire),
            created_at: now,
        };
        self.backend.apply(&[
            PersistedElement::put_op(element)?,
            WriteOp::AppendEvent(event),
            WriteOp::MarkDirty(id.clone()),
        ])?;
        Ok(())
    }

    /// Post-commit reaction to a task (or plan/workflow) status change:
    /// re-evaluates blocked dependents and advances the parent workflow.
    fn react_to_status_change(
        &self,
        id: &ElementId,
        old_blocks: bool,
        new_blocks: bool,
    ) -> Result<(), EngineError> {
        if old_blocks != new_blocks {
            let targets = blocked::affected_targets(&self.backend, id)?;
            for target in targets {
                let transition = blocked::reevaluate(&self.backend, &target)?;
                if let Some(transition) = transition {
                    self.apply_auto_transitions(&[transition])?;
                }
            }
        }
        Ok(())
    }

    /// Advances the parent workflow of a task after its status changed.
    pub(crate) fn advance_parent_workflow(&self, task_id: &ElementId) -> Result<(), EngineError> {
        let parents = self.backend.dependencies_of(task_id, Some(&[DependencyKind::ParentChild]))?;
        for edge in parents {
            if let Some(parent) = self.backend.element(&edge.target_id)?
                && parent.element.kind() == ElementKind::Workflow
            {
                self.advance_workflow(&edge.target_id)?;
            }
        }
        Ok(())
    }

    /// Re-derives and applies a workflow's automatic status transition.
    pub(crate) fn advance_workflow(&self, workflow_id: &ElementId) -> Result<(), EngineError> {
        let Some(persisted) = self.backend.element(workflow_id)? else {
            return Ok(());
        };
        let Element::Workflow(workflow) = persisted.element else {
            return Ok(());
        };
        if workflow.core.deleted_at.is_some() {
            return Ok(());
        }
        let member_edges =
            self.backend.dependents_of(workflow_id, Some(&[DependencyKind::ParentChild]))?;
        let member_ids: Vec<ElementId> =
            member_edges.into_iter().map(|edge| edge.source_id).collect();
        let members = self.backend.elements(&member_ids)?;
        let tasks: Vec<Task> = members
            .into_iter()
            .filter_map(|persisted| match persisted.element {
                Element::Task(task) => Some(task),
                _ => None,
            })
            .collect();
        if let Some(next) = compute_workflow_status(&workflow, &tasks) {
            self.apply_workflow_transition(workflow, next)?;
        }
        Ok(())
    }

    /// Applies a workflow transition with the reserved workflow actor.
    pub(crate) fn apply_workflow_transition(
        &self,
        mut workflow: crate::core::Workflow,
        next: WorkflowStatus,
    ) -> Result<(), EngineError> {
        let event_kind = match next {
            WorkflowStatus::Running => EventKind::AutoStarted,
            WorkflowStatus::Completed => EventKind::AutoCompleted,
            WorkflowStatus::Failed => EventKind::AutoFailed,
            WorkflowStatus::Pending => return Ok(()),
        };
        let id = workflow.core.id.clone();
        let old_wire = Element::Workflow(workflow.clone()).to_wire()?;
        let now = self.now();
        workflow.status = next;
        workflow.core.updated_at = now;
        let element = Element::Workflow(workflow);
        let new_wire = element.to_wire()?;
        let event = NewEvent {
            element_id: id.clone(),
            event_type: event_kind,
            actor: ActorId::workflow(),
            old_value: Some(old_wire),
            new_value: Some(new_wire),
            created_at: now,
        };
        self.backend.apply(&[
            PersistedElement::put_op(element)?,
            WriteOp::AppendEvent(event),
            WriteOp::MarkDirty(id),
        ])?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Returns one element, optionally hydrating a task's document refs in
    /// one batched lookup.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the read fails.
    pub fn get(
        &self,
        id: &ElementId,
        options: &GetOptions,
    ) -> Result<Option<FetchedElement>, EngineError> {
        let Some(persisted) = self.backend.element(id)? else {
            return Ok(None);
        };
        let mut fetched = FetchedElement {
            element: persisted.element,
            content_hash: persisted.content_hash,
            description: None,
            design: None,
        };
        if options.hydrate
            && let Element::Task(task) = &fetched.element
        {
            let mut wanted: Vec<ElementId> = Vec::new();
            wanted.extend(task.description_ref.clone());
            wanted.extend(task.design_ref.clone());
            if !wanted.is_empty() {
                let documents = self.backend.elements(&wanted)?;
                for loaded in documents {
                    if let Element::Document(document) = loaded.element {
                        if Some(&document.core.id) == task.description_ref.as_ref() {
                            fetched.description = Some(document);
                        } else if Some(&document.core.id) == task.design_ref.as_ref() {
                            fetched.design = Some(document);
                        }
                    }
                }
            }
        }
        Ok(Some(fetched))
    }

    /// Lists elements matching the filter.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the read fails.
    pub fn list(&self, filter: &ElementFilter) -> Result<Vec<Element>, EngineError> {
        let rows = self.backend.list(filter)?;
        Ok(rows.into_iter().map(|persisted| persisted.element).collect())
    }

    /// Lists elements with pagination metadata.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the read fails.
    pub fn list_paginated(&self, filter: &ElementFilter) -> Result<Page<Element>, EngineError> {
        let limit = filter.effective_limit();
        let offset = filter.effective_offset();
        let total = self.backend.count(filter)?;
        let items = self.list(filter)?;
        let consumed = u64::try_from(offset + items.len()).unwrap_or(u64::MAX);
        Ok(Page {
            items,
            total,
            offset,
            limit,
            has_more: consumed < total,
        })
    }

    /// Case-insensitive substring search across titles, bodies, and tags.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the read fails.
    pub fn search(
        &self,
        query: &str,
        filter: &ElementFilter,
    ) -> Result<Vec<Element>, EngineError> {
        let rows = self.backend.search(query, filter, SEARCH_RESULT_LIMIT)?;
        Ok(rows.into_iter().map(|persisted| persisted.element).collect())
    }

    /// Reads an element's event log.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the read fails.
    pub fn get_events(
        &self,
        id: &ElementId,
        filter: &EventFilter,
    ) -> Result<Vec<EventRecord>, EngineError> {
        Ok(self.backend.events(id, filter)?)
    }

    /// Reports aggregate engine statistics.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when a read fails.
    pub fn stats(&self) -> Result<EngineStats, EngineError> {
        let mut elements = BTreeMap::new();
        let mut total = 0u64;
        for kind in [
            ElementKind::Task,
            ElementKind::Plan,
            ElementKind::Workflow,
            ElementKind::Document,
            ElementKind::Entity,
            ElementKind::Channel,
            ElementKind::Message,
            ElementKind::Library,
        ] {
            let count = self.backend.count(&ElementFilter::of_kind(kind))?;
            total += count;
            elements.insert(kind, count);
        }
        let blocked_rows = self.backend.all_blocked_rows()?;
        let blocked: BTreeSet<&ElementId> =
            blocked_rows.iter().map(|row| &row.element_id).collect();
        let dirty = self.backend.dirty_elements()?;
        let stats = self.backend.stats()?;
        Ok(EngineStats {
            elements,
            total_elements: total,
            events: self.backend.event_count()?,
            blocked_elements: u64::try_from(blocked.len()).unwrap_or(u64::MAX),
            dirty_elements: u64::try_from(dirty.len()).unwrap_or(u64::MAX),
            file_size: stats.file_size,
        })
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Creates an element from a factory input.
    ///
    /// Runs kind-specific uniqueness checks, writes the row, tags, and a
    /// `created` event in one transaction, and marks the id dirty.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on validation, conflict, or backend failure.
    pub fn create(
        &self,
        input: NewElement,
        options: &MutateOptions,
    ) -> Result<Element, EngineError> {
        Self::require_public_actor(&options.actor)?;
        let id = self.issue_root_id()?;
        self.create_with_id(id, input, options)
    }

    /// Creates an element under a caller-chosen identifier.
    ///
    /// Used by hierarchical child issuance; the identifier must be unused.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on validation, conflict, or backend failure.
    pub(crate) fn create_with_id(
        &self,
        id: ElementId,
        input: NewElement,
        options: &MutateOptions,
    ) -> Result<Element, EngineError> {
        if self.backend.element(&id)?.is_some() {
            return Err(EngineError::InvalidInput {
                message: format!("identifier already in use: {id}"),
            });
        }
        let now = self.now();
        let element =
            crate::core::build_element(id.clone(), options.actor.clone(), now, input)?;
        self.check_create_invariants(&element)?;
        let wire = element.to_wire()?;
        let event = NewEvent {
            element_id: id.clone(),
            event_type: EventKind::Created,
            actor: options.actor.clone(),
            old_value: None,
            new_value: Some(wire),
            created_at: now,
        };
        self.backend.apply(&[
            PersistedElement::put_op(element.clone())?,
            WriteOp::AppendEvent(event),
            WriteOp::MarkDirty(id),
        ])?;
        Ok(element)
    }

    /// Kind-specific creation invariants: name uniqueness and membership.
    fn check_create_invariants(&self, element: &Element) -> Result<(), EngineError> {
        match element {
            Element::Entity(entity) => {
                if self.backend.find_entity_by_name(&entity.name)?.is_some() {
                    return Err(EngineError::DuplicateName {
                        kind: ElementKind::Entity,
                        name: entity.name.clone(),
                    });
                }
            }
            Element::Channel(channel) => {
                let visibility = match channel.channel_type {
                    crate::core::ChannelKind::Group => {
                        Some(channel.permissions.visibility)
                    }
                    crate::core::ChannelKind::Direct => None,
                };
                let existing = self.backend.find_channel_by_name(
                    channel.channel_type,
                    &channel.name,
                    visibility,
                )?;
                if existing.is_some() {
                    return Err(EngineError::DuplicateName {
                        kind: ElementKind::Channel,
                        name: channel.name.clone(),
                    });
                }
            }
            Element::Message(message) => {
                let persisted = self.load_live(&message.channel_id)?;
                let actual = persisted.element.kind();
                let Element::Channel(channel) = persisted.element else {
                    return Err(EngineError::TypeMismatch {
                        id: message.channel_id.clone(),
                        expected: ElementKind::Channel,
                        actual,
                    });
                };
                if !channel.members.contains(&message.sender) {
                    return Err(EngineError::NotAMember {
                        channel: message.channel_id.clone(),
                        actor: message.sender.clone(),
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Updates an element by overlaying a typed patch.
    ///
    /// Ignores immutable fields by construction, stamps `updated_at`,
    /// rebuilds the content hash, and emits the status-appropriate base
    /// event. Documents version on content change; the prior payload is
    /// captured in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on validation, constraint, or backend failure.
    pub fn update(
        &self,
        id: &ElementId,
        patch: ElementPatch,
        options: &MutateOptions,
    ) -> Result<Element, EngineError> {
        Self::require_public_actor(&options.actor)?;
        let persisted = self.load_live(id)?;
        let old_element = persisted.element;
        if old_element.kind() == ElementKind::Message {
            return Err(EngineError::Immutable {
                id: id.clone(),
                kind: ElementKind::Message,
            });
        }
        if let Some(fields) = &patch.fields
            && fields.kind() != old_element.kind()
        {
            return Err(EngineError::TypeMismatch {
                id: id.clone(),
                expected: old_element.kind(),
                actual: fields.kind(),
            });
        }
        self.check_patch_invariants(&old_element, &patch)?;

        let now = self.now();
        let old_wire = old_element.to_wire()?;
        let old_hash = old_element.content_hash()?;
        let old_blocks = blocked::blocker_still_blocks(&old_element);
        let mut element = old_element.clone();
        if let Some(tags) = patch.tags.clone() {
            element.core_mut().tags = tags;
        }
        if let Some(metadata) = patch.metadata.clone() {
            element.core_mut().metadata = metadata;
        }
        let mut event_kind = EventKind::Updated;
        let mut task_status_change: Option<(TaskStatus, TaskStatus)> = None;
        let mut version_op: Option<WriteOp> = None;

        match (&mut element, patch.fields) {
            (Element::Task(task), fields) => {
                let old_status = task.status;
                if let Some(FieldsPatch::Task(task_patch)) = fields {
                    task.apply(task_patch);
                }
                if task.status != old_status {
                    match (old_status, task.status) {
                        (_, TaskStatus::Closed) => {
                            event_kind = EventKind::Closed;
                            task.closed_at = Some(now);
                        }
                        (TaskStatus::Closed, _) => {
                            event_kind = EventKind::Reopened;
                            task.closed_at = None;
                        }
                        _ => {}
                    }
                    task_status_change = Some((old_status, task.status));
                }
            }
            (Element::Plan(plan), fields) => {
                let old_status = plan.status;
                if let Some(FieldsPatch::Plan(plan_patch)) = fields {
                    plan.apply(plan_patch);
                }
                if plan.status != old_status {
                    if plan.status.is_terminal() {
                        event_kind = EventKind::Closed;
                    } else if old_status.is_terminal() {
                        event_kind = EventKind::Reopened;
                    }
                }
            }
            (Element::Workflow(workflow), fields) => {
                if let Some(FieldsPatch::Workflow(workflow_patch)) = fields {
                    workflow.apply(workflow_patch);
                }
            }
            (Element::Document(document), fields) => {
                if let Some(FieldsPatch::Document(document_patch)) = fields {
                    document.apply(document_patch);
                }
            }
            (Element::Entity(entity), fields) => {
                if let Some(FieldsPatch::Entity(entity_patch)) = fields {
                    entity.apply(entity_patch);
                }
            }
            (Element::Channel(channel), fields) => {
                if let Some(FieldsPatch::Channel(channel_patch)) = fields {
                    channel.apply(channel_patch);
                }
            }
            (Element::Library(library), fields) => {
                if let Some(FieldsPatch::Library(library_patch)) = fields {
                    library.apply(library_patch);
                }
            }
            (Element::Message(_), _) => {
                return Err(EngineError::Immutable {
                    id: id.clone(),
                    kind: ElementKind::Message,
                });
            }
        }

        // Documents version only when the content actually changed, so a
        // no-op update leaves both the hash and the version untouched.
        if let Element::Document(document) = &mut element {
            let changed = element_hash_changed(&old_hash, &Element::Document(document.clone()))?;
            if changed {
                let prior = old_wire.clone();
                version_op = Some(WriteOp::PutDocumentVersion(DocumentVersionRecord {
                    document_id: id.clone(),
                    version: document.version,
                    data: prior,
                    created_at: now,
                }));
                document.previous_version_id = Some(id.clone());
                document.version += 1;
            }
        }

        element.core_mut().updated_at = now;
        let new_wire = element.to_wire()?;
        let event = NewEvent {
            element_id: id.clone(),
            event_type: event_kind,
            actor: options.actor.clone(),
            old_value: Some(old_wire),
            new_value: Some(new_wire),
            created_at: now,
        };
        let mut ops = vec![PersistedElement::put_op(element.clone())?];
        if let Some(version_op) = version_op {
            ops.push(version_op);
        }
        ops.push(WriteOp::AppendEvent(event));
        ops.push(WriteOp::MarkDirty(id.clone()));
        self.backend.apply(&ops)?;

        self.react_to_status_change(id, old_blocks, blocked::blocker_still_blocks(&element))?;
        if task_status_change.is_some() {
            self.advance_parent_workflow(id)?;
        }
        Ok(element)
    }

    /// Patch-level invariants: status legality and rename uniqueness.
    fn check_patch_invariants(
        &self,
        element: &Element,
        patch: &ElementPatch,
    ) -> Result<(), EngineError> {
        match (element, &patch.fields) {
            (Element::Task(task), Some(FieldsPatch::Task(task_patch))) => {
                if task_patch.status == Some(TaskStatus::Tombstone) {
                    return Err(EngineError::InvalidStatus {
                        id: task.core.id.clone(),
                        status: TaskStatus::Tombstone.to_string(),
                        message: "tombstone is reserved for deletion".to_string(),
                    });
                }
            }
            (Element::Entity(entity), Some(FieldsPatch::Entity(entity_patch))) => {
                if let Some(new_name) = &entity_patch.name
                    && new_name != &entity.name
                {
                    validate_entity_name(new_name)?;
                    if self.backend.find_entity_by_name(new_name)?.is_some() {
                        return Err(EngineError::DuplicateName {
                            kind: ElementKind::Entity,
                            name: new_name.clone(),
                        });
                    }
                }
            }
            (Element::Channel(channel), Some(FieldsPatch::Channel(channel_patch))) => {
                if channel.channel_type == crate::core::ChannelKind::Direct
                    && (channel_patch.name.is_some() || channel_patch.permissions.is_some())
                {
                    return Err(EngineError::InvalidInput {
                        message: format!(
                            "direct channel {} has a fixed name and permissions",
                            channel.core.id
                        ),
                    });
                }
                if let Some(new_name) = &channel_patch.name
                    && new_name != &channel.name
                {
                    let visibility = channel_patch
                        .permissions
                        .map_or(channel.permissions.visibility, |p| p.visibility);
                    let existing = self.backend.find_channel_by_name(
                        channel.channel_type,
                        new_name,
                        Some(visibility),
                    )?;
                    if existing.is_some() {
                        return Err(EngineError::DuplicateName {
                            kind: ElementKind::Channel,
                            name: new_name.clone(),
                        });
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Soft-deletes an element and cascades its dependency edges away.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on constraint or backend failure.
    pub fn delete(&self, id: &ElementId, options: &DeleteOptions) -> Result<(), EngineError> {
        Self::require_public_actor(&options.actor)?;
        let persisted = self.load_live(id)?;
        let mut element = persisted.element;
        if element.kind() == ElementKind::Message {
            return Err(EngineError::Immutable {
                id: id.clone(),
                kind: ElementKind::Message,
            });
        }

        // Snapshot pre-delete graph context for post-commit reactions.
        let affected = blocked::affected_targets(&self.backend, id)?;
        let parent_edges =
            self.backend.dependencies_of(id, Some(&[DependencyKind::ParentChild]))?;
        let was_task = element.kind() == ElementKind::Task;

        let now = self.now();
        let old_wire = element.to_wire()?;
        element.core_mut().deleted_at = Some(now);
        element.core_mut().updated_at = now;
        if let Element::Task(task) = &mut element {
            task.status = TaskStatus::Tombstone;
        }
        let new_wire = element.to_wire()?;
        let event = NewEvent {
            element_id: id.clone(),
            event_type: EventKind::Deleted,
            actor: options.actor.clone(),
            old_value: Some(old_wire),
            new_value: options
                .reason
                .as_ref()
                .map_or(Some(new_wire.clone()), |reason| {
                    Some(json!({ "element": new_wire, "reason": reason }))
                }),
            created_at: now,
        };
        self.backend.apply(&[
            PersistedElement::put_op(element)?,
            WriteOp::DeleteDependenciesTouching(id.clone()),
            WriteOp::ReplaceBlockedRows {
                element_id: id.clone(),
                rows: Vec::new(),
            },
            WriteOp::ClearRestoreStatus(id.clone()),
            WriteOp::AppendEvent(event),
            WriteOp::MarkDirty(id.clone()),
        ])?;

        // Post-commit: release dependents, then fail parent workflows.
        for target in affected {
            let transition = blocked::reevaluate(&self.backend, &target)?;
            if let Some(transition) = transition {
                self.apply_auto_transitions(&[transition])?;
            }
        }
        if was_task {
            for edge in parent_edges {
                if let Some(parent) = self.backend.element(&edge.target_id)?
                    && let Element::Workflow(workflow) = parent.element
                    && matches!(
                        workflow.status,
                        WorkflowStatus::Pending | WorkflowStatus::Running
                    )
                {
                    self.apply_workflow_transition(workflow, WorkflowStatus::Failed)?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dependencies
    // ------------------------------------------------------------------

    /// Adds a dependency edge and signals the blocked cache.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the source is missing, the triple
    /// already exists, or gate metadata is malformed.
    pub fn add_dependency(
        &self,
        source: &ElementId,
        target: &ElementId,
        kind: DependencyKind,
        metadata: Option<Value>,
        actor: &ActorId,
    ) -> Result<DependencyRecord, EngineError> {
        Self::require_public_actor(actor)?;
        if source == target {
            return Err(EngineError::InvalidInput {
                message: format!("self-dependency is not allowed: {source}"),
            });
        }
        self.load_live(source)?;
        if self.backend.dependency(source, target, kind)?.is_some() {
            return Err(EngineError::DuplicateDependency {
                src: source.clone(),
                target: target.clone(),
                kind,
            });
        }
        let metadata = match kind {
            DependencyKind::Gate => {
                let raw = metadata.ok_or_else(|| EngineError::InvalidInput {
                    message: "gate dependencies require approval metadata".to_string(),
                })?;
                Some(crate::core::GateSpec::from_metadata(&raw)?.to_metadata())
            }
            _ => metadata,
        };
        let now = self.now();
        let record = DependencyRecord {
            source_id: source.clone(),
            target_id: target.clone(),
            kind,
            created_at: now,
            created_by: actor.clone(),
            metadata,
        };
        let payload = serde_json::to_value(&record)
            .map_err(|err| crate::core::HashError::Canonicalization(err.to_string()))?;
        let event = NewEvent {
            element_id: target.clone(),
            event_type: EventKind::DependencyAdded,
            actor: actor.clone(),
            old_value: None,
            new_value: Some(payload),
            created_at: now,
        };
        self.backend.apply(&[
            WriteOp::PutDependency(record.clone()),
            WriteOp::AppendEvent(event),
            WriteOp::MarkDirty(source.clone()),
            WriteOp::MarkDirty(target.clone()),
        ])?;
        if kind.affects_blocking() {
            let transition = blocked::reevaluate(&self.backend, target)?;
            if let Some(transition) = transition {
                self.apply_auto_transitions(&[transition])?;
            }
        }
        Ok(record)
    }

    /// Removes a dependency edge and signals the blocked cache.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DependencyNotFound`] when the triple is absent.
    pub fn remove_dependency(
        &self,
        source: &ElementId,
        target: &ElementId,
        kind: DependencyKind,
        actor: &ActorId,
    ) -> Result<(), EngineError> {
        Self::require_public_actor(actor)?;
        let Some(record) = self.backend.dependency(source, target, kind)? else {
            return Err(EngineError::DependencyNotFound {
                src: source.clone(),
                target: target.clone(),
                kind,
            });
        };
        let now = self.now();
        let payload = serde_json::to_value(&record)
            .map_err(|err| crate::core::HashError::Canonicalization(err.to_string()))?;
        let event = NewEvent {
            element_id: target.clone(),
            event_type: EventKind::DependencyRemoved,
            actor: actor.clone(),
            old_value: Some(payload),
            new_value: None,
            created_at: now,
        };
        self.backend.apply(&[
            WriteOp::DeleteDependency {
                source: source.clone(),
                target: target.clone(),
                kind,
            },
            WriteOp::AppendEvent(event),
            WriteOp::MarkDirty(source.clone()),
            WriteOp::MarkDirty(target.clone()),
        ])?;
        if kind.affects_blocking() {
            let transition = blocked::reevaluate(&self.backend, target)?;
            if let Some(transition) = transition {
                self.apply_auto_transitions(&[transition])?;
            }
        }
        Ok(())
    }

    /// Returns the element's outgoing dependency triples.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the read fails.
    pub fn get_dependencies(
        &self,
        id: &ElementId,
        kinds: Option<&[DependencyKind]>,
    ) -> Result<Vec<DependencyRecord>, EngineError> {
        Ok(self.backend.dependencies_of(id, kinds)?)
    }

    /// Returns the element's incoming dependency triples.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the read fails.
    pub fn get_dependents(
        &self,
        id: &ElementId,
        kinds: Option<&[DependencyKind]>,
    ) -> Result<Vec<DependencyRecord>, EngineError> {
        Ok(self.backend.dependents_of(id, kinds)?)
    }

    /// Builds the bounded dependency tree rooted at an element.
    ///
    /// Outgoing dependencies are expanded recursively (depth capped,
    /// visited-set guarded); incoming dependents are listed for the root
    /// only. Cycles terminate.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when the root is missing.
    pub fn get_dependency_tree(&self, id: &ElementId) -> Result<DependencyTree, EngineError> {
        let root_element = self.load_required(id)?;
        let mut visited: BTreeSet<ElementId> = BTreeSet::new();
        visited.insert(id.clone());
        let mut max_dependency_depth = 0usize;
        let dependencies =
            self.expand_dependencies(id, 1, &mut visited, &mut max_dependency_depth)?;

        let mut dependents = Vec::new();
        for edge in self.backend.dependents_of(id, None)? {
            if let Some(persisted) = self.backend.element(&edge.source_id)? {
                visited.insert(edge.source_id.clone());
                dependents.push(TreeEdge {
                    kind: edge.kind,
                    node: TreeNode {
                        element: summarize(&persisted.element),
                        dependencies: Vec::new(),
                        dependents: Vec::new(),
                    },
                });
            }
        }
        let max_dependent_depth = usize::from(!dependents.is_empty());
        Ok(DependencyTree {
            root: TreeNode {
                element: summarize(&root_element.element),
                dependencies,
                dependents,
            },
            max_dependency_depth,
            max_dependent_depth,
            node_count: visited.len(),
        })
    }

    /// Recursive outgoing-edge expansion with depth cap and visited guard.
    fn expand_dependencies(
        &self,
        id: &ElementId,
        depth: usize,
        visited: &mut BTreeSet<ElementId>,
        max_depth: &mut usize,
    ) -> Result<Vec<TreeEdge>, EngineError> {
        if depth > MAX_TRAVERSAL_DEPTH {
            return Ok(Vec::new());
        }
        let mut edges = Vec::new();
        for edge in self.backend.dependencies_of(id, None)? {
            if visited.contains(&edge.target_id) {
                continue;
            }
            let Some(persisted) = self.backend.element(&edge.target_id)? else {
                continue;
            };
            visited.insert(edge.target_id.clone());
            *max_depth = (*max_depth).max(depth);
            let children =
                self.expand_dependencies(&edge.target_id, depth + 1, visited, max_depth)?;
            edges.push(TreeEdge {
                kind: edge.kind,
                node: TreeNode {
                    element: summarize(&persisted.element),
                    dependencies: children,
                    dependents: Vec::new(),
                },
            });
        }
        Ok(edges)
    }

    // ------------------------------------------------------------------
    // Ready / blocked task queries
    // ------------------------------------------------------------------

    /// Returns live tasks that are ready to work: open or in progress, not
    /// present in the blocked cache, and not scheduled for the future.
    ///
    /// Sorted by priority ascending (1 first); the filter's limit applies
    /// after sorting.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when a read fails.
    pub fn ready(&self, filter: &ElementFilter) -> Result<Vec<Task>, EngineError> {
        let mut candidate_filter = filter.clone();
        candidate_filter.kinds = Some(vec![ElementKind::Task]);
        candidate_filter.include_deleted = false;
        let mut task_filter = candidate_filter.task.take().unwrap_or_default();
        let ready_statuses = [TaskStatus::Open, TaskStatus::InProgress];
        task_filter.statuses = Some(match task_filter.statuses {
            Some(requested) => requested
                .into_iter()
                .filter(|status| ready_statuses.contains(status))
                .collect(),
            None => ready_statuses.to_vec(),
        });
        candidate_filter.task = Some(task_filter);
        candidate_filter.limit = Some(MAX_LIST_LIMIT);
        candidate_filter.offset = None;

        let blocked_ids: BTreeSet<ElementId> = self
            .backend
            .all_blocked_rows()?
            .into_iter()
            .map(|row| row.element_id)
            .collect();
        let now = self.now();
        let mut tasks: Vec<Task> = self
            .backend
            .list(&candidate_filter)?
            .into_iter()
            .filter_map(|persisted| match persisted.element {
                Element::Task(task) => Some(task),
                _ => None,
            })
            .filter(|task| !blocked_ids.contains(&task.core.id))
            .filter(|task| task.scheduled_for.is_none_or(|at| at <= now))
            .collect();
        tasks.sort_by(|a, b| {
            a.priority
                .get()
                .cmp(&b.priority.get())
                .then_with(|| a.core.created_at.cmp(&b.core.created_at))
                .then_with(|| a.core.id.cmp(&b.core.id))
        });
        if let Some(limit) = filter.limit {
            tasks.truncate(limit);
        }
        Ok(tasks)
    }

    /// Returns live tasks present in the blocked cache, each joined with
    /// its blockers and reasons.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when a read fails.
    pub fn blocked(&self, filter: &ElementFilter) -> Result<Vec<BlockedTask>, EngineError> {
        let mut rows_by_element: BTreeMap<ElementId, Vec<crate::core::BlockedRow>> =
            BTreeMap::new();
        for row in self.backend.all_blocked_rows()? {
            rows_by_element.entry(row.element_id.clone()).or_default().push(row);
        }
        let mut candidate_filter = filter.clone();
        candidate_filter.kinds = Some(vec![ElementKind::Task]);
        candidate_filter.include_deleted = false;
        candidate_filter.limit = Some(MAX_LIST_LIMIT);
        candidate_filter.offset = None;
        let candidates = self.backend.list(&candidate_filter)?;
        let mut out = Vec::new();
        for persisted in candidates {
            let Element::Task(task) = persisted.element else {
                continue;
            };
            let Some(rows) = rows_by_element.get(&task.core.id) else {
                continue;
            };
            let mut blocked_by: Vec<ElementId> =
                rows.iter().map(|row| row.blocked_by.clone()).collect();
            blocked_by.sort();
            blocked_by.dedup();
            let mut reasons: Vec<&str> = rows.iter().map(|row| row.reason.as_str()).collect();
            reasons.sort_unstable();
            reasons.dedup();
            out.push(BlockedTask {
                task,
                blocked_by,
                block_reason: reasons.join("; "),
            });
        }
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// Returns a document at a specific version.
    ///
    /// The current element is returned when the version matches; otherwise
    /// the version table is consulted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::VersionNotFound`] when the version is absent.
    pub fn get_document_version(
        &self,
        id: &ElementId,
        version: u64,
    ) -> Result<Document, EngineError> {
        let persisted = self.load_required(id)?;
        let actual = persisted.element.kind();
        let Element::Document(document) = persisted.element else {
            return Err(EngineError::TypeMismatch {
                id: id.clone(),
                expected: ElementKind::Document,
                actual,
            });
        };
        if document.version == version {
            return Ok(document);
        }
        let Some(row) = self.backend.document_version(id, version)? else {
            return Err(EngineError::VersionNotFound {
                id: id.clone(),
                version,
            });
        };
        deserialize_document(row.data)
    }

    /// Returns the full version history of a document, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the document is missing or corrupt.
    pub fn get_document_history(&self, id: &ElementId) -> Result<Vec<Document>, EngineError> {
        let persisted = self.load_required(id)?;
        let actual = persisted.element.kind();
        let Element::Document(document) = persisted.element else {
            return Err(EngineError::TypeMismatch {
                id: id.clone(),
                expected: ElementKind::Document,
                actual,
            });
        };
        let mut history = vec![document];
        for row in self.backend.document_versions(id)? {
            history.push(deserialize_document(row.data)?);
        }
        Ok(history)
    }

    // ------------------------------------------------------------------
    // Dirty feed
    // ------------------------------------------------------------------

    /// Returns the element ids diverged since the last export.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the read fails.
    pub fn get_dirty_elements(&self) -> Result<Vec<ElementId>, EngineError> {
        Ok(self.backend.dirty_elements()?)
    }

    /// Acknowledges processed dirty ids.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the write fails.
    pub fn clear_dirty_elements(&self, ids: &[ElementId]) -> Result<(), EngineError> {
        Ok(self.backend.clear_dirty(ids)?)
    }
}

// ============================================================================
// SECTION: Free Helpers
// ============================================================================

/// Builds a tree summary for an element.
fn summarize(element: &Element) -> ElementSummary {
    ElementSummary {
        id: element.id().clone(),
        kind: element.kind(),
        label: element.label().to_string(),
        status: element.status_label().map(str::to_string),
    }
}

/// Reports whether an element's content hash differs from a prior hash.
fn element_hash_changed(
    old_hash: &ContentHash,
    element: &Element,
) -> Result<bool, EngineError> {
    Ok(element.content_hash()? != *old_hash)
}

/// Deserializes a document from a stored version payload.
fn deserialize_document(data: Value) -> Result<Document, EngineError> {
    serde_json::from_value(data).map_err(|err| EngineError::InvalidInput {
        message: format!("stored document version is corrupt: {err}"),
    })
}
