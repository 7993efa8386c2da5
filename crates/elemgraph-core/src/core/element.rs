// crates/elemgraph-core/src/core/element.rs
// ============================================================================
// Module: Elemgraph Element Model
// Description: Typed element variants, factories, and patch overlays.
// Purpose: Provide the closed tagged sum of element kinds with validation.
// Dependencies: base64, serde, serde_json
// ============================================================================

//! ## Overview
//! Elements form a closed tagged sum over eight kinds. Shared base fields
//! live in [`ElementCore`], embedded (not inherited) in every variant, and
//! flattened on the wire so serialized records match the interchange format:
//! a flat JSON object with a `type` discriminant, camelCase keys, a `tags`
//! array, and a `metadata` object.
//!
//! Factories are free functions that take the issued identifier, the acting
//! actor, and the clock instant, validate the input record, and return the
//! variant. Patches are typed overlays; fields the contract declares
//! immutable (id, type, creation instant, creator) cannot be expressed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::errors::EngineError;
use crate::core::hashing::ContentHash;
use crate::core::hashing::HashError;
use crate::core::hashing::content_hash_of_value;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::ElementId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Entity names that may never be registered.
pub const RESERVED_ENTITY_NAMES: [&str; 4] = ["system", "everyone", "here", "broadcast"];
/// Expected byte length of a decoded Ed25519 public key.
const ED25519_PUBLIC_KEY_LEN: usize = 32;
/// Prefix of the canonical direct-channel name.
const DIRECT_CHANNEL_PREFIX: &str = "dm:";

// ============================================================================
// SECTION: Element Kind
// ============================================================================

/// Discriminant naming an element variant.
///
/// # Invariants
/// - The set is closed; wire values are stable snake_case strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// A unit of work with status, priority, and scheduling fields.
    Task,
    /// A grouping of tasks with a draft/active lifecycle.
    Plan,
    /// A poured instance of a playbook owning hierarchical tasks.
    Workflow,
    /// Versioned content with full history retention.
    Document,
    /// A named principal (agent, human, or system) with optional key material.
    Entity,
    /// A direct or group conversation container.
    Channel,
    /// An immutable message within a channel.
    Message,
    /// A named collection pointing at a description document.
    Library,
}

impl ElementKind {
    /// Returns the stable wire label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Plan => "plan",
            Self::Workflow => "workflow",
            Self::Document => "document",
            Self::Entity => "entity",
            Self::Channel => "channel",
            Self::Message => "message",
            Self::Library => "library",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// ============================================================================
// SECTION: Bounded Scales
// ============================================================================

/// Task priority on the 1..=5 scale (1 is highest).
///
/// # Invariants
/// - Always within 1..=5; construction is guarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    /// Default priority for new tasks.
    pub const DEFAULT: Self = Self(3);

    /// Creates a priority from a raw value (returns `None` outside 1..=5).
    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        (1..=5).contains(&raw).then_some(Self(raw))
    }

    /// Returns the raw scale value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::from_raw(raw).ok_or_else(|| format!("priority out of range 1..=5: {raw}"))
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

/// Task complexity on the 1..=5 scale (1 is simplest).
///
/// # Invariants
/// - Always within 1..=5; construction is guarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Complexity(u8);

impl Complexity {
    /// Default complexity for new tasks.
    pub const DEFAULT: Self = Self(3);

    /// Creates a complexity from a raw value (returns `None` outside 1..=5).
    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        (1..=5).contains(&raw).then_some(Self(raw))
    }

    /// Returns the raw scale value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Complexity {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::from_raw(raw).ok_or_else(|| format!("complexity out of range 1..=5: {raw}"))
    }
}

impl From<Complexity> for u8 {
    fn from(complexity: Complexity) -> Self {
        complexity.0
    }
}

// ============================================================================
// SECTION: Status Enums
// ============================================================================

/// Task lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and filter matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Ready to be worked once unblocked.
    Open,
    /// Actively being worked.
    InProgress,
    /// Held by the blocked cache or an explicit hold.
    Blocked,
    /// Finished; no longer blocks dependents.
    Closed,
    /// Parked until a later instant.
    Deferred,
    /// Soft-deleted marker.
    Tombstone,
}

impl TaskStatus {
    /// Returns the stable wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Closed => "closed",
            Self::Deferred => "deferred",
            Self::Tombstone => "tombstone",
        }
    }

    /// Reports whether a blocker in this status still blocks dependents.
    #[must_use]
    pub const fn blocks_dependents(self) -> bool {
        !matches!(self, Self::Closed | Self::Tombstone)
    }

    /// Reports whether the status is eligible for an automatic block
    /// transition (non-blocked, non-terminal).
    #[must_use]
    pub const fn can_auto_block(self) -> bool {
        matches!(self, Self::Open | Self::InProgress | Self::Deferred)
    }

    /// Reports whether a task in this status may be deferred.
    #[must_use]
    pub const fn can_defer(self) -> bool {
        matches!(self, Self::Open | Self::InProgress | Self::Blocked)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Plan lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Being assembled; tasks may be added.
    Draft,
    /// In execution; tasks may be added.
    Active,
    /// Terminal success state.
    Completed,
    /// Terminal abandonment state.
    Cancelled,
}

impl PlanStatus {
    /// Returns the stable wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Reports whether the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Reports whether tasks may be created in or attached to the plan.
    #[must_use]
    pub const fn accepts_tasks(self) -> bool {
        matches!(self, Self::Draft | Self::Active)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Workflow lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Poured but no task started yet.
    Pending,
    /// At least one task is in progress.
    Running,
    /// All tasks closed.
    Completed,
    /// At least one task was tombstoned.
    Failed,
}

impl WorkflowStatus {
    /// Returns the stable wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Entity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    /// An autonomous agent.
    Agent,
    /// A human principal.
    Human,
    /// A non-agent system component.
    System,
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Agent => "agent",
            Self::Human => "human",
            Self::System => "system",
        };
        label.fmt(f)
    }
}

/// Channel container kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Two-member interned conversation with a canonical name.
    Direct,
    /// Named multi-member conversation.
    Group,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Direct => "direct",
            Self::Group => "group",
        };
        label.fmt(f)
    }
}

/// Channel visibility scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Visible to members only.
    #[default]
    Private,
    /// Discoverable by any actor.
    Public,
}

impl Visibility {
    /// Returns the stable wire label for the scope.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

/// Policy controlling who may modify a channel's member set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemberPolicy {
    /// Only the creating actor may modify members.
    Creator,
    /// Any current member may modify members.
    #[default]
    Members,
}

/// Channel permission block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPermissions {
    /// Who may modify the member set.
    #[serde(default)]
    pub modify_members: MemberPolicy,
    /// Visibility scope of the channel.
    #[serde(default)]
    pub visibility: Visibility,
}

// ============================================================================
// SECTION: Shared Base Record
// ============================================================================

/// Base fields embedded in every element variant.
///
/// # Invariants
/// - `id`, `created_at`, and `created_by` are immutable after creation.
/// - `updated_at` only advances and is always >= `created_at`.
/// - `tags` and `metadata` are ordered collections so serialization is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementCore {
    /// Stable element identifier.
    pub id: ElementId,
    /// Creation instant.
    pub created_at: Timestamp,
    /// Last-update instant.
    pub updated_at: Timestamp,
    /// Actor that created the element.
    pub created_by: ActorId,
    /// Unordered tag set, stored relationally.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Open-ended metadata mapping.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Soft-deletion instant, when tombstoned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
}

impl ElementCore {
    /// Builds a fresh base record for a new element.
    #[must_use]
    pub fn new(
        id: ElementId,
        created_by: ActorId,
        now: Timestamp,
        tags: BTreeSet<String>,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            id,
            created_at: now,
            updated_at: now,
            created_by,
            tags,
            metadata,
            deleted_at: None,
        }
    }
}

// ============================================================================
// SECTION: Element Variants
// ============================================================================

/// A unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Shared base fields.
    #[serde(flatten)]
    pub core: ElementCore,
    /// Human-readable title.
    pub title: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Priority on the 1..=5 scale (1 highest).
    pub priority: Priority,
    /// Complexity on the 1..=5 scale.
    pub complexity: Complexity,
    /// Free-form task classification label.
    pub task_type: String,
    /// Actor currently assigned, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<ActorId>,
    /// Accountable owner, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ActorId>,
    /// Hard deadline instant, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Timestamp>,
    /// Earliest instant the task should surface as ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<Timestamp>,
    /// Instant the task was last closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<Timestamp>,
    /// Reason recorded when closing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
    /// Document holding the long-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_ref: Option<ElementId>,
    /// Document holding the design notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_ref: Option<ElementId>,
}

/// A grouping of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Shared base fields.
    #[serde(flatten)]
    pub core: ElementCore,
    /// Human-readable title.
    pub title: String,
    /// Lifecycle status.
    pub status: PlanStatus,
}

/// A poured playbook instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Shared base fields.
    #[serde(flatten)]
    pub core: ElementCore,
    /// Human-readable title.
    pub title: String,
    /// Lifecycle status.
    pub status: WorkflowStatus,
    /// Playbook the workflow was poured from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook: Option<String>,
    /// Variable map resolved at pour time, stored verbatim.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// Marks the workflow as excludable from export.
    #[serde(default)]
    pub ephemeral: bool,
}

/// Versioned content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Shared base fields.
    #[serde(flatten)]
    pub core: ElementCore,
    /// Content-type tag (for example `text/markdown`).
    pub content_type: String,
    /// Full document content.
    pub content: String,
    /// Monotonically increasing version, starting at 1.
    pub version: u64,
    /// Identifier of the prior version row's document (null on v1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version_id: Option<ElementId>,
}

/// A named principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Shared base fields.
    #[serde(flatten)]
    pub core: ElementCore,
    /// Globally unique name among live entities; letter-prefixed.
    pub name: String,
    /// Classification of the principal.
    pub classification: EntityClass,
    /// Base64-encoded Ed25519 public key, if registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Instant the entity was deactivated, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<Timestamp>,
    /// Instant of the most recent key rotation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_rotated_at: Option<Timestamp>,
    /// Instant the key was revoked, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_revoked_at: Option<Timestamp>,
}

/// A conversation container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Shared base fields.
    #[serde(flatten)]
    pub core: ElementCore,
    /// Container kind.
    pub channel_type: ChannelKind,
    /// Channel name; canonical for direct channels.
    pub name: String,
    /// Current member set.
    #[serde(default)]
    pub members: BTreeSet<ActorId>,
    /// Permission block.
    #[serde(default)]
    pub permissions: ChannelPermissions,
}

/// An attachment carried by a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Display name of the attachment.
    pub name: String,
    /// Document element holding the attachment body, if stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_ref: Option<ElementId>,
    /// Media type of the attachment, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// An immutable message within a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Shared base fields.
    #[serde(flatten)]
    pub core: ElementCore,
    /// Channel the message belongs to.
    pub channel_id: ElementId,
    /// Sending actor; must be a member at creation time.
    pub sender: ActorId,
    /// Inline message body, if not stored by reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Document element holding the body, if stored by reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_ref: Option<ElementId>,
    /// Attachments carried by the message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// A named collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    /// Shared base fields.
    #[serde(flatten)]
    pub core: ElementCore,
    /// Display name of the library.
    pub name: String,
    /// Document describing the library, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_ref: Option<ElementId>,
}

// ============================================================================
// SECTION: Element Sum
// ============================================================================

/// A typed element record; the closed sum over all kinds.
///
/// # Invariants
/// - The `type` discriminant on the wire is immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    /// Task variant.
    Task(Task),
    /// Plan variant.
    Plan(Plan),
    /// Workflow variant.
    Workflow(Workflow),
    /// Document variant.
    Document(Document),
    /// Entity variant.
    Entity(Entity),
    /// Channel variant.
    Channel(Channel),
    /// Message variant.
    Message(Message),
    /// Library variant.
    Library(Library),
}

impl Element {
    /// Returns the discriminant kind.
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        match self {
            Self::Task(_) => ElementKind::Task,
            Self::Plan(_) => ElementKind::Plan,
            Self::Workflow(_) => ElementKind::Workflow,
            Self::Document(_) => ElementKind::Document,
            Self::Entity(_) => ElementKind::Entity,
            Self::Channel(_) => ElementKind::Channel,
            Self::Message(_) => ElementKind::Message,
            Self::Library(_) => ElementKind::Library,
        }
    }

    /// Returns the shared base record.
    #[must_use]
    pub const fn core(&self) -> &ElementCore {
        match self {
            Self::Task(task) => &task.core,
            Self::Plan(plan) => &plan.core,
            Self::Workflow(workflow) => &workflow.core,
            Self::Document(document) => &document.core,
            Self::Entity(entity) => &entity.core,
            Self::Channel(channel) => &channel.core,
            Self::Message(message) => &message.core,
            Self::Library(library) => &library.core,
        }
    }

    /// Returns the shared base record mutably.
    #[must_use]
    pub const fn core_mut(&mut self) -> &mut ElementCore {
        match self {
            Self::Task(task) => &mut task.core,
            Self::Plan(plan) => &mut plan.core,
            Self::Workflow(workflow) => &mut workflow.core,
            Self::Document(document) => &mut document.core,
            Self::Entity(entity) => &mut entity.core,
            Self::Channel(channel) => &mut channel.core,
            Self::Message(message) => &mut message.core,
            Self::Library(library) => &mut library.core,
        }
    }

    /// Returns the element identifier.
    #[must_use]
    pub const fn id(&self) -> &ElementId {
        &self.core().id
    }

    /// Reports whether the element is soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.core().deleted_at.is_some()
    }

    /// Returns a short human-readable label for trees and summaries.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Task(task) => &task.title,
            Self::Plan(plan) => &plan.title,
            Self::Workflow(workflow) => &workflow.title,
            Self::Document(document) => &document.content_type,
            Self::Entity(entity) => &entity.name,
            Self::Channel(channel) => &channel.name,
            Self::Message(message) => message.content.as_deref().unwrap_or(""),
            Self::Library(library) => &library.name,
        }
    }

    /// Returns the lifecycle status label, for kinds that carry one.
    #[must_use]
    pub const fn status_label(&self) -> Option<&'static str> {
        match self {
            Self::Task(task) => Some(task.status.as_str()),
            Self::Plan(plan) => Some(plan.status.as_str()),
            Self::Workflow(workflow) => Some(workflow.status.as_str()),
            _ => None,
        }
    }

    /// Returns the task variant, if this is a task.
    #[must_use]
    pub const fn as_task(&self) -> Option<&Task> {
        match self {
            Self::Task(task) => Some(task),
            _ => None,
        }
    }

    /// Returns the plan variant, if this is a plan.
    #[must_use]
    pub const fn as_plan(&self) -> Option<&Plan> {
        match self {
            Self::Plan(plan) => Some(plan),
            _ => None,
        }
    }

    /// Returns the workflow variant, if this is a workflow.
    #[must_use]
    pub const fn as_workflow(&self) -> Option<&Workflow> {
        match self {
            Self::Workflow(workflow) => Some(workflow),
            _ => None,
        }
    }

    /// Returns the document variant, if this is a document.
    #[must_use]
    pub const fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(document) => Some(document),
            _ => None,
        }
    }

    /// Returns the entity variant, if this is an entity.
    #[must_use]
    pub const fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Returns the channel variant, if this is a channel.
    #[must_use]
    pub const fn as_channel(&self) -> Option<&Channel> {
        match self {
            Self::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    /// Returns the message variant, if this is a message.
    #[must_use]
    pub const fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }

    /// Serializes the element to its wire JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Canonicalization`] when serialization fails.
    pub fn to_wire(&self) -> Result<Value, HashError> {
        serde_json::to_value(self).map_err(|err| HashError::Canonicalization(err.to_string()))
    }

    /// Computes the element's content hash from its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Canonicalization`] when serialization fails.
    pub fn content_hash(&self) -> Result<ContentHash, HashError> {
        content_hash_of_value(&self.to_wire()?)
    }
}

// ============================================================================
// SECTION: Creation Inputs
// ============================================================================

/// Input record for creating a task.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    /// Title (required, non-empty).
    pub title: String,
    /// Initial status; defaults to open.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// Priority; defaults to 3.
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Complexity; defaults to 3.
    #[serde(default)]
    pub complexity: Option<Complexity>,
    /// Classification label; defaults to `task`.
    #[serde(default)]
    pub task_type: Option<String>,
    /// Initial assignee.
    #[serde(default)]
    pub assignee: Option<ActorId>,
    /// Accountable owner.
    #[serde(default)]
    pub owner: Option<ActorId>,
    /// Hard deadline.
    #[serde(default)]
    pub deadline: Option<Timestamp>,
    /// Earliest ready instant.
    #[serde(default)]
    pub scheduled_for: Option<Timestamp>,
    /// Long-form description document.
    #[serde(default)]
    pub description_ref: Option<ElementId>,
    /// Design notes document.
    #[serde(default)]
    pub design_ref: Option<ElementId>,
    /// Initial tag set.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Initial metadata mapping.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Input record for creating a plan.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlan {
    /// Title (required, non-empty).
    pub title: String,
    /// Initial status; defaults to draft.
    #[serde(default)]
    pub status: Option<PlanStatus>,
    /// Initial tag set.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Initial metadata mapping.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Input record for creating a workflow.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkflow {
    /// Title (required, non-empty).
    pub title: String,
    /// Playbook reference, if poured.
    #[serde(default)]
    pub playbook: Option<String>,
    /// Resolved variable map.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// Excludes the workflow from export when set.
    #[serde(default)]
    pub ephemeral: bool,
    /// Initial tag set.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Initial metadata mapping.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Input record for creating a document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    /// Content-type tag; defaults to `text/markdown`.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Full document content.
    pub content: String,
    /// Initial tag set.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Initial metadata mapping.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Input record for creating an entity.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntity {
    /// Globally unique, letter-prefixed name.
    pub name: String,
    /// Classification; defaults to agent.
    #[serde(default)]
    pub classification: Option<EntityClass>,
    /// Base64-encoded Ed25519 public key.
    #[serde(default)]
    pub public_key: Option<String>,
    /// Initial tag set.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Initial metadata mapping.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Input record for creating a channel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChannel {
    /// Container kind; defaults to group.
    #[serde(default)]
    pub channel_type: Option<ChannelKind>,
    /// Channel name; ignored for direct channels (the canonical name wins).
    #[serde(default)]
    pub name: Option<String>,
    /// Initial member set; direct channels require exactly two.
    #[serde(default)]
    pub members: BTreeSet<ActorId>,
    /// Permission block.
    #[serde(default)]
    pub permissions: Option<ChannelPermissions>,
    /// Initial tag set.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Initial metadata mapping.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Input record for creating a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    /// Channel the message is sent into.
    pub channel_id: ElementId,
    /// Sending actor.
    pub sender: ActorId,
    /// Inline body.
    #[serde(default)]
    pub content: Option<String>,
    /// Body stored by reference.
    #[serde(default)]
    pub content_ref: Option<ElementId>,
    /// Attachments.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Initial tag set.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Initial metadata mapping.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Input record for creating a library.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLibrary {
    /// Display name (required, non-empty).
    pub name: String,
    /// Document describing the library.
    #[serde(default)]
    pub description_ref: Option<ElementId>,
    /// Initial tag set.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Initial metadata mapping.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Creation input for any element kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NewElement {
    /// Create a task.
    Task(NewTask),
    /// Create a plan.
    Plan(NewPlan),
    /// Create a workflow.
    Workflow(NewWorkflow),
    /// Create a document.
    Document(NewDocument),
    /// Create an entity.
    Entity(NewEntity),
    /// Create a channel.
    Channel(NewChannel),
    /// Create a message.
    Message(NewMessage),
    /// Create a library.
    Library(NewLibrary),
}

impl NewElement {
    /// Returns the kind this input would create.
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        match self {
            Self::Task(_) => ElementKind::Task,
            Self::Plan(_) => ElementKind::Plan,
            Self::Workflow(_) => ElementKind::Workflow,
            Self::Document(_) => ElementKind::Document,
            Self::Entity(_) => ElementKind::Entity,
            Self::Channel(_) => ElementKind::Channel,
            Self::Message(_) => ElementKind::Message,
            Self::Library(_) => ElementKind::Library,
        }
    }
}

// ============================================================================
// SECTION: Validation Helpers
// ============================================================================

/// Rejects empty or whitespace-only required text fields.
fn require_text(field: &'static str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::MissingRequiredField {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates an entity name: letter-prefixed, limited charset, not reserved.
///
/// # Errors
///
/// Returns [`EngineError::InvalidInput`] on structural violations.
pub fn validate_entity_name(name: &str) -> Result<(), EngineError> {
    let mut chars = name.chars();
    let leading_letter = chars.next().is_some_and(|first| first.is_ascii_alphabetic());
    let body_ok = name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if !leading_letter || !body_ok {
        return Err(EngineError::InvalidInput {
            message: format!("entity name must be letter-prefixed alphanumeric: {name}"),
        });
    }
    let lowered = name.to_ascii_lowercase();
    if RESERVED_ENTITY_NAMES.contains(&lowered.as_str()) {
        return Err(EngineError::InvalidInput {
            message: format!("entity name is reserved: {name}"),
        });
    }
    Ok(())
}

/// Validates base64-encoded Ed25519 public key material.
///
/// # Errors
///
/// Returns [`EngineError::InvalidNewKey`] when the encoding or length is wrong.
pub fn validate_public_key(encoded: &str) -> Result<(), EngineError> {
    let decoded = BASE64.decode(encoded).map_err(|_| EngineError::InvalidNewKey {
        message: "public key is not valid base64".to_string(),
    })?;
    if decoded.len() != ED25519_PUBLIC_KEY_LEN {
        return Err(EngineError::InvalidNewKey {
            message: format!(
                "public key must decode to {ED25519_PUBLIC_KEY_LEN} bytes, got {}",
                decoded.len()
            ),
        });
    }
    Ok(())
}

/// Computes the canonical direct-channel name for an unordered member pair.
///
/// Stable under argument swap: the members are sorted before joining.
#[must_use]
pub fn direct_channel_name(a: &ActorId, b: &ActorId) -> String {
    let (low, high) = if a.as_str() <= b.as_str() { (a, b) } else { (b, a) };
    format!("{DIRECT_CHANNEL_PREFIX}{low}:{high}")
}

// ============================================================================
// SECTION: Factories
// ============================================================================

/// Builds a task from a creation input.
///
/// # Errors
///
/// Returns a `Validation` failure when required fields are missing.
pub fn build_task(
    id: ElementId,
    actor: ActorId,
    now: Timestamp,
    input: NewTask,
) -> Result<Task, EngineError> {
    require_text("title", &input.title)?;
    let status = input.status.unwrap_or(TaskStatus::Open);
    let closed_at = (status == TaskStatus::Closed).then_some(now);
    Ok(Task {
        core: ElementCore::new(id, actor, now, input.tags, input.metadata),
        title: input.title,
        status,
        priority: input.priority.unwrap_or(Priority::DEFAULT),
        complexity: input.complexity.unwrap_or(Complexity::DEFAULT),
        task_type: input.task_type.unwrap_or_else(|| "task".to_string()),
        assignee: input.assignee,
        owner: input.owner,
        deadline: input.deadline,
        scheduled_for: input.scheduled_for,
        closed_at,
        close_reason: None,
        description_ref: input.description_ref,
        design_ref: input.design_ref,
    })
}

/// Builds a plan from a creation input.
///
/// # Errors
///
/// Returns a `Validation` failure when required fields are missing.
pub fn build_plan(
    id: ElementId,
    actor: ActorId,
    now: Timestamp,
    input: NewPlan,
) -> Result<Plan, EngineError> {
    require_text("title", &input.title)?;
    Ok(Plan {
        core: ElementCore::new(id, actor, now, input.tags, input.metadata),
        title: input.title,
        status: input.status.unwrap_or(PlanStatus::Draft),
    })
}

/// Builds a workflow from a creation input.
///
/// # Errors
///
/// Returns a `Validation` failure when required fields are missing.
pub fn build_workflow(
    id: ElementId,
    actor: ActorId,
    now: Timestamp,
    input: NewWorkflow,
) -> Result<Workflow, EngineError> {
    require_text("title", &input.title)?;
    Ok(Workflow {
        core: ElementCore::new(id, actor, now, input.tags, input.metadata),
        title: input.title,
        status: WorkflowStatus::Pending,
        playbook: input.playbook,
        variables: input.variables,
        ephemeral: input.ephemeral,
    })
}

/// Builds a version-1 document from a creation input.
///
/// # Errors
///
/// Returns a `Validation` failure when required fields are missing.
pub fn build_document(
    id: ElementId,
    actor: ActorId,
    now: Timestamp,
    input: NewDocument,
) -> Result<Document, EngineError> {
    Ok(Document {
        core: ElementCore::new(id, actor, now, input.tags, input.metadata),
        content_type: input.content_type.unwrap_or_else(|| "text/markdown".to_string()),
        content: input.content,
        version: 1,
        previous_version_id: None,
    })
}

/// Builds an entity from a creation input.
///
/// # Errors
///
/// Returns a `Validation` failure when the name or key material is invalid.
pub fn build_entity(
    id: ElementId,
    actor: ActorId,
    now: Timestamp,
    input: NewEntity,
) -> Result<Entity, EngineError> {
    require_text("name", &input.name)?;
    validate_entity_name(&input.name)?;
    if let Some(key) = &input.public_key {
        validate_public_key(key)?;
    }
    Ok(Entity {
        core: ElementCore::new(id, actor, now, input.tags, input.metadata),
        name: input.name,
        classification: input.classification.unwrap_or(EntityClass::Agent),
        public_key: input.public_key,
        deactivated_at: None,
        key_rotated_at: None,
        key_revoked_at: None,
    })
}

/// Builds a channel from a creation input.
///
/// Direct channels require exactly two members; their name is always the
/// canonical pair-derived name regardless of the supplied one.
///
/// # Errors
///
/// Returns a `Validation` failure when the shape is invalid.
pub fn build_channel(
    id: ElementId,
    actor: ActorId,
    now: Timestamp,
    input: NewChannel,
) -> Result<Channel, EngineError> {
    let channel_type = input.channel_type.unwrap_or(ChannelKind::Group);
    let name = match channel_type {
        ChannelKind::Direct => {
            let mut members = input.members.iter();
            match (members.next(), members.next(), members.next()) {
                (Some(a), Some(b), None) => direct_channel_name(a, b),
                _ => {
                    return Err(EngineError::InvalidInput {
                        message: "direct channels require exactly two members".to_string(),
                    });
                }
            }
        }
        ChannelKind::Group => {
            let name = input.name.unwrap_or_default();
            require_text("name", &name)?;
            name
        }
    };
    Ok(Channel {
        core: ElementCore::new(id, actor, now, input.tags, input.metadata),
        channel_type,
        name,
        members: input.members,
        permissions: input.permissions.unwrap_or_default(),
    })
}

/// Builds a message from a creation input.
///
/// # Errors
///
/// Returns a `Validation` failure when neither inline content nor a content
/// reference is present.
pub fn build_message(
    id: ElementId,
    actor: ActorId,
    now: Timestamp,
    input: NewMessage,
) -> Result<Message, EngineError> {
    if input.content.is_none() && input.content_ref.is_none() {
        return Err(EngineError::MissingRequiredField {
            field: "content".to_string(),
        });
    }
    Ok(Message {
        core: ElementCore::new(id, actor, now, input.tags, input.metadata),
        channel_id: input.channel_id,
        sender: input.sender,
        content: input.content,
        content_ref: input.content_ref,
        attachments: input.attachments,
    })
}

/// Builds a library from a creation input.
///
/// # Errors
///
/// Returns a `Validation` failure when required fields are missing.
pub fn build_library(
    id: ElementId,
    actor: ActorId,
    now: Timestamp,
    input: NewLibrary,
) -> Result<Library, EngineError> {
    require_text("name", &input.name)?;
    Ok(Library {
        core: ElementCore::new(id, actor, now, input.tags, input.metadata),
        name: input.name,
        description_ref: input.description_ref,
    })
}

/// Builds an element of any kind from a creation input.
///
/// # Errors
///
/// Returns a `Validation` failure when the input record is invalid.
pub fn build_element(
    id: ElementId,
    actor: ActorId,
    now: Timestamp,
    input: NewElement,
) -> Result<Element, EngineError> {
    match input {
        NewElement::Task(task) => build_task(id, actor, now, task).map(Element::Task),
        NewElement::Plan(plan) => build_plan(id, actor, now, plan).map(Element::Plan),
        NewElement::Workflow(workflow) => {
            build_workflow(id, actor, now, workflow).map(Element::Workflow)
        }
        NewElement::Document(document) => {
            build_document(id, actor, now, document).map(Element::Document)
        }
        NewElement::Entity(entity) => build_entity(id, actor, now, entity).map(Element::Entity),
        NewElement::Channel(channel) => {
            build_channel(id, actor, now, channel).map(Element::Channel)
        }
        NewElement::Message(message) => {
            build_message(id, actor, now, message).map(Element::Message)
        }
        NewElement::Library(library) => {
            build_library(id, actor, now, library).map(Element::Library)
        }
    }
}

// ============================================================================
// SECTION: Patches
// ============================================================================

/// Field overlay for a task.
///
/// `Option<T>` leaves a field unchanged; `Option<Option<T>>` distinguishes
/// "leave" / "clear" / "set" for optional fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New status.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// New priority.
    #[serde(default)]
    pub priority: Option<Priority>,
    /// New complexity.
    #[serde(default)]
    pub complexity: Option<Complexity>,
    /// New classification label.
    #[serde(default)]
    pub task_type: Option<String>,
    /// New assignee (outer None leaves, inner None clears).
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Option<ActorId>>,
    /// New owner.
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub owner: Option<Option<ActorId>>,
    /// New deadline.
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Option<Timestamp>>,
    /// New earliest ready instant.
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<Option<Timestamp>>,
    /// New close reason.
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<Option<String>>,
    /// New description document.
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub description_ref: Option<Option<ElementId>>,
    /// New design document.
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub design_ref: Option<Option<ElementId>>,
}

/// Field overlay for a plan.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPatch {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New status.
    #[serde(default)]
    pub status: Option<PlanStatus>,
}

/// Field overlay for a workflow.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPatch {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New status.
    #[serde(default)]
    pub status: Option<WorkflowStatus>,
    /// Replacement variable map.
    #[serde(default)]
    pub variables: Option<BTreeMap<String, Value>>,
    /// New ephemeral flag.
    #[serde(default)]
    pub ephemeral: Option<bool>,
}

/// Field overlay for a document; any change produces a new version.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    /// New content-type tag.
    #[serde(default)]
    pub content_type: Option<String>,
    /// New content.
    #[serde(default)]
    pub content: Option<String>,
}

/// Field overlay for an entity. Key material changes go through the
/// dedicated rotation and revocation operations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    /// New unique name.
    #[serde(default)]
    pub name: Option<String>,
    /// New classification.
    #[serde(default)]
    pub classification: Option<EntityClass>,
}

/// Field overlay for a channel. Members change through membership ops only.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPatch {
    /// New name (group channels only).
    #[serde(default)]
    pub name: Option<String>,
    /// New permission block.
    #[serde(default)]
    pub permissions: Option<ChannelPermissions>,
}

/// Field overlay for a library.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryPatch {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New description document.
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub description_ref: Option<Option<ElementId>>,
}

/// Kind-specific field overlay.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldsPatch {
    /// Task fields.
    Task(TaskPatch),
    /// Plan fields.
    Plan(PlanPatch),
    /// Workflow fields.
    Workflow(WorkflowPatch),
    /// Document fields.
    Document(DocumentPatch),
    /// Entity fields.
    Entity(EntityPatch),
    /// Channel fields.
    Channel(ChannelPatch),
    /// Library fields.
    Library(LibraryPatch),
}

impl FieldsPatch {
    /// Returns the element kind the overlay targets.
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        match self {
            Self::Task(_) => ElementKind::Task,
            Self::Plan(_) => ElementKind::Plan,
            Self::Workflow(_) => ElementKind::Workflow,
            Self::Document(_) => ElementKind::Document,
            Self::Entity(_) => ElementKind::Entity,
            Self::Channel(_) => ElementKind::Channel,
            Self::Library(_) => ElementKind::Library,
        }
    }
}

/// Complete update overlay for an element.
///
/// # Invariants
/// - `tags` and `metadata`, when present, replace the stored collections.
/// - Identifier, type, creation instant, and creator are not expressible.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementPatch {
    /// Replacement tag set.
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
    /// Replacement metadata mapping.
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, Value>>,
    /// Kind-specific field overlay.
    #[serde(flatten)]
    pub fields: Option<FieldsPatch>,
}

/// Serde adapter distinguishing absent fields from explicit nulls.
mod double_option {
    use serde::Deserialize;
    use serde::Deserializer;

    /// Deserializes a present value (possibly null) into `Some(Option<T>)`.
    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

// ============================================================================
// SECTION: Patch Application
// ============================================================================

impl Task {
    /// Overlays a patch onto the task.
    pub fn apply(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(complexity) = patch.complexity {
            self.complexity = complexity;
        }
        if let Some(task_type) = patch.task_type {
            self.task_type = task_type;
        }
        if let Some(assignee) = patch.assignee {
            self.assignee = assignee;
        }
        if let Some(owner) = patch.owner {
            self.owner = owner;
        }
        if let Some(deadline) = patch.deadline {
            self.deadline = deadline;
        }
        if let Some(scheduled_for) = patch.scheduled_for {
            self.scheduled_for = scheduled_for;
        }
        if let Some(close_reason) = patch.close_reason {
            self.close_reason = close_reason;
        }
        if let Some(description_ref) = patch.description_ref {
            self.description_ref = description_ref;
        }
        if let Some(design_ref) = patch.design_ref {
            self.design_ref = design_ref;
        }
    }
}

impl Plan {
    /// Overlays a patch onto the plan.
    pub fn apply(&mut self, patch: PlanPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }
}

impl Workflow {
    /// Overlays a patch onto the workflow.
    pub fn apply(&mut self, patch: WorkflowPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(variables) = patch.variables {
            self.variables = variables;
        }
        if let Some(ephemeral) = patch.ephemeral {
            self.ephemeral = ephemeral;
        }
    }
}

impl Document {
    /// Overlays a patch onto the document body fields.
    ///
    /// Version advancement and history capture are the engine's concern.
    pub fn apply(&mut self, patch: DocumentPatch) {
        if let Some(content_type) = patch.content_type {
            self.content_type = content_type;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
    }
}

impl Entity {
    /// Overlays a patch onto the entity.
    pub fn apply(&mut self, patch: EntityPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(classification) = patch.classification {
            self.classification = classification;
        }
    }
}

impl Channel {
    /// Overlays a patch onto the channel.
    pub fn apply(&mut self, patch: ChannelPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(permissions) = patch.permissions {
            self.permissions = permissions;
        }
    }
}

impl Library {
    /// Overlays a patch onto the library.
    pub fn apply(&mut self, patch: LibraryPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description_ref) = patch.description_ref {
            self.description_ref = description_ref;
        }
    }
}
