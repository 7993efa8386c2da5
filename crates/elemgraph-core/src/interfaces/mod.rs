// crates/elemgraph-core/src/interfaces/mod.rs
// ============================================================================
// Module: Elemgraph Interfaces
// Description: Backend-agnostic contracts for storage, time, keys, playbooks.
// Purpose: Define the collaborator surfaces consumed by the element engine.
// Dependencies: crate::core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the engine integrates with external systems without
//! embedding backend-specific details. The storage contract is the engine's
//! serialisation point: every mutation is handed to [`StorageBackend::apply`]
//! as a batch of write operations executed in one transaction, so row
//! writes and event appends are atomic together.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::BlockedRow;
use crate::core::ChannelKind;
use crate::core::ContentHash;
use crate::core::DependencyKind;
use crate::core::DependencyRecord;
use crate::core::Element;
use crate::core::ElementFilter;
use crate::core::ElementId;
use crate::core::EventFilter;
use crate::core::EventRecord;
use crate::core::NewEvent;
use crate::core::Playbook;
use crate::core::PlaybookId;
use crate::core::TaskStatus;
use crate::core::Timestamp;
use crate::core::Visibility;

// ============================================================================
// SECTION: Backend Errors
// ============================================================================

/// Storage backend errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages avoid embedding raw element payloads.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend I/O error.
    #[error("backend io error: {0}")]
    Io(String),
    /// Database engine error.
    #[error("backend db error: {0}")]
    Db(String),
    /// Stored data is corrupted or fails integrity checks.
    #[error("backend corruption: {0}")]
    Corrupt(String),
    /// Stored data is invalid.
    #[error("backend invalid data: {0}")]
    Invalid(String),
    /// The backend connection has been closed.
    #[error("backend is closed")]
    Closed,
    /// The operation exceeded a configured timeout.
    #[error("backend timeout: {0}")]
    Timeout(String),
}

// ============================================================================
// SECTION: Persisted Records
// ============================================================================

/// An element row as stored: the typed element plus its content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedElement {
    /// The typed element.
    pub element: Element,
    /// Content hash over the canonical projection.
    pub content_hash: ContentHash,
}

impl PersistedElement {
    /// Builds a persisted record by hashing the element.
    ///
    /// # Errors
    ///
    /// Returns [`crate::core::HashError`] when canonicalization fails.
    pub fn from_element(element: Element) -> Result<Self, crate::core::HashError> {
        let content_hash = element.content_hash()?;
        Ok(Self {
            element,
            content_hash,
        })
    }

    /// Builds the boxed write operation persisting this record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::core::HashError`] when canonicalization fails.
    pub fn put_op(element: Element) -> Result<WriteOp, crate::core::HashError> {
        Ok(WriteOp::PutElement(Box::new(Self::from_element(element)?)))
    }
}

/// One historical document version row.
///
/// # Invariants
/// - `(document_id, version)` is unique.
/// - `data` holds the full serialized document payload at that version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVersionRecord {
    /// Document element identifier.
    pub document_id: ElementId,
    /// Version number captured by this row.
    pub version: u64,
    /// Full serialized payload at that version.
    pub data: Value,
    /// Instant the row was captured.
    pub created_at: Timestamp,
}

/// Aggregate storage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStats {
    /// On-disk size of the store in bytes (0 for in-memory stores).
    pub file_size: u64,
}

// ============================================================================
// SECTION: Write Operations
// ============================================================================

/// One write operation inside a mutation batch.
///
/// # Invariants
/// - A batch is applied atomically: all operations commit or none do.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert or replace an element row and its tag set.
    PutElement(Box<PersistedElement>),
    /// Insert a dependency edge.
    PutDependency(DependencyRecord),
    /// Delete one dependency edge.
    DeleteDependency {
        /// Source element identifier.
        source: ElementId,
        /// Target element identifier.
        target: ElementId,
        /// Edge kind.
        kind: DependencyKind,
    },
    /// Delete every edge where the element is source or target.
    DeleteDependenciesTouching(ElementId),
    /// Replace the metadata of an existing edge.
    SetDependencyMetadata {
        /// Source element identifier.
        source: ElementId,
        /// Target element identifier.
        target: ElementId,
        /// Edge kind.
        kind: DependencyKind,
        /// Replacement metadata.
        metadata: Option<Value>,
    },
    /// Append an event log entry.
    AppendEvent(NewEvent),
    /// Insert a historical document version row.
    PutDocumentVersion(DocumentVersionRecord),
    /// Replace the blocked rows of one element.
    ReplaceBlockedRows {
        /// Element whose rows are replaced.
        element_id: ElementId,
        /// New row set (may be empty).
        rows: Vec<BlockedRow>,
    },
    /// Delete every blocked-cache row.
    ClearBlockedCache,
    /// Record the pre-block status to restore on unblock.
    SetRestoreStatus {
        /// Auto-blocked element.
        element_id: ElementId,
        /// Status to restore when the last blocker clears.
        status: TaskStatus,
    },
    /// Drop the recorded pre-block status.
    ClearRestoreStatus(ElementId),
    /// Mark the element as diverged from the last exported snapshot.
    MarkDirty(ElementId),
}

// ============================================================================
// SECTION: Storage Backend
// ============================================================================

/// Storage contract consumed by the element engine.
///
/// Implementations serialize mutations: [`StorageBackend::apply`] runs its
/// batch in a single transaction, and batches from concurrent callers are
/// executed one at a time.
pub trait StorageBackend {
    /// Loads one element by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn element(&self, id: &ElementId) -> Result<Option<PersistedElement>, BackendError>;

    /// Loads several elements in one batched lookup; missing ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn elements(&self, ids: &[ElementId]) -> Result<Vec<PersistedElement>, BackendError>;

    /// Lists elements matching the filter, ordered `created_at` descending,
    /// honouring the filter's effective limit and offset.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn list(&self, filter: &ElementFilter) -> Result<Vec<PersistedElement>, BackendError>;

    /// Returns every element id, ordered by (created instant, id) ascending.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn element_ids(&self, include_deleted: bool) -> Result<Vec<ElementId>, BackendError>;

    /// Counts elements matching the filter, ignoring limit and offset.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn count(&self, filter: &ElementFilter) -> Result<u64, BackendError>;

    /// Case-insensitive substring search across title, body, name, and tags.
    ///
    /// Results are ordered `updated_at` descending and capped at `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn search(
        &self,
        query: &str,
        filter: &ElementFilter,
        limit: usize,
    ) -> Result<Vec<PersistedElement>, BackendError>;

    /// Finds the live (non-tombstoned) entity with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn find_entity_by_name(&self, name: &str) -> Result<Option<PersistedElement>, BackendError>;

    /// Finds the live channel with the given kind and name, optionally
    /// narrowed to a visibility scope.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn find_channel_by_name(
        &self,
        kind: ChannelKind,
        name: &str,
        visibility: Option<Visibility>,
    ) -> Result<Option<PersistedElement>, BackendError>;

    /// Returns outgoing edges (element as source), optionally kind-filtered.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn dependencies_of(
        &self,
        id: &ElementId,
        kinds: Option<&[DependencyKind]>,
    ) -> Result<Vec<DependencyRecord>, BackendError>;

    /// Returns incoming edges (element as target), optionally kind-filtered.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn dependents_of(
        &self,
        id: &ElementId,
        kinds: Option<&[DependencyKind]>,
    ) -> Result<Vec<DependencyRecord>, BackendError>;

    /// Loads one edge by its triple.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn dependency(
        &self,
        source: &ElementId,
        target: &ElementId,
        kind: DependencyKind,
    ) -> Result<Option<DependencyRecord>, BackendError>;

    /// Returns every edge, ordered by (source, target, kind) ascending.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn all_dependencies(&self) -> Result<Vec<DependencyRecord>, BackendError>;

    /// Reads the element's event log with the filter applied, ordered
    /// `created_at` descending (ties broken by id descending).
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn events(&self, id: &ElementId, filter: &EventFilter)
    -> Result<Vec<EventRecord>, BackendError>;

    /// Counts all events in the log.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn event_count(&self) -> Result<u64, BackendError>;

    /// Returns the blocked rows of one element.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn blocked_rows(&self, id: &ElementId) -> Result<Vec<BlockedRow>, BackendError>;

    /// Returns every blocked row naming the given blocker.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn blocked_rows_by_blocker(&self, blocker: &ElementId)
    -> Result<Vec<BlockedRow>, BackendError>;

    /// Returns the entire blocked cache.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn all_blocked_rows(&self) -> Result<Vec<BlockedRow>, BackendError>;

    /// Returns the recorded pre-block status for an auto-blocked element.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn restore_status(&self, id: &ElementId) -> Result<Option<TaskStatus>, BackendError>;

    /// Loads one historical document version row.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn document_version(
        &self,
        id: &ElementId,
        version: u64,
    ) -> Result<Option<DocumentVersionRecord>, BackendError>;

    /// Loads all historical version rows of a document, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn document_versions(
        &self,
        id: &ElementId,
    ) -> Result<Vec<DocumentVersionRecord>, BackendError>;

    /// Applies a mutation batch in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the transaction fails; no operation of
    /// the batch is applied in that case.
    fn apply(&self, ops: &[WriteOp]) -> Result<(), BackendError>;

    /// Atomically allocates the next child ordinal under a parent.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the allocation fails.
    fn next_child_number(&self, parent: &ElementId) -> Result<u64, BackendError>;

    /// Returns the element ids diverged since the last export acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn dirty_elements(&self) -> Result<Vec<ElementId>, BackendError>;

    /// Acknowledges processed dirty ids, removing them from the feed.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the write fails.
    fn clear_dirty(&self, ids: &[ElementId]) -> Result<(), BackendError>;

    /// Reports aggregate storage statistics.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the read fails.
    fn stats(&self) -> Result<BackendStats, BackendError>;

    /// Reports whether the backend connection is open.
    fn is_open(&self) -> bool;

    /// Closes the backend connection; subsequent operations fail `Closed`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when teardown fails.
    fn close(&self) -> Result<(), BackendError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Time source consumed by the engine for stamping instants.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or(0);
        Timestamp::from_unix_millis(i64::try_from(millis).unwrap_or(i64::MAX))
    }
}

/// Deterministic time source for tests; advances only when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current instant in unix milliseconds.
    now_millis: AtomicI64,
}

impl ManualClock {
    /// Creates a manual clock starting at the given instant.
    #[must_use]
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            now_millis: AtomicI64::new(start.unix_millis()),
        }
    }

    /// Sets the current instant.
    pub fn set(&self, now: Timestamp) {
        self.now_millis.store(now.unix_millis(), Ordering::SeqCst);
    }

    /// Advances the clock by the given number of milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        self.now_millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.now_millis.load(Ordering::SeqCst))
    }
}

// ============================================================================
// SECTION: Signature Verifier
// ============================================================================

/// Signature verification collaborator.
///
/// Implementations must treat malformed keys or signatures as a failed
/// verification rather than an error.
pub trait SignatureVerifier {
    /// Verifies `signature_b64` over `message` with `public_key_b64`.
    fn verify(&self, message: &str, signature_b64: &str, public_key_b64: &str) -> bool;
}

// ============================================================================
// SECTION: Playbook Loader
// ============================================================================

/// Playbook loader errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum PlaybookError {
    /// The loader failed to read or parse a playbook.
    #[error("playbook load error: {0}")]
    Load(String),
}

/// Playbook resolution collaborator.
pub trait PlaybookLoader {
    /// Loads a playbook by identifier, returning `None` when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybookError`] when loading fails.
    fn load(&self, id: &PlaybookId) -> Result<Option<Playbook>, PlaybookError>;
}
