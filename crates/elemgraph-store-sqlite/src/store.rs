// crates/elemgraph-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Storage Backend
// Description: Durable StorageBackend over SQLite WAL with JSON extraction.
// Purpose: Persist elements, edges, events, and derived state atomically.
// Dependencies: elemgraph-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Each element row hoists the shared base fields into columns and stores
//! the type-specific fields (metadata included) as a JSON `data` column;
//! the tag set lives in its own table so per-(element, tag) uniqueness
//! holds relationally. Filters compile to parameterised SQL with
//! `json_extract` over `data`. Every mutation batch runs in one `IMMEDIATE`
//! transaction; the dirty feed and child counters are plain tables so they
//! share that transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use elemgraph_core::BackendError;
use elemgraph_core::BackendStats;
use elemgraph_core::BlockedRow;
use elemgraph_core::ChannelKind;
use elemgraph_core::ContentHash;
use elemgraph_core::DependencyKind;
use elemgraph_core::DependencyRecord;
use elemgraph_core::DocumentVersionRecord;
use elemgraph_core::Element;
use elemgraph_core::ElementFilter;
use elemgraph_core::ElementId;
use elemgraph_core::EventFilter;
use elemgraph_core::EventKind;
use elemgraph_core::EventRecord;
use elemgraph_core::PersistedElement;
use elemgraph_core::StorageBackend;
use elemgraph_core::TaskStatus;
use elemgraph_core::Timestamp;
use elemgraph_core::Visibility;
use elemgraph_core::WriteOp;
use elemgraph_core::identifiers::ActorId;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Chunk size for `IN (...)` parameter lists.
const IN_CLAUSE_CHUNK: usize = 400;
/// Wire fields hoisted out of the JSON `data` column.
const HOISTED_FIELDS: [&str; 7] =
    ["id", "type", "createdAt", "updatedAt", "createdBy", "deletedAt", "tags"];

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` storage backend.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteBackendConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteBackendConfig {
    /// Builds a configuration with defaults for the given path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` backend errors.
///
/// # Invariants
/// - Error messages avoid embedding raw element payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteBackendError {
    /// Backend I/O error.
    #[error("sqlite backend io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite backend db error: {0}")]
    Db(String),
    /// Stored data is corrupted or fails to deserialize.
    #[error("sqlite backend corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite backend version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite backend invalid data: {0}")]
    Invalid(String),
    /// The connection has been closed.
    #[error("sqlite backend is closed")]
    Closed,
}

impl From<SqliteBackendError> for BackendError {
    fn from(error: SqliteBackendError) -> Self {
        match error {
            SqliteBackendError::Io(message) => Self::Io(message),
            SqliteBackendError::Db(message) => Self::Db(message),
            SqliteBackendError::Corrupt(message) => Self::Corrupt(message),
            SqliteBackendError::VersionMismatch(message) | SqliteBackendError::Invalid(message) => {
                Self::Invalid(message)
            }
            SqliteBackendError::Closed => Self::Closed,
        }
    }
}

/// Maps a rusqlite error into the backend error space.
fn db_err(error: &rusqlite::Error) -> SqliteBackendError {
    SqliteBackendError::Db(error.to_string())
}

// ============================================================================
// SECTION: Path Validation
// ============================================================================

/// Validates the store path shape before opening.
fn validate_store_path(path: &Path) -> Result<(), SqliteBackendError> {
    let rendered = path.display().to_string();
    if rendered.is_empty() {
        return Err(SqliteBackendError::Invalid("store path is empty".to_string()));
    }
    if rendered.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteBackendError::Invalid(format!(
            "store path exceeds {MAX_TOTAL_PATH_LENGTH} characters"
        )));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteBackendError::Invalid(format!(
                "store path component exceeds {MAX_PATH_COMPONENT_LENGTH} characters"
            )));
        }
    }
    if path.is_dir() {
        return Err(SqliteBackendError::Invalid(format!(
            "store path is a directory: {rendered}"
        )));
    }
    Ok(())
}

/// Creates the parent directory of the store file when missing.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteBackendError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|err| SqliteBackendError::Io(err.to_string()))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// `SQLite`-backed storage backend.
///
/// # Invariants
/// - Connection access is serialized through a mutex; mutation batches run
///   in `IMMEDIATE` transactions.
pub struct SqliteBackend {
    /// Backend configuration.
    config: SqliteBackendConfig,
    /// Connection; `None` after close.
    connection: Mutex<Option<Connection>>,
}

impl SqliteBackend {
    /// Opens an `SQLite`-backed storage backend.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteBackendError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteBackendConfig) -> Result<Self, SqliteBackendError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Locks the connection, failing `Closed` after teardown.
    fn guard(&self) -> Result<MutexGuard<'_, Option<Connection>>, SqliteBackendError> {
        self.connection
            .lock()
            .map_err(|_| SqliteBackendError::Db("connection mutex poisoned".to_string()))
    }

    /// Runs a read closure against the open connection.
    fn with_conn<T>(
        &self,
        work: impl FnOnce(&Connection) -> Result<T, SqliteBackendError>,
    ) -> Result<T, BackendError> {
        let guard = self.guard()?;
        let connection = guard.as_ref().ok_or(SqliteBackendError::Closed)?;
        Ok(work(connection)?)
    }

    /// Runs a write closure inside one `IMMEDIATE` transaction.
    fn with_tx<T>(
        &self,
        work: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, SqliteBackendError>,
    ) -> Result<T, BackendError> {
        let mut guard = self.guard()?;
        let connection = guard.as_mut().ok_or(SqliteBackendError::Closed)?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| db_err(&err))?;
        let out = work(&tx)?;
        tx.commit().map_err(|err| db_err(&err))?;
        Ok(out)
    }
}

/// Opens and configures one connection.
fn open_connection(config: &SqliteBackendConfig) -> Result<Connection, SqliteBackendError> {
    let connection = Connection::open_with_flags(
        &config.path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    )
    .map_err(|err| db_err(&err))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_err(&err))?;
    connection
        .pragma_update(None, "journal_mode", config.journal_mode.pragma_value())
        .map_err(|err| db_err(&err))?;
    connection
        .pragma_update(None, "synchronous", config.sync_mode.pragma_value())
        .map_err(|err| db_err(&err))?;
    connection
        .pragma_update(None, "foreign_keys", "on")
        .map_err(|err| db_err(&err))?;
    Ok(connection)
}

/// Creates or validates the schema, refusing unknown versions.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteBackendError> {
    let tx = connection.transaction().map_err(|err| db_err(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_err(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_err(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_err(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS elements (
                    id TEXT PRIMARY KEY,
                    type TEXT NOT NULL,
                    data TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    created_by TEXT NOT NULL,
                    deleted_at INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_elements_type ON elements (type);
                CREATE INDEX IF NOT EXISTS idx_elements_created_at ON elements (created_at);
                CREATE INDEX IF NOT EXISTS idx_elements_updated_at ON elements (updated_at);
                CREATE INDEX IF NOT EXISTS idx_elements_status
                    ON elements (json_extract(data, '$.status'));
                CREATE UNIQUE INDEX IF NOT EXISTS idx_elements_entity_name
                    ON elements (json_extract(data, '$.name'))
                    WHERE type = 'entity' AND deleted_at IS NULL;
                CREATE UNIQUE INDEX IF NOT EXISTS idx_elements_group_channel_name
                    ON elements (
                        json_extract(data, '$.name'),
                        json_extract(data, '$.permissions.visibility')
                    )
                    WHERE type = 'channel'
                        AND deleted_at IS NULL
                        AND json_extract(data, '$.channelType') = 'group';
                CREATE TABLE IF NOT EXISTS tags (
                    element_id TEXT NOT NULL,
                    tag TEXT NOT NULL,
                    PRIMARY KEY (element_id, tag)
                );
                CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags (tag);
                CREATE TABLE IF NOT EXISTS dependencies (
                    source_id TEXT NOT NULL,
                    target_id TEXT NOT NULL,
                    type TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    created_by TEXT NOT NULL,
                    metadata TEXT,
                    PRIMARY KEY (source_id, target_id, type)
                );
                CREATE INDEX IF NOT EXISTS idx_dependencies_target
                    ON dependencies (target_id);
                CREATE INDEX IF NOT EXISTS idx_dependencies_type ON dependencies (type);
                CREATE TABLE IF NOT EXISTS events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    element_id TEXT NOT NULL,
                    event_type TEXT NOT NULL,
                    actor TEXT NOT NULL,
                    old_value TEXT,
                    new_value TEXT,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_events_element ON events (element_id);
                CREATE TABLE IF NOT EXISTS document_versions (
                    document_id TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    data TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    PRIMARY KEY (document_id, version)
                );
                CREATE TABLE IF NOT EXISTS blocked_cache (
                    element_id TEXT NOT NULL,
                    blocked_by TEXT NOT NULL,
                    reason TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_blocked_element
                    ON blocked_cache (element_id);
                CREATE INDEX IF NOT EXISTS idx_blocked_blocker
                    ON blocked_cache (blocked_by);
                CREATE TABLE IF NOT EXISTS blocked_restore (
                    element_id TEXT PRIMARY KEY,
                    status TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS child_counters (
                    parent_id TEXT PRIMARY KEY,
                    next_child INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS dirty_elements (
                    element_id TEXT PRIMARY KEY,
                    marked_at INTEGER NOT NULL
                );",
            )
            .map_err(|err| db_err(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteBackendError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_err(&err))?;
    Ok(())
}

// ============================================================================
// SECTION: Row Serialization
// ============================================================================

/// Column tuple read back for one element row.
struct RawElementRow {
    /// Element identifier.
    id: String,
    /// Kind discriminant label.
    kind: String,
    /// Type-specific JSON payload.
    data: String,
    /// Stored content hash.
    content_hash: String,
    /// Creation instant (unix millis).
    created_at: i64,
    /// Last-update instant (unix millis).
    updated_at: i64,
    /// Creating actor.
    created_by: String,
    /// Soft-deletion instant, when tombstoned.
    deleted_at: Option<i64>,
}

/// Splits a persisted element into its column values and data payload.
fn decompose(
    persisted: &PersistedElement,
) -> Result<(RawElementRow, Vec<String>), SqliteBackendError> {
    let wire = persisted
        .element
        .to_wire()
        .map_err(|err| SqliteBackendError::Invalid(err.to_string()))?;
    let Value::Object(mut fields) = wire else {
        return Err(SqliteBackendError::Invalid(
            "element wire form is not an object".to_string(),
        ));
    };
    for hoisted in HOISTED_FIELDS {
        fields.remove(hoisted);
    }
    let data = serde_json::to_string(&Value::Object(fields))
        .map_err(|err| SqliteBackendError::Invalid(err.to_string()))?;
    let core = persisted.element.core();
    let row = RawElementRow {
        id: core.id.as_str().to_string(),
        kind: persisted.element.kind().as_str().to_string(),
        data,
        content_hash: persisted.content_hash.as_str().to_string(),
        created_at: core.created_at.unix_millis(),
        updated_at: core.updated_at.unix_millis(),
        created_by: core.created_by.as_str().to_string(),
        deleted_at: core.deleted_at.map(Timestamp::unix_millis),
    };
    let tags = core.tags.iter().cloned().collect();
    Ok((row, tags))
}

/// Reassembles a persisted element from its columns and tag set.
fn compose(row: RawElementRow, tags: &BTreeSet<String>) -> Result<PersistedElement, SqliteBackendError> {
    let mut fields: serde_json::Map<String, Value> = serde_json::from_str(&row.data)
        .map_err(|err| SqliteBackendError::Corrupt(format!("element data column: {err}")))?;
    fields.insert("id".to_string(), Value::String(row.id));
    fields.insert("type".to_string(), Value::String(row.kind));
    fields.insert("createdAt".to_string(), Value::from(row.created_at));
    fields.insert("updatedAt".to_string(), Value::from(row.updated_at));
    fields.insert("createdBy".to_string(), Value::String(row.created_by));
    if let Some(deleted_at) = row.deleted_at {
        fields.insert("deletedAt".to_string(), Value::from(deleted_at));
    }
    fields.insert(
        "tags".to_string(),
        Value::Array(tags.iter().cloned().map(Value::String).collect()),
    );
    let element: Element = serde_json::from_value(Value::Object(fields))
        .map_err(|err| SqliteBackendError::Corrupt(format!("element row: {err}")))?;
    Ok(PersistedElement {
        element,
        content_hash: ContentHash::new(row.content_hash),
    })
}

/// Parses a stored enum label through its serde representation.
fn label_to<T: DeserializeOwned>(label: &str, what: &str) -> Result<T, SqliteBackendError> {
    serde_json::from_value(Value::String(label.to_string()))
        .map_err(|err| SqliteBackendError::Corrupt(format!("{what} label {label}: {err}")))
}

/// Parses an optional JSON text column.
fn parse_json_column(
    text: Option<String>,
    what: &str,
) -> Result<Option<Value>, SqliteBackendError> {
    text.map(|text| {
        serde_json::from_str(&text)
            .map_err(|err| SqliteBackendError::Corrupt(format!("{what}: {err}")))
    })
    .transpose()
}

/// Builds a dependency record from its row tuple.
fn compose_dependency(
    source_id: String,
    target_id: String,
    kind: &str,
    created_at: i64,
    created_by: String,
    metadata: Option<String>,
) -> Result<DependencyRecord, SqliteBackendError> {
    Ok(DependencyRecord {
        source_id: ElementId::new(source_id),
        target_id: ElementId::new(target_id),
        kind: label_to(kind, "dependency kind")?,
        created_at: Timestamp::from_unix_millis(created_at),
        created_by: ActorId::new(created_by),
        metadata: parse_json_column(metadata, "dependency metadata")?,
    })
}

// ============================================================================
// SECTION: Filter Compilation
// ============================================================================

/// Compiled WHERE fragment with its parameters.
struct SqlFilter {
    /// Conjunction of conditions (no leading WHERE).
    clauses: Vec<String>,
    /// Positional parameters for the conditions.
    params: Vec<SqlValue>,
}

impl SqlFilter {
    /// Renders the WHERE clause, or an always-true fragment.
    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }
}

/// Renders an `IN (?, ?, ...)` placeholder list.
fn placeholders(count: usize) -> String {
    let mut out = String::new();
    for index in 0 .. count {
        if index > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}

/// Compiles the shared element filter into SQL conditions.
fn compile_filter(filter: &ElementFilter) -> SqlFilter {
    let mut clauses = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();
    if let Some(kinds) = &filter.kinds {
        clauses.push(format!("type IN ({})", placeholders(kinds.len())));
        for kind in kinds {
            params.push(SqlValue::Text(kind.as_str().to_string()));
        }
    }
    if let Some(created_by) = &filter.created_by {
        clauses.push("created_by = ?".to_string());
        params.push(SqlValue::Text(created_by.as_str().to_string()));
    }
    if let Some(after) = filter.created_after {
        clauses.push("created_at >= ?".to_string());
        params.push(SqlValue::Integer(after.unix_millis()));
    }
    if let Some(before) = filter.created_before {
        clauses.push("created_at <= ?".to_string());
        params.push(SqlValue::Integer(before.unix_millis()));
    }
    if let Some(after) = filter.updated_after {
        clauses.push("updated_at >= ?".to_string());
        params.push(SqlValue::Integer(after.unix_millis()));
    }
    if let Some(before) = filter.updated_before {
        clauses.push("updated_at <= ?".to_string());
        params.push(SqlValue::Integer(before.unix_millis()));
    }
    if !filter.include_deleted {
        clauses.push("deleted_at IS NULL".to_string());
    }
    for tag in &filter.tags_all {
        clauses.push(
            "EXISTS (SELECT 1 FROM tags t WHERE t.element_id = elements.id AND t.tag = ?)"
                .to_string(),
        );
        params.push(SqlValue::Text(tag.clone()));
    }
    if !filter.tags_any.is_empty() {
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM tags t WHERE t.element_id = elements.id AND t.tag IN ({}))",
            placeholders(filter.tags_any.len())
        ));
        for tag in &filter.tags_any {
            params.push(SqlValue::Text(tag.clone()));
        }
    }
    if let Some(task) = &filter.task {
        if let Some(statuses) = &task.statuses {
            clauses.push(format!(
                "json_extract(data, '$.status') IN ({})",
                placeholders(statuses.len())
            ));
            for status in statuses {
                params.push(SqlValue::Text(status.as_str().to_string()));
            }
        }
        if let Some(priority) = task.priority {
            clauses.push("json_extract(data, '$.priority') = ?".to_string());
            params.push(SqlValue::Integer(i64::from(priority.get())));
        }
        if let Some(complexity) = task.complexity {
            clauses.push("json_extract(data, '$.complexity') = ?".to_string());
            params.push(SqlValue::Integer(i64::from(complexity.get())));
        }
        if let Some(assignee) = &task.assignee {
            clauses.push("json_extract(data, '$.assignee') = ?".to_string());
            params.push(SqlValue::Text(assignee.as_str().to_string()));
        }
        if let Some(owner) = &task.owner {
            clauses.push("json_extract(data, '$.owner') = ?".to_string());
            params.push(SqlValue::Text(owner.as_str().to_string()));
        }
        if let Some(task_types) = &task.task_types {
            clauses.push(format!(
                "json_extract(data, '$.taskType') IN ({})",
                placeholders(task_types.len())
            ));
            for task_type in task_types {
                params.push(SqlValue::Text(task_type.clone()));
            }
        }
        if let Some(has_deadline) = task.has_deadline {
            if has_deadline {
                clauses.push("json_extract(data, '$.deadline') IS NOT NULL".to_string());
            } else {
                clauses.push("json_extract(data, '$.deadline') IS NULL".to_string());
            }
        }
        if let Some(deadline_before) = task.deadline_before {
            clauses.push("json_extract(data, '$.deadline') <= ?".to_string());
            params.push(SqlValue::Integer(deadline_before.unix_millis()));
        }
    }
    SqlFilter { clauses, params }
}

// ============================================================================
// SECTION: Read Helpers
// ============================================================================

/// Element column list shared by every element SELECT.
const ELEMENT_COLUMNS: &str =
    "id, type, data, content_hash, created_at, updated_at, created_by, deleted_at";

/// Runs an element SELECT and reassembles the rows with their tags.
fn read_elements(
    connection: &Connection,
    sql: &str,
    params: Vec<SqlValue>,
) -> Result<Vec<PersistedElement>, SqliteBackendError> {
    let mut statement = connection.prepare(sql).map_err(|err| db_err(&err))?;
    let rows = statement
        .query_map(params_from_iter(params), |row| {
            Ok(RawElementRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                data: row.get(2)?,
                content_hash: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
                created_by: row.get(6)?,
                deleted_at: row.get(7)?,
            })
        })
        .map_err(|err| db_err(&err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| db_err(&err))?;
    let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
    let tags = load_tags(connection, &ids)?;
    let empty = BTreeSet::new();
    rows.into_iter()
        .map(|row| {
            let row_tags = tags.get(&row.id).unwrap_or(&empty);
            compose(row, row_tags)
        })
        .collect()
}

/// Loads the tag sets of the given element ids in chunked queries.
fn load_tags(
    connection: &Connection,
    ids: &[String],
) -> Result<BTreeMap<String, BTreeSet<String>>, SqliteBackendError> {
    let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for chunk in ids.chunks(IN_CLAUSE_CHUNK) {
        let sql = format!(
            "SELECT element_id, tag FROM tags WHERE element_id IN ({})",
            placeholders(chunk.len())
        );
        let mut statement = connection.prepare(&sql).map_err(|err| db_err(&err))?;
        let rows = statement
            .query_map(
                params_from_iter(chunk.iter().map(|id| SqlValue::Text(id.clone()))),
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .map_err(|err| db_err(&err))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| db_err(&err))?;
        for (element_id, tag) in rows {
            out.entry(element_id).or_default().insert(tag);
        }
    }
    Ok(out)
}

/// Runs a dependency SELECT and builds the records.
fn read_dependencies(
    connection: &Connection,
    sql: &str,
    params: Vec<SqlValue>,
) -> Result<Vec<DependencyRecord>, SqliteBackendError> {
    let mut statement = connection.prepare(sql).map_err(|err| db_err(&err))?;
    let rows = statement
        .query_map(params_from_iter(params), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })
        .map_err(|err| db_err(&err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| db_err(&err))?;
    rows.into_iter()
        .map(|(source, target, kind, created_at, created_by, metadata)| {
            compose_dependency(source, target, &kind, created_at, created_by, metadata)
        })
        .collect()
}

/// Appends an optional dependency-kind restriction to a SQL fragment.
fn kind_restriction(kinds: Option<&[DependencyKind]>, params: &mut Vec<SqlValue>) -> String {
    match kinds {
        Some(kinds) if !kinds.is_empty() => {
            for kind in kinds {
                params.push(SqlValue::Text(kind.as_str().to_string()));
            }
            format!(" AND type IN ({})", placeholders(kinds.len()))
        }
        _ => String::new(),
    }
}

// ============================================================================
// SECTION: Write Execution
// ============================================================================

/// Executes one write operation inside the batch transaction.
fn execute_op(tx: &rusqlite::Transaction<'_>, op: &WriteOp) -> Result<(), SqliteBackendError> {
    match op {
        WriteOp::PutElement(persisted) => {
            let (row, tags) = decompose(persisted)?;
            tx.execute(
                "INSERT OR REPLACE INTO elements
                     (id, type, data, content_hash, created_at, updated_at, created_by, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    row.id,
                    row.kind,
                    row.data,
                    row.content_hash,
                    row.created_at,
                    row.updated_at,
                    row.created_by,
                    row.deleted_at,
                ],
            )
            .map_err(|err| db_err(&err))?;
            tx.execute("DELETE FROM tags WHERE element_id = ?1", params![row.id])
                .map_err(|err| db_err(&err))?;
            for tag in tags {
                tx.execute(
                    "INSERT OR IGNORE INTO tags (element_id, tag) VALUES (?1, ?2)",
                    params![row.id, tag],
                )
                .map_err(|err| db_err(&err))?;
            }
        }
        WriteOp::PutDependency(record) => {
            let metadata = record
                .metadata
                .as_ref()
                .map(|value| {
                    serde_json::to_string(value)
                        .map_err(|err| SqliteBackendError::Invalid(err.to_string()))
                })
                .transpose()?;
            tx.execute(
                "INSERT OR REPLACE INTO dependencies
                     (source_id, target_id, type, created_at, created_by, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.source_id.as_str(),
                    record.target_id.as_str(),
                    record.kind.as_str(),
                    record.created_at.unix_millis(),
                    record.created_by.as_str(),
                    metadata,
                ],
            )
            .map_err(|err| db_err(&err))?;
        }
        WriteOp::DeleteDependency {
            source,
            target,
            kind,
        } => {
            tx.execute(
                "DELETE FROM dependencies
                 WHERE source_id = ?1 AND target_id = ?2 AND type = ?3",
                params![source.as_str(), target.as_str(), kind.as_str()],
            )
            .map_err(|err| db_err(&err))?;
        }
        WriteOp::DeleteDependenciesTouching(id) => {
            tx.execute(
                "DELETE FROM dependencies WHERE source_id = ?1 OR target_id = ?1",
                params![id.as_str()],
            )
            .map_err(|err| db_err(&err))?;
        }
        WriteOp::SetDependencyMetadata {
            source,
            target,
            kind,
            metadata,
        } => {
            let metadata = metadata
                .as_ref()
                .map(|value| {
                    serde_json::to_string(value)
                        .map_err(|err| SqliteBackendError::Invalid(err.to_string()))
                })
                .transpose()?;
            tx.execute(
                "UPDATE dependencies SET metadata = ?4
                 WHERE source_id = ?1 AND target_id = ?2 AND type = ?3",
                params![source.as_str(), target.as_str(), kind.as_str(), metadata],
            )
            .map_err(|err| db_err(&err))?;
        }
        WriteOp::AppendEvent(event) => {
            let old_value = event
                .old_value
                .as_ref()
                .map(|value| {
                    serde_json::to_string(value)
                        .map_err(|err| SqliteBackendError::Invalid(err.to_string()))
                })
                .transpose()?;
            let new_value = event
                .new_value
                .as_ref()
                .map(|value| {
                    serde_json::to_string(value)
                        .map_err(|err| SqliteBackendError::Invalid(err.to_string()))
                })
                .transpose()?;
            tx.execute(
                "INSERT INTO events
                     (element_id, event_type, actor, old_value, new_value, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.element_id.as_str(),
                    event.event_type.as_str(),
                    event.actor.as_str(),
                    old_value,
                    new_value,
                    event.created_at.unix_millis(),
                ],
            )
            .map_err(|err| db_err(&err))?;
        }
        WriteOp::PutDocumentVersion(record) => {
            let data = serde_json::to_string(&record.data)
                .map_err(|err| SqliteBackendError::Invalid(err.to_string()))?;
            let version = i64::try_from(record.version)
                .map_err(|err| SqliteBackendError::Invalid(err.to_string()))?;
            tx.execute(
                "INSERT OR REPLACE INTO document_versions
                     (document_id, version, data, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.document_id.as_str(),
                    version,
                    data,
                    record.created_at.unix_millis(),
                ],
            )
            .map_err(|err| db_err(&err))?;
        }
        WriteOp::ReplaceBlockedRows { element_id, rows } => {
            tx.execute(
                "DELETE FROM blocked_cache WHERE element_id = ?1",
                params![element_id.as_str()],
            )
            .map_err(|err| db_err(&err))?;
            for row in rows {
                tx.execute(
                    "INSERT INTO blocked_cache (element_id, blocked_by, reason)
                     VALUES (?1, ?2, ?3)",
                    params![row.element_id.as_str(), row.blocked_by.as_str(), row.reason],
                )
                .map_err(|err| db_err(&err))?;
            }
        }
        WriteOp::ClearBlockedCache => {
            tx.execute("DELETE FROM blocked_cache", params![]).map_err(|err| db_err(&err))?;
        }
        WriteOp::SetRestoreStatus { element_id, status } => {
            tx.execute(
                "INSERT OR REPLACE INTO blocked_restore (element_id, status) VALUES (?1, ?2)",
                params![element_id.as_str(), status.as_str()],
            )
            .map_err(|err| db_err(&err))?;
        }
        WriteOp::ClearRestoreStatus(element_id) => {
            tx.execute(
                "DELETE FROM blocked_restore WHERE element_id = ?1",
                params![element_id.as_str()],
            )
            .map_err(|err| db_err(&err))?;
        }
        WriteOp::MarkDirty(element_id) => {
            tx.execute(
                "INSERT OR REPLACE INTO dirty_elements (element_id, marked_at)
                 VALUES (?1, CAST(strftime('%s', 'now') AS INTEGER) * 1000)",
                params![element_id.as_str()],
            )
            .map_err(|err| db_err(&err))?;
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: StorageBackend Implementation
// ============================================================================

impl StorageBackend for SqliteBackend {
    fn element(&self, id: &ElementId) -> Result<Option<PersistedElement>, BackendError> {
        self.with_conn(|connection| {
            let sql =
                format!("SELECT {ELEMENT_COLUMNS} FROM elements WHERE id = ?");
            let rows = read_elements(
                connection,
                &sql,
                vec![SqlValue::Text(id.as_str().to_string())],
            )?;
            Ok(rows.into_iter().next())
        })
    }

    fn elements(&self, ids: &[ElementId]) -> Result<Vec<PersistedElement>, BackendError> {
        self.with_conn(|connection| {
            let mut out = Vec::with_capacity(ids.len());
            for chunk in ids.chunks(IN_CLAUSE_CHUNK) {
                let sql = format!(
                    "SELECT {ELEMENT_COLUMNS} FROM elements WHERE id IN ({})",
                    placeholders(chunk.len())
                );
                let params = chunk
                    .iter()
                    .map(|id| SqlValue::Text(id.as_str().to_string()))
                    .collect();
                out.extend(read_elements(connection, &sql, params)?);
            }
            Ok(out)
        })
    }

    fn list(&self, filter: &ElementFilter) -> Result<Vec<PersistedElement>, BackendError> {
        self.with_conn(|connection| {
            let compiled = compile_filter(filter);
            let sql = format!(
                "SELECT {ELEMENT_COLUMNS} FROM elements WHERE {}
                 ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                compiled.where_sql()
            );
            let mut params = compiled.params;
            params.push(SqlValue::Integer(
                i64::try_from(filter.effective_limit()).unwrap_or(i64::MAX),
            ));
            params.push(SqlValue::Integer(
                i64::try_from(filter.effective_offset()).unwrap_or(i64::MAX),
            ));
            read_elements(connection, &sql, params)
        })
    }

    fn element_ids(&self, include_deleted: bool) -> Result<Vec<ElementId>, BackendError> {
        self.with_conn(|connection| {
            let sql = if include_deleted {
                "SELECT id FROM elements ORDER BY created_at ASC, id ASC"
            } else {
                "SELECT id FROM elements WHERE deleted_at IS NULL
                 ORDER BY created_at ASC, id ASC"
            };
            let mut statement = connection.prepare(sql).map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map(params![], |row| row.get::<_, String>(0))
                .map_err(|err| db_err(&err))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| db_err(&err))?;
            Ok(rows.into_iter().map(ElementId::new).collect())
        })
    }

    fn count(&self, filter: &ElementFilter) -> Result<u64, BackendError> {
        self.with_conn(|connection| {
            let compiled = compile_filter(filter);
            let sql = format!(
                "SELECT COUNT(*) FROM elements WHERE {}",
                compiled.where_sql()
            );
            let count: i64 = connection
                .query_row(&sql, params_from_iter(compiled.params), |row| row.get(0))
                .map_err(|err| db_err(&err))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }

    fn search(
        &self,
        query: &str,
        filter: &ElementFilter,
        limit: usize,
    ) -> Result<Vec<PersistedElement>, BackendError> {
        self.with_conn(|connection| {
            let compiled = compile_filter(filter);
            let sql = format!(
                "SELECT {ELEMENT_COLUMNS} FROM elements WHERE {}
                 AND (
                     instr(lower(COALESCE(json_extract(data, '$.title'), '')), ?) > 0
                     OR instr(lower(COALESCE(json_extract(data, '$.content'), '')), ?) > 0
                     OR instr(lower(COALESCE(json_extract(data, '$.name'), '')), ?) > 0
                     OR EXISTS (
                         SELECT 1 FROM tags t
                         WHERE t.element_id = elements.id AND instr(lower(t.tag), ?) > 0
                     )
                 )
                 ORDER BY updated_at DESC, id DESC LIMIT ?",
                compiled.where_sql()
            );
            let needle = query.to_lowercase();
            let mut params = compiled.params;
            for _ in 0 .. 4 {
                params.push(SqlValue::Text(needle.clone()));
            }
            params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
            read_elements(connection, &sql, params)
        })
    }

    fn find_entity_by_name(&self, name: &str) -> Result<Option<PersistedElement>, BackendError> {
        self.with_conn(|connection| {
            let sql = format!(
                "SELECT {ELEMENT_COLUMNS} FROM elements
                 WHERE type = 'entity' AND deleted_at IS NULL
                   AND json_extract(data, '$.name') = ?"
            );
            let rows = read_elements(
                connection,
                &sql,
                vec![SqlValue::Text(name.to_string())],
            )?;
            Ok(rows.into_iter().next())
        })
    }

    fn find_channel_by_name(
        &self,
        kind: ChannelKind,
        name: &str,
        visibility: Option<Visibility>,
    ) -> Result<Option<PersistedElement>, BackendError> {
        self.with_conn(|connection| {
            let mut sql = format!(
                "SELECT {ELEMENT_COLUMNS} FROM elements
                 WHERE type = 'channel' AND deleted_at IS NULL
                   AND json_extract(data, '$.channelType') = ?
                   AND json_extract(data, '$.name') = ?"
            );
            let mut params = vec![
                SqlValue::Text(kind.to_string()),
                SqlValue::Text(name.to_string()),
            ];
            if let Some(visibility) = visibility {
                sql.push_str(" AND json_extract(data, '$.permissions.visibility') = ?");
                params.push(SqlValue::Text(visibility.as_str().to_string()));
            }
            let rows = read_elements(connection, &sql, params)?;
            Ok(rows.into_iter().next())
        })
    }

    fn dependencies_of(
        &self,
        id: &ElementId,
        kinds: Option<&[DependencyKind]>,
    ) -> Result<Vec<DependencyRecord>, BackendError> {
        self.with_conn(|connection| {
            let mut params = vec![SqlValue::Text(id.as_str().to_string())];
            let restriction = kind_restriction(kinds, &mut params);
            let sql = format!(
                "SELECT source_id, target_id, type, created_at, created_by, metadata
                 FROM dependencies WHERE source_id = ?{restriction}
                 ORDER BY target_id, type"
            );
            read_dependencies(connection, &sql, params)
        })
    }

    fn dependents_of(
        &self,
        id: &ElementId,
        kinds: Option<&[DependencyKind]>,
    ) -> Result<Vec<DependencyRecord>, BackendError> {
        self.with_conn(|connection| {
            let mut params = vec![SqlValue::Text(id.as_str().to_string())];
            let restriction = kind_restriction(kinds, &mut params);
            let sql = format!(
                "SELECT source_id, target_id, type, created_at, created_by, metadata
                 FROM dependencies WHERE target_id = ?{restriction}
                 ORDER BY source_id, type"
            );
            read_dependencies(connection, &sql, params)
        })
    }

    fn dependency(
        &self,
        source: &ElementId,
        target: &ElementId,
        kind: DependencyKind,
    ) -> Result<Option<DependencyRecord>, BackendError> {
        self.with_conn(|connection| {
            let sql = "SELECT source_id, target_id, type, created_at, created_by, metadata
                       FROM dependencies
                       WHERE source_id = ? AND target_id = ? AND type = ?";
            let rows = read_dependencies(
                connection,
                sql,
                vec![
                    SqlValue::Text(source.as_str().to_string()),
                    SqlValue::Text(target.as_str().to_string()),
                    SqlValue::Text(kind.as_str().to_string()),
                ],
            )?;
            Ok(rows.into_iter().next())
        })
    }

    fn all_dependencies(&self) -> Result<Vec<DependencyRecord>, BackendError> {
        self.with_conn(|connection| {
            read_dependencies(
                connection,
                "SELECT source_id, target_id, type, created_at, created_by, metadata
                 FROM dependencies ORDER BY source_id, target_id, type",
                Vec::new(),
            )
        })
    }

    fn events(
        &self,
        id: &ElementId,
        filter: &EventFilter,
    ) -> Result<Vec<EventRecord>, BackendError> {
        self.with_conn(|connection| {
            let mut sql = String::from(
                "SELECT id, element_id, event_type, actor, old_value, new_value, created_at
                 FROM events WHERE element_id = ?",
            );
            let mut params = vec![SqlValue::Text(id.as_str().to_string())];
            if let Some(event_types) = &filter.event_types {
                sql.push_str(&format!(
                    " AND event_type IN ({})",
                    placeholders(event_types.len())
                ));
                for event_type in event_types {
                    params.push(SqlValue::Text(event_type.as_str().to_string()));
                }
            }
            if let Some(actor) = &filter.actor {
                sql.push_str(" AND actor = ?");
                params.push(SqlValue::Text(actor.as_str().to_string()));
            }
            if let Some(since) = filter.since {
                sql.push_str(" AND created_at >= ?");
                params.push(SqlValue::Integer(since.unix_millis()));
            }
            if let Some(until) = filter.until {
                sql.push_str(" AND created_at <= ?");
                params.push(SqlValue::Integer(until.unix_millis()));
            }
            sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");
            params.push(SqlValue::Integer(
                filter.limit.map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX)),
            ));
            let mut statement = connection.prepare(&sql).map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map(params_from_iter(params), |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                })
                .map_err(|err| db_err(&err))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| db_err(&err))?;
            rows.into_iter()
                .map(
                    |(event_id, element_id, event_type, actor, old_value, new_value, at)| {
                        Ok(EventRecord {
                            id: event_id,
                            element_id: ElementId::new(element_id),
                            event_type: label_to::<EventKind>(&event_type, "event kind")?,
                            actor: ActorId::new(actor),
                            old_value: parse_json_column(old_value, "event old value")?,
                            new_value: parse_json_column(new_value, "event new value")?,
                            created_at: Timestamp::from_unix_millis(at),
                        })
                    },
                )
                .collect::<Result<Vec<_>, SqliteBackendError>>()
        })
    }

    fn event_count(&self) -> Result<u64, BackendError> {
        self.with_conn(|connection| {
            let count: i64 = connection
                .query_row("SELECT COUNT(*) FROM events", params![], |row| row.get(0))
                .map_err(|err| db_err(&err))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }

    fn blocked_rows(&self, id: &ElementId) -> Result<Vec<BlockedRow>, BackendError> {
        self.with_conn(|connection| {
            read_blocked(
                connection,
                "SELECT element_id, blocked_by, reason FROM blocked_cache
                 WHERE element_id = ? ORDER BY blocked_by, reason",
                vec![SqlValue::Text(id.as_str().to_string())],
            )
        })
    }

    fn blocked_rows_by_blocker(
        &self,
        blocker: &ElementId,
    ) -> Result<Vec<BlockedRow>, BackendError> {
        self.with_conn(|connection| {
            read_blocked(
                connection,
                "SELECT element_id, blocked_by, reason FROM blocked_cache
                 WHERE blocked_by = ? ORDER BY element_id, reason",
                vec![SqlValue::Text(blocker.as_str().to_string())],
            )
        })
    }

    fn all_blocked_rows(&self) -> Result<Vec<BlockedRow>, BackendError> {
        self.with_conn(|connection| {
            read_blocked(
                connection,
                "SELECT element_id, blocked_by, reason FROM blocked_cache
                 ORDER BY element_id, blocked_by, reason",
                Vec::new(),
            )
        })
    }

    fn restore_status(&self, id: &ElementId) -> Result<Option<TaskStatus>, BackendError> {
        self.with_conn(|connection| {
            let status: Option<String> = connection
                .query_row(
                    "SELECT status FROM blocked_restore WHERE element_id = ?1",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_err(&err))?;
            status
                .map(|status| label_to::<TaskStatus>(&status, "restore status"))
                .transpose()
        })
    }

    fn document_version(
        &self,
        id: &ElementId,
        version: u64,
    ) -> Result<Option<DocumentVersionRecord>, BackendError> {
        self.with_conn(|connection| {
            let version_i64 = i64::try_from(version)
                .map_err(|err| SqliteBackendError::Invalid(err.to_string()))?;
            let row: Option<(String, i64)> = connection
                .query_row(
                    "SELECT data, created_at FROM document_versions
                     WHERE document_id = ?1 AND version = ?2",
                    params![id.as_str(), version_i64],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|err| db_err(&err))?;
            row.map(|(data, created_at)| {
                Ok(DocumentVersionRecord {
                    document_id: id.clone(),
                    version,
                    data: serde_json::from_str(&data).map_err(|err| {
                        SqliteBackendError::Corrupt(format!("document version data: {err}"))
                    })?,
                    created_at: Timestamp::from_unix_millis(created_at),
                })
            })
            .transpose()
        })
    }

    fn document_versions(
        &self,
        id: &ElementId,
    ) -> Result<Vec<DocumentVersionRecord>, BackendError> {
        self.with_conn(|connection| {
            let mut statement = connection
                .prepare(
                    "SELECT version, data, created_at FROM document_versions
                     WHERE document_id = ?1 ORDER BY version DESC",
                )
                .map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map(params![id.as_str()], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .map_err(|err| db_err(&err))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| db_err(&err))?;
            rows.into_iter()
                .map(|(version, data, created_at)| {
                    Ok(DocumentVersionRecord {
                        document_id: id.clone(),
                        version: u64::try_from(version).unwrap_or(0),
                        data: serde_json::from_str(&data).map_err(|err| {
                            SqliteBackendError::Corrupt(format!("document version data: {err}"))
                        })?,
                        created_at: Timestamp::from_unix_millis(created_at),
                    })
                })
                .collect::<Result<Vec<_>, SqliteBackendError>>()
        })
    }

    fn apply(&self, ops: &[WriteOp]) -> Result<(), BackendError> {
        self.with_tx(|tx| {
            for op in ops {
                execute_op(tx, op)?;
            }
            Ok(())
        })
    }

    fn next_child_number(&self, parent: &ElementId) -> Result<u64, BackendError> {
        self.with_tx(|tx| {
            let current: Option<i64> = tx
                .query_row(
                    "SELECT next_child FROM child_counters WHERE parent_id = ?1",
                    params![parent.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_err(&err))?;
            let ordinal = current.unwrap_or(1);
            tx.execute(
                "INSERT OR REPLACE INTO child_counters (parent_id, next_child)
                 VALUES (?1, ?2)",
                params![parent.as_str(), ordinal + 1],
            )
            .map_err(|err| db_err(&err))?;
            Ok(u64::try_from(ordinal).unwrap_or(1))
        })
    }

    fn dirty_elements(&self) -> Result<Vec<ElementId>, BackendError> {
        self.with_conn(|connection| {
            let mut statement = connection
                .prepare(
                    "SELECT element_id FROM dirty_elements ORDER BY marked_at, element_id",
                )
                .map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map(params![], |row| row.get::<_, String>(0))
                .map_err(|err| db_err(&err))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| db_err(&err))?;
            Ok(rows.into_iter().map(ElementId::new).collect())
        })
    }

    fn clear_dirty(&self, ids: &[ElementId]) -> Result<(), BackendError> {
        self.with_tx(|tx| {
            for chunk in ids.chunks(IN_CLAUSE_CHUNK) {
                let sql = format!(
                    "DELETE FROM dirty_elements WHERE element_id IN ({})",
                    placeholders(chunk.len())
                );
                tx.execute(
                    &sql,
                    params_from_iter(
                        chunk.iter().map(|id| SqlValue::Text(id.as_str().to_string())),
                    ),
                )
                .map_err(|err| db_err(&err))?;
            }
            Ok(())
        })
    }

    fn stats(&self) -> Result<BackendStats, BackendError> {
        let file_size = fs::metadata(&self.config.path).map(|meta| meta.len()).unwrap_or(0);
        Ok(BackendStats { file_size })
    }

    fn is_open(&self) -> bool {
        self.guard().is_ok_and(|guard| guard.is_some())
    }

    fn close(&self) -> Result<(), BackendError> {
        let mut guard = self.guard()?;
        if let Some(connection) = guard.take() {
            connection
                .close()
                .map_err(|(_, err)| BackendError::Db(err.to_string()))?;
        }
        Ok(())
    }
}

/// Runs a blocked-cache SELECT and builds the rows.
fn read_blocked(
    connection: &Connection,
    sql: &str,
    params: Vec<SqlValue>,
) -> Result<Vec<BlockedRow>, SqliteBackendError> {
    let mut statement = connection.prepare(sql).map_err(|err| db_err(&err))?;
    let rows = statement
        .query_map(params_from_iter(params), |row| {
            Ok(BlockedRow {
                element_id: ElementId::new(row.get::<_, String>(0)?),
                blocked_by: ElementId::new(row.get::<_, String>(1)?),
                reason: row.get(2)?,
            })
        })
        .map_err(|err| db_err(&err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| db_err(&err))?;
    Ok(rows)
}
