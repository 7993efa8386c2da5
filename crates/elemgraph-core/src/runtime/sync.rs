// crates/elemgraph-core/src/runtime/sync.rs
// ============================================================================
// Module: Elemgraph Sync
// Description: Line-delimited export/import with last-writer-wins merge.
// Purpose: Move committed state between stores with conflict provenance.
// Dependencies: crate::{core, interfaces, runtime}, serde_json
// ============================================================================

//! ## Overview
//! The interchange format is one JSON record per line: element records carry
//! an `id` and `type`; dependency records carry `sourceId` and `targetId`.
//! Export emits elements (tombstones included, so deletions propagate) and
//! then dependencies. Import replays records under a merge strategy; the
//! default keeps the record with the strictly larger `updatedAt` and records
//! a conflict with hash provenance for every identifier collision. Invalid
//! lines are collected as errors; one bad line does not abort the import.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::ContentHash;
use crate::core::DependencyKind;
use crate::core::DependencyRecord;
use crate::core::Element;
use crate::core::ElementId;
use crate::core::EngineError;
use crate::core::GateSpec;
use crate::interfaces::PersistedElement;
use crate::interfaces::StorageBackend;
use crate::interfaces::WriteOp;
use crate::runtime::engine::ElementEngine;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Longest invalid-line excerpt kept in an import error.
const ERROR_CONTENT_EXCERPT_CHARS: usize = 200;
/// Batch size for hydrating elements during export.
const EXPORT_CHUNK: usize = 200;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Options controlling an export.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Write to this path instead of returning the text.
    pub path: Option<PathBuf>,
    /// Suppress dependency records entirely.
    pub skip_dependencies: bool,
    /// Exclude ephemeral workflows (and edges touching them).
    pub exclude_ephemeral: bool,
}

/// Merge strategy applied per incoming element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Keep the record with the strictly larger `updatedAt`.
    #[default]
    LastWriterWins,
    /// Unconditionally replace local records.
    Overwrite,
}

/// Options controlling an import.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Merge strategy; last-writer-wins by default.
    pub strategy: MergeStrategy,
    /// Run the full pipeline but write nothing.
    pub dry_run: bool,
    /// Source label recorded on per-line errors.
    pub source_label: Option<String>,
}

// ============================================================================
// SECTION: Report Shapes
// ============================================================================

/// How an identifier collision was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// The local record was kept.
    KeptLocal,
    /// The incoming record replaced the local one.
    Replaced,
}

/// One recorded merge collision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportConflict {
    /// Colliding element identifier.
    pub id: ElementId,
    /// Resolution applied.
    pub resolution: ConflictResolution,
    /// Content hash of the local record at merge time.
    pub local_hash: ContentHash,
    /// Content hash of the incoming record.
    pub remote_hash: ContentHash,
}

/// One rejected input line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportError {
    /// 1-based line number.
    pub line: usize,
    /// Source file label, when importing from a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// What was wrong with the line.
    pub message: String,
    /// Truncated excerpt of the offending content.
    pub content: String,
}

/// Result of an import run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// True when no line produced an error.
    pub success: bool,
    /// Elements inserted or replaced.
    pub elements_imported: u64,
    /// Dependency edges upserted.
    pub dependencies_imported: u64,
    /// Always zero; the event log is never imported.
    pub events_imported: u64,
    /// Identifier collisions and their resolutions.
    pub conflicts: Vec<ImportConflict>,
    /// Rejected lines.
    pub errors: Vec<ImportError>,
    /// Whether this run wrote nothing.
    pub dry_run: bool,
}

// ============================================================================
// SECTION: Export
// ============================================================================

impl<B: StorageBackend> ElementEngine<B> {
    /// Exports committed state as line-delimited JSON: elements first, then
    /// dependencies. Returns the text, or `None` when written to a path.
    ///
    /// The export never includes the event log or blocked-cache rows.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on backend or file failure.
    pub fn export(&self, options: &ExportOptions) -> Result<Option<String>, EngineError> {
        let ids = self.backend().element_ids(true)?;
        let mut excluded: BTreeSet<ElementId> = BTreeSet::new();
        let mut lines: Vec<String> = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(EXPORT_CHUNK) {
            for persisted in self.backend().elements(chunk)? {
                if options.exclude_ephemeral
                    && let Element::Workflow(workflow) = &persisted.element
                    && workflow.ephemeral
                {
                    excluded.insert(workflow.core.id.clone());
                    continue;
                }
                lines.push(to_json_line(&persisted.element)?);
            }
        }
        if !options.skip_dependencies {
            for edge in self.backend().all_dependencies()? {
                if excluded.contains(&edge.source_id) || excluded.contains(&edge.target_id) {
                    continue;
                }
                lines.push(to_json_line(&edge)?);
            }
        }
        let mut text = lines.join("\n");
        text.push('\n');
        match &options.path {
            Some(path) => {
                fs::write(path, text.as_bytes()).map_err(|err| EngineError::Io {
                    message: format!("failed to write export to {}: {err}", path.display()),
                })?;
                Ok(None)
            }
            None => Ok(Some(text)),
        }
    }

    // ------------------------------------------------------------------
    // Import
    // ------------------------------------------------------------------

    /// Imports line-delimited records from a file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] when the file cannot be read; per-line
    /// failures land in the report instead.
    pub fn import_file(
        &self,
        path: &Path,
        options: &ImportOptions,
    ) -> Result<ImportReport, EngineError> {
        let text = fs::read_to_string(path).map_err(|err| EngineError::Io {
            message: format!("failed to read import from {}: {err}", path.display()),
        })?;
        let mut options = options.clone();
        if options.source_label.is_none() {
            options.source_label = Some(path.display().to_string());
        }
        self.import_str(&text, &options)
    }

    /// Imports line-delimited records from text.
    ///
    /// Blank lines are ignored. Records with `sourceId` and `targetId` are
    /// dependencies; records with `id` are elements; everything else is an
    /// error. The import succeeds overall iff zero errors were collected.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only on backend failure; malformed lines are
    /// reported, not raised.
    pub fn import_str(
        &self,
        text: &str,
        options: &ImportOptions,
    ) -> Result<ImportReport, EngineError> {
        let mut report = ImportReport {
            success: false,
            elements_imported: 0,
            dependencies_imported: 0,
            events_imported: 0,
            conflicts: Vec::new(),
            errors: Vec::new(),
            dry_run: options.dry_run,
        };
        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let value: Value = match serde_json::from_str(trimmed) {
                Ok(value) => value,
                Err(err) => {
                    push_error(&mut report, options, line_no, trimmed, &format!("invalid json: {err}"));
                    continue;
                }
            };
            let Some(fields) = value.as_object() else {
                push_error(&mut report, options, line_no, trimmed, "record is not an object");
                continue;
            };
            if fields.contains_key("sourceId") && fields.contains_key("targetId") {
                if let Err(message) = self.import_dependency(&value, options, &mut report) {
                    push_error(&mut report, options, line_no, trimmed, &message);
                }
            } else if fields.contains_key("id") {
                if let Err(message) = self.import_element(&value, options, &mut report)? {
                    push_error(&mut report, options, line_no, trimmed, &message);
                }
            } else {
                push_error(
                    &mut report,
                    options,
                    line_no,
                    trimmed,
                    "record carries neither an element id nor a dependency pair",
                );
            }
        }
        if !options.dry_run
            && (report.elements_imported > 0 || report.dependencies_imported > 0)
        {
            self.rebuild_blocked_cache()?;
        }
        report.success = report.errors.is_empty();
        Ok(report)
    }

    /// Merges one incoming element record.
    ///
    /// Returns `Ok(Err(message))` for per-line validation failures and
    /// propagates backend failures.
    #[allow(clippy::type_complexity, reason = "inner Err is a per-line report message")]
    fn import_element(
        &self,
        value: &Value,
        options: &ImportOptions,
        report: &mut ImportReport,
    ) -> Result<Result<(), String>, EngineError> {
        let element: Element = match serde_json::from_value(value.clone()) {
            Ok(element) => element,
            Err(err) => return Ok(Err(format!("invalid element record: {err}"))),
        };
        if ElementId::parse(element.id().as_str()).is_err() {
            return Ok(Err(format!("invalid element identifier: {}", element.id())));
        }
        let incoming = match PersistedElement::from_element(element) {
            Ok(persisted) => persisted,
            Err(err) => return Ok(Err(format!("unhashable element record: {err}"))),
        };
        let id = incoming.element.id().clone();
        let local = self.backend().element(&id)?;
        let write = match (&local, options.strategy) {
            (None, _) | (Some(_), MergeStrategy::Overwrite) => true,
            (Some(local_row), MergeStrategy::LastWriterWins) => {
                let replace = incoming.element.core().updated_at
                    > local_row.element.core().updated_at;
                report.conflicts.push(ImportConflict {
                    id: id.clone(),
                    resolution: if replace {
                        ConflictResolution::Replaced
                    } else {
                        ConflictResolution::KeptLocal
                    },
                    local_hash: local_row.content_hash.clone(),
                    remote_hash: incoming.content_hash.clone(),
                });
                replace
            }
        };
        if write {
            report.elements_imported += 1;
            if !options.dry_run {
                self.backend()
                    .apply(&[WriteOp::PutElement(Box::new(incoming)), WriteOp::MarkDirty(id)])?;
            }
        }
        Ok(Ok(()))
    }

    /// Upserts one incoming dependency record.
    fn import_dependency(
        &self,
        value: &Value,
        options: &ImportOptions,
        report: &mut ImportReport,
    ) -> Result<(), String> {
        let record: DependencyRecord = serde_json::from_value(value.clone())
            .map_err(|err| format!("invalid dependency record: {err}"))?;
        if record.kind == DependencyKind::Gate {
            let metadata = record
                .metadata
                .as_ref()
                .ok_or_else(|| "gate dependency is missing approval metadata".to_string())?;
            GateSpec::from_metadata(metadata).map_err(|err| err.to_string())?;
        }
        report.dependencies_imported += 1;
        if !options.dry_run {
            self.backend()
                .apply(&[WriteOp::PutDependency(record)])
                .map_err(|err| err.to_string())?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Free Helpers
// ============================================================================

/// Serializes a record to one JSON line.
fn to_json_line<T: Serialize>(record: &T) -> Result<String, EngineError> {
    serde_json::to_string(record).map_err(|err| EngineError::InvalidInput {
        message: format!("failed to serialize export record: {err}"),
    })
}

/// Records a per-line import error with a truncated content excerpt.
fn push_error(
    report: &mut ImportReport,
    options: &ImportOptions,
    line: usize,
    content: &str,
    message: &str,
) {
    report.errors.push(ImportError {
        line,
        file: options.source_label.clone(),
        message: message.to_string(),
        content: content.chars().take(ERROR_CONTENT_EXCERPT_CHARS).collect(),
    });
}
