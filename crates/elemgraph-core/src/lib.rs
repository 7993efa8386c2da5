// crates/elemgraph-core/src/lib.rs
// ============================================================================
// Module: Elemgraph Core Library
// Description: Public API surface for the element graph engine.
// Purpose: Expose core types, collaborator interfaces, and the runtime.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Elemgraph is a typed, event-sourced, single-process element store: a
//! closed set of element kinds over a relational backing table, a derived
//! blocked-state index, content hashing for conflict-free merge, and
//! last-writer-wins import/export over a line-delimited interchange format.
//! It is backend-agnostic and integrates through explicit interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::core::*;

pub use interfaces::BackendError;
pub use interfaces::BackendStats;
pub use interfaces::Clock;
pub use interfaces::DocumentVersionRecord;
pub use interfaces::ManualClock;
pub use interfaces::PersistedElement;
pub use interfaces::PlaybookError;
pub use interfaces::PlaybookLoader;
pub use interfaces::SignatureVerifier;
pub use interfaces::StorageBackend;
pub use interfaces::SystemClock;
pub use interfaces::WriteOp;
pub use runtime::AutoTransition;
pub use runtime::BlockedTask;
pub use runtime::BulkOutcome;
pub use runtime::BulkTaskError;
pub use runtime::ConflictResolution;
pub use runtime::DeleteOptions;
pub use runtime::DependencyTree;
pub use runtime::DirectMessageInput;
pub use runtime::DirectMessageOutcome;
pub use runtime::ElementEngine;
pub use runtime::ElementSummary;
pub use runtime::EngineConfig;
pub use runtime::EngineStats;
pub use runtime::ExportOptions;
pub use runtime::FetchedElement;
pub use runtime::GateResolution;
pub use runtime::GetOptions;
pub use runtime::ImportConflict;
pub use runtime::ImportError;
pub use runtime::ImportOptions;
pub use runtime::ImportReport;
pub use runtime::MergeStrategy;
pub use runtime::MutateOptions;
pub use runtime::PlanProgress;
pub use runtime::PourOutcome;
pub use runtime::PourRequest;
pub use runtime::RebuildReport;
pub use runtime::RotationProof;
pub use runtime::compute_workflow_status;
pub use runtime::rotation_message;
