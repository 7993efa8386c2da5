// crates/elemgraph-core/src/runtime/mod.rs
// ============================================================================
// Module: Elemgraph Runtime
// Description: Element engine, blocked cache, sync, pour, and identity.
// Purpose: Execute mutations and derived-state maintenance over a backend.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime hosts the element engine and its service layers. All API
//! surfaces must call into these methods to preserve the transaction and
//! event-ordering guarantees.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod blocked;
pub mod channels;
pub mod engine;
pub mod identity;
pub mod plans;
pub mod pour;
pub mod sync;
pub mod workflow;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use blocked::AutoTransition;
pub use blocked::GateResolution;
pub use blocked::RebuildReport;
pub use channels::DirectMessageInput;
pub use channels::DirectMessageOutcome;
pub use engine::BlockedTask;
pub use engine::DeleteOptions;
pub use engine::DependencyTree;
pub use engine::ElementEngine;
pub use engine::ElementSummary;
pub use engine::EngineConfig;
pub use engine::EngineStats;
pub use engine::FetchedElement;
pub use engine::GetOptions;
pub use engine::MutateOptions;
pub use engine::TreeEdge;
pub use engine::TreeNode;
pub use identity::RotationProof;
pub use identity::rotation_message;
pub use plans::BulkOutcome;
pub use plans::BulkTaskError;
pub use plans::PlanProgress;
pub use pour::PourOutcome;
pub use pour::PourRequest;
pub use pour::evaluate_condition;
pub use pour::resolve_playbook;
pub use pour::resolve_variables;
pub use pour::substitute;
pub use sync::ConflictResolution;
pub use sync::ExportOptions;
pub use sync::ImportConflict;
pub use sync::ImportError;
pub use sync::ImportOptions;
pub use sync::ImportReport;
pub use sync::MergeStrategy;
pub use workflow::compute_workflow_status;
