// crates/elemgraph-core/src/core/mod.rs
// ============================================================================
// Module: Elemgraph Core Types
// Description: Canonical element, dependency, event, and filter structures.
// Purpose: Provide stable, serializable types for the element graph engine.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Core types define the closed element sum, dependency edges, the event
//! log shape, content hashing, and the query filter surface. These types are
//! the canonical source of truth for any derived API surfaces.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod dependency;
pub mod element;
pub mod errors;
pub mod event;
pub mod filter;
pub mod hashing;
pub mod identifiers;
pub mod playbook;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dependency::BlockedRow;
pub use dependency::DependencyKind;
pub use dependency::DependencyRecord;
pub use dependency::GateQuorum;
pub use dependency::GateSpec;
pub use element::Attachment;
pub use element::Channel;
pub use element::ChannelKind;
pub use element::ChannelPatch;
pub use element::ChannelPermissions;
pub use element::Complexity;
pub use element::Document;
pub use element::DocumentPatch;
pub use element::Element;
pub use element::ElementCore;
pub use element::ElementKind;
pub use element::ElementPatch;
pub use element::Entity;
pub use element::EntityClass;
pub use element::EntityPatch;
pub use element::FieldsPatch;
pub use element::Library;
pub use element::LibraryPatch;
pub use element::MemberPolicy;
pub use element::Message;
pub use element::NewChannel;
pub use element::NewDocument;
pub use element::NewElement;
pub use element::NewEntity;
pub use element::NewLibrary;
pub use element::NewMessage;
pub use element::NewPlan;
pub use element::NewTask;
pub use element::NewWorkflow;
pub use element::Plan;
pub use element::PlanPatch;
pub use element::PlanStatus;
pub use element::Priority;
pub use element::Task;
pub use element::TaskPatch;
pub use element::TaskStatus;
pub use element::Visibility;
pub use element::Workflow;
pub use element::WorkflowPatch;
pub use element::WorkflowStatus;
pub use element::build_element;
pub use element::direct_channel_name;
pub use errors::EngineError;
pub use event::EventFilter;
pub use event::EventKind;
pub use event::EventRecord;
pub use event::NewEvent;
pub use event::compute_changed_fields;
pub use filter::DEFAULT_LIST_LIMIT;
pub use filter::ElementFilter;
pub use filter::MAX_LIST_LIMIT;
pub use filter::MAX_TRAVERSAL_DEPTH;
pub use filter::Page;
pub use filter::SEARCH_RESULT_LIMIT;
pub use filter::TaskFilter;
pub use hashing::ContentHash;
pub use hashing::HashError;
pub use identifiers::ActorId;
pub use identifiers::BLOCKED_CACHE_ACTOR;
pub use identifiers::ElementId;
pub use identifiers::PlaybookId;
pub use identifiers::WORKFLOW_ACTOR;
pub use playbook::Playbook;
pub use playbook::PlaybookStep;
pub use playbook::VariableSpec;
pub use time::Timestamp;
