// crates/elemgraph-core/src/core/playbook.rs
// ============================================================================
// Module: Elemgraph Playbook Model
// Description: Workflow templates with variables, steps, and inheritance.
// Purpose: Provide the template shape poured into workflows and tasks.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A playbook is a template carrying a variable schema and an ordered step
//! list. Steps may depend on earlier steps, carry a condition expression
//! evaluated against the resolved variables, and template their title and
//! assignee. A playbook may extend a parent; the runtime resolves
//! inheritance recursively, parent steps first, child steps overriding by
//! step id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::element::Complexity;
use crate::core::element::Priority;
use crate::core::identifiers::PlaybookId;

// ============================================================================
// SECTION: Variable Schema
// ============================================================================

/// Declaration of a single playbook variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VariableSpec {
    /// The variable must be supplied or defaulted for pouring to proceed.
    #[serde(default)]
    pub required: bool,
    /// Default value used when the caller supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// SECTION: Steps
// ============================================================================

/// One templated step of a playbook.
///
/// # Invariants
/// - `id` is unique within the resolved playbook.
/// - `depends_on` references step ids, not element ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookStep {
    /// Step identifier, unique within the playbook.
    pub id: String,
    /// Title template; `{{name}}` placeholders substitute variables.
    pub title: String,
    /// Description template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Step ids this step is blocked behind.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Condition expression deciding whether the step is poured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Assignee template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Priority default for the poured task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Complexity default for the poured task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
    /// Task-type default for the poured task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
}

// ============================================================================
// SECTION: Playbook
// ============================================================================

/// A workflow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playbook {
    /// Playbook identifier.
    pub id: PlaybookId,
    /// Title template for the poured workflow.
    pub title: String,
    /// Parent playbook resolved before this one, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<PlaybookId>,
    /// Variable schema merged over the parent's.
    #[serde(default)]
    pub variables: BTreeMap<String, VariableSpec>,
    /// Ordered step list; overrides parent steps by id.
    #[serde(default)]
    pub steps: Vec<PlaybookStep>,
}
