// crates/elemgraph-core/src/core/filter.rs
// ============================================================================
// Module: Elemgraph List Filters
// Description: Filter and pagination records for element queries.
// Purpose: Express list, search, and task-specific query surfaces.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Filters narrow element listings by kind, creator, instant windows, tag
//! conjunction/disjunction, and task-specific fields. Listings default to
//! `created_at` descending with a limit of 50, capped at 500; limits above
//! the cap clamp silently. Search results are capped at 100 rows ordered by
//! `updated_at` descending.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::element::Complexity;
use crate::core::element::ElementKind;
use crate::core::element::Priority;
use crate::core::element::TaskStatus;
use crate::core::identifiers::ActorId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of rows returned by a listing.
pub const DEFAULT_LIST_LIMIT: usize = 50;
/// Hard cap on rows returned by a listing.
pub const MAX_LIST_LIMIT: usize = 500;
/// Hard cap on rows returned by a search.
pub const SEARCH_RESULT_LIMIT: usize = 100;
/// Hard cap on dependency traversal depth.
pub const MAX_TRAVERSAL_DEPTH: usize = 10;

// ============================================================================
// SECTION: Task Filter
// ============================================================================

/// Task-specific filter fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    /// Restrict to these statuses.
    #[serde(default)]
    pub statuses: Option<Vec<TaskStatus>>,
    /// Restrict to this priority.
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Restrict to this complexity.
    #[serde(default)]
    pub complexity: Option<Complexity>,
    /// Restrict to this assignee.
    #[serde(default)]
    pub assignee: Option<ActorId>,
    /// Restrict to this owner.
    #[serde(default)]
    pub owner: Option<ActorId>,
    /// Restrict to these task-type labels.
    #[serde(default)]
    pub task_types: Option<Vec<String>>,
    /// Require a deadline to be present (or absent).
    #[serde(default)]
    pub has_deadline: Option<bool>,
    /// Only tasks with a deadline at or before this instant.
    #[serde(default)]
    pub deadline_before: Option<Timestamp>,
}

// ============================================================================
// SECTION: Element Filter
// ============================================================================

/// Filter applied to element listings and pagination.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementFilter {
    /// Restrict to these element kinds.
    #[serde(default)]
    pub kinds: Option<Vec<ElementKind>>,
    /// Restrict to elements created by this actor.
    #[serde(default)]
    pub created_by: Option<ActorId>,
    /// Only elements created at or after this instant.
    #[serde(default)]
    pub created_after: Option<Timestamp>,
    /// Only elements created at or before this instant.
    #[serde(default)]
    pub created_before: Option<Timestamp>,
    /// Only elements updated at or after this instant.
    #[serde(default)]
    pub updated_after: Option<Timestamp>,
    /// Only elements updated at or before this instant.
    #[serde(default)]
    pub updated_before: Option<Timestamp>,
    /// Include soft-deleted elements.
    #[serde(default)]
    pub include_deleted: bool,
    /// Require every one of these tags.
    #[serde(default)]
    pub tags_all: Vec<String>,
    /// Require at least one of these tags.
    #[serde(default)]
    pub tags_any: Vec<String>,
    /// Task-specific filter fields.
    #[serde(default)]
    pub task: Option<TaskFilter>,
    /// Maximum rows to return; clamped to the cap.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Number of rows to skip.
    #[serde(default)]
    pub offset: Option<usize>,
}

impl ElementFilter {
    /// Returns a filter restricted to a single kind.
    #[must_use]
    pub fn of_kind(kind: ElementKind) -> Self {
        Self {
            kinds: Some(vec![kind]),
            ..Self::default()
        }
    }

    /// Returns the effective row limit: defaulted, then capped.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }

    /// Returns the effective row offset.
    #[must_use]
    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

// ============================================================================
// SECTION: Pagination
// ============================================================================

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Rows in this page.
    pub items: Vec<T>,
    /// Total matching rows across all pages.
    pub total: u64,
    /// Offset this page started at.
    pub offset: usize,
    /// Effective limit used for this page.
    pub limit: usize,
    /// Whether further rows exist past this page.
    pub has_more: bool,
}
