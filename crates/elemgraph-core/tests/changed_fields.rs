// crates/elemgraph-core/tests/changed_fields.rs
// ============================================================================
// Module: Changed Fields Tests
// Description: Tests for top-level change-field computation between payloads.
// ============================================================================
//! ## Overview
//! Validates the sorted union of added, removed, and value-changed keys,
//! including the null-side convention.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    missing_docs,
    clippy::missing_docs_in_private_items,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use elemgraph_core::compute_changed_fields;
use serde_json::json;

#[test]
fn test_identical_payloads_change_nothing() {
    let payload = json!({"title": "a", "status": "open"});
    assert!(compute_changed_fields(Some(&payload), Some(&payload)).is_empty());
}

#[test]
fn test_value_changes_added_and_removed_keys_union() {
    let old = json!({"title": "a", "status": "open", "owner": "alice"});
    let new = json!({"title": "b", "status": "open", "assignee": "bob"});

    let changed = compute_changed_fields(Some(&old), Some(&new));
    assert_eq!(changed, vec!["assignee", "owner", "title"]);
}

#[test]
fn test_null_side_yields_all_keys_of_the_other() {
    let payload = json!({"b": 1, "a": 2});

    assert_eq!(compute_changed_fields(None, Some(&payload)), vec!["a", "b"]);
    assert_eq!(compute_changed_fields(Some(&payload), None), vec!["a", "b"]);
    assert!(compute_changed_fields(None, None).is_empty());
}

#[test]
fn test_nested_changes_register_the_top_level_key_only() {
    let old = json!({"permissions": {"visibility": "private"}});
    let new = json!({"permissions": {"visibility": "public"}});

    assert_eq!(compute_changed_fields(Some(&old), Some(&new)), vec!["permissions"]);
}
