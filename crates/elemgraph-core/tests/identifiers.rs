// crates/elemgraph-core/tests/identifiers.rs
// ============================================================================
// Module: Identifier Tests
// Description: Tests for element identifier grammar and actor reservation.
// ============================================================================
//! ## Overview
//! Validates the `el-` identifier grammar, hierarchical child navigation,
//! root issuance shape, and the reserved `system:` actor prefix.

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

use elemgraph_core::ActorId;
use elemgraph_core::ElementId;
use elemgraph_core::identifiers::random_root_id;

#[test]
fn test_parse_accepts_valid_roots() {
    for value in ["el-abc", "el-a1b2c3d4", "el-00000000", "el-zzz"] {
        assert!(ElementId::parse(value).is_ok(), "expected {value} to parse");
    }
}

#[test]
fn test_parse_accepts_hierarchical_children() {
    let id = ElementId::parse("el-ab12c.3.1").unwrap();
    assert!(!id.is_root());
    assert_eq!(id.parent().unwrap().as_str(), "el-ab12c.3");
    assert_eq!(id.parent().unwrap().parent().unwrap().as_str(), "el-ab12c");
}

#[test]
fn test_parse_rejects_bad_shapes() {
    for value in [
        "",
        "el-",
        "el-ab",
        "el-abcdefghi",
        "el-ABC12",
        "xx-abc12",
        "el-abc12.",
        "el-abc12.0",
        "el-abc12.01",
        "el-abc12.x",
    ] {
        assert!(ElementId::parse(value).is_err(), "expected {value} to be rejected");
    }
}

#[test]
fn test_child_navigation_round_trips() {
    let root = ElementId::new("el-ab12c");
    let child = root.child(7);
    assert_eq!(child.as_str(), "el-ab12c.7");
    assert_eq!(child.parent().unwrap(), root);
    assert!(root.is_root());
    assert!(root.parent().is_none());
}

#[test]
fn test_random_root_ids_match_the_grammar() {
    for segment_len in [1, 3, 5, 8, 20] {
        let id = random_root_id(segment_len);
        assert!(
            ElementId::parse(id.as_str()).is_ok(),
            "issued id {id} violates the grammar"
        );
    }
}

#[test]
fn test_system_actors_are_reserved() {
    assert!(ActorId::new("system:blocked-cache").is_reserved());
    assert!(ActorId::new("system:workflow").is_reserved());
    assert!(!ActorId::new("alice").is_reserved());
    assert!(!ActorId::new("systematic-sam").is_reserved());
}
