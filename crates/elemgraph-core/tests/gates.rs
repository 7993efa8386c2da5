// crates/elemgraph-core/tests/gates.rs
// ============================================================================
// Module: Gate Metadata Tests
// Description: Tests for the closed gate metadata shape and quorum logic.
// ============================================================================
//! ## Overview
//! Validates the closed `{all_of | any_of}` metadata enumeration, approval
//! bookkeeping, and quorum satisfaction.

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
use elemgraph_core::GateSpec;
use serde_json::json;

#[test]
fn test_all_of_quorum_requires_every_approver() {
    let mut gate = GateSpec::from_metadata(&json!({"all_of": ["alice", "bob"]})).unwrap();
    assert!(!gate.is_satisfied());
    assert_eq!(gate.unsatisfied_approvers().len(), 2);

    assert!(gate.record_approval(&ActorId::new("alice")));
    assert!(!gate.is_satisfied());
    assert_eq!(gate.unsatisfied_approvers(), vec![ActorId::new("bob")]);

    assert!(gate.record_approval(&ActorId::new("bob")));
    assert!(gate.is_satisfied());
    assert!(gate.unsatisfied_approvers().is_empty());
}

#[test]
fn test_any_of_quorum_accepts_a_single_approver() {
    let mut gate = GateSpec::from_metadata(&json!({"any_of": ["alice", "bob"]})).unwrap();
    assert!(!gate.is_satisfied());

    assert!(gate.record_approval(&ActorId::new("bob")));
    assert!(gate.is_satisfied());

    assert!(gate.remove_approval(&ActorId::new("bob")));
    assert!(!gate.is_satisfied());
}

#[test]
fn test_explicit_satisfaction_is_sticky() {
    let mut gate = GateSpec::from_metadata(&json!({"all_of": ["alice"]})).unwrap();
    assert!(gate.mark_satisfied());
    assert!(!gate.mark_satisfied());
    assert!(gate.is_satisfied());
}

#[test]
fn test_unknown_shapes_are_rejected() {
    for metadata in [
        json!({}),
        json!({"all_of": [], "any_of": []}),
        json!({"all_of": ["a"], "any_of": ["b"]}),
        json!({"all_of": []}),
        json!({"quorum": ["a"]}),
        json!({"all_of": ["a"], "extra": true}),
    ] {
        assert!(
            GateSpec::from_metadata(&metadata).is_err(),
            "expected {metadata} to be rejected"
        );
    }
}

#[test]
fn test_metadata_round_trips_through_serialization() {
    let mut gate = GateSpec::from_metadata(&json!({"all_of": ["alice", "bob"]})).unwrap();
    gate.record_approval(&ActorId::new("alice"));

    let round_tripped = GateSpec::from_metadata(&gate.to_metadata()).unwrap();
    assert_eq!(round_tripped, gate);
}
