// crates/elemgraph-core/tests/hashing.rs
// ============================================================================
// Module: Hashing Tests
// Description: Tests for canonical JSON hashing and content hash stability.
// ============================================================================
//! ## Overview
//! Validates deterministic hashing using RFC 8785 canonicalization and the
//! volatile-field exclusion of element content hashes.

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

use std::collections::BTreeSet;

use elemgraph_core::ActorId;
use elemgraph_core::Element;
use elemgraph_core::ElementId;
use elemgraph_core::NewTask;
use elemgraph_core::Timestamp;
use elemgraph_core::element::build_task;
use elemgraph_core::hashing::content_hash_of_value;
use elemgraph_core::hashing::hash_canonical_json;
use serde_json::json;

fn sample_task(tags: &[&str]) -> Element {
    let input = NewTask {
        title: "write the report".to_string(),
        tags: tags.iter().map(ToString::to_string).collect::<BTreeSet<_>>(),
        ..NewTask::default()
    };
    let task = build_task(
        ElementId::new("el-abc12"),
        ActorId::new("alice"),
        Timestamp::from_unix_millis(1_000),
        input,
    )
    .unwrap();
    Element::Task(task)
}

#[test]
fn test_canonical_json_hash_is_stable() {
    let value_a = json!({"b": 1, "a": 2});
    let value_b = json!({"a": 2, "b": 1});

    let hash_a = hash_canonical_json(&value_a).unwrap();
    let hash_b = hash_canonical_json(&value_b).unwrap();

    assert_eq!(hash_a, hash_b);
    assert_eq!(hash_a.as_str().len(), 64);
}

#[test]
fn test_content_hash_ignores_volatile_instants() {
    let wire_a = json!({"id": "el-abc12", "type": "task", "createdAt": 1, "updatedAt": 2});
    let wire_b = json!({"id": "el-abc12", "type": "task", "createdAt": 9, "updatedAt": 9});

    let hash_a = content_hash_of_value(&wire_a).unwrap();
    let hash_b = content_hash_of_value(&wire_b).unwrap();

    assert_eq!(hash_a, hash_b);
}

#[test]
fn test_element_hash_is_pure_over_updated_at() {
    let element = sample_task(&["alpha", "beta"]);
    let baseline = element.content_hash().unwrap();

    let mut touched = element.clone();
    touched.core_mut().updated_at = Timestamp::from_unix_millis(99_999);
    assert_eq!(touched.content_hash().unwrap(), baseline);
}

#[test]
fn test_element_hash_reflects_tag_set_not_order() {
    let forward = sample_task(&["alpha", "beta"]);
    let reversed = sample_task(&["beta", "alpha"]);
    let different = sample_task(&["alpha"]);

    assert_eq!(
        forward.content_hash().unwrap(),
        reversed.content_hash().unwrap()
    );
    assert_ne!(
        forward.content_hash().unwrap(),
        different.content_hash().unwrap()
    );
}

#[test]
fn test_element_hash_changes_with_content() {
    let element = sample_task(&[]);
    let mut changed = element.clone();
    if let Element::Task(task) = &mut changed {
        task.title = "write a different report".to_string();
    }

    assert_ne!(
        element.content_hash().unwrap(),
        changed.content_hash().unwrap()
    );
}
