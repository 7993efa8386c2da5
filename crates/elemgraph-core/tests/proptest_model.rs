// crates/elemgraph-core/tests/proptest_model.rs
// ============================================================================
// Module: Model Property Tests
// Description: Property tests for hashing and identifier grammar.
// ============================================================================
//! ## Overview
//! Property-based checks: canonical hashing is insensitive to key order and
//! volatile instants; the identifier grammar accepts exactly what it issues.

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

use elemgraph_core::ElementId;
use elemgraph_core::compute_changed_fields;
use elemgraph_core::hashing::content_hash_of_value;
use proptest::prelude::*;
use serde_json::Value;
use serde_json::json;

proptest! {
    #[test]
    fn content_hash_ignores_volatile_instants(
        created in any::<i64>(),
        updated in any::<i64>(),
        title in "[a-z ]{0,32}",
    ) {
        let wire_a = json!({
            "id": "el-abc12",
            "type": "task",
            "title": title,
            "createdAt": created,
            "updatedAt": updated,
        });
        let wire_b = json!({
            "id": "el-abc12",
            "type": "task",
            "title": title,
            "createdAt": 0,
            "updatedAt": 0,
        });
        prop_assert_eq!(
            content_hash_of_value(&wire_a).unwrap(),
            content_hash_of_value(&wire_b).unwrap()
        );
    }

    #[test]
    fn root_identifier_grammar_round_trips(segment in "[a-z0-9]{3,8}") {
        let id = format!("el-{segment}");
        let parsed = ElementId::parse(&id).unwrap();
        prop_assert!(parsed.is_root());
        prop_assert_eq!(parsed.as_str(), id.as_str());
    }

    #[test]
    fn child_identifiers_parse_and_navigate(
        segment in "[a-z0-9]{3,8}",
        ordinal in 1u64..10_000,
    ) {
        let root = ElementId::parse(&format!("el-{segment}")).unwrap();
        let child = root.child(ordinal);
        let parsed = ElementId::parse(child.as_str()).unwrap();
        prop_assert_eq!(parsed.parent().unwrap(), root);
    }

    #[test]
    fn changed_fields_are_sorted_and_deduplicated(
        old_title in "[a-z]{0,8}",
        new_title in "[a-z]{0,8}",
        extra in "[a-z]{1,8}",
    ) {
        let old = json!({"title": old_title, "extra": extra});
        let new = json!({"title": new_title});
        let changed = compute_changed_fields(Some(&old), Some(&new));
        let mut sorted = changed.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(&changed, &sorted);
        prop_assert!(changed.contains(&"extra".to_string()));
        prop_assert_eq!(
            changed.contains(&"title".to_string()),
            old_title != new_title
        );
    }
}

#[test]
fn changed_fields_handles_non_object_payloads() {
    let scalar = Value::String("not an object".to_string());
    assert!(compute_changed_fields(Some(&scalar), Some(&scalar)).is_empty());
}
