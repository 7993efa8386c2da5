// system-tests/tests/cascade.rs
// ============================================================================
// Module: Cascade Deletion Scenarios
// Description: Soft deletion with dependency cascade and cache release.
// ============================================================================
//! ## Overview
//! Covers tombstoning, removal of every edge touching the deleted element,
//! release of dependents in the blocked cache, and exclusion of tombstones
//! from default listings.

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

use elemgraph_core::DeleteOptions;
use elemgraph_core::DependencyKind;
use elemgraph_core::ElementFilter;
use elemgraph_core::EngineError;
use elemgraph_core::EventFilter;
use elemgraph_core::EventKind;
use elemgraph_core::StorageBackend;
use elemgraph_core::TaskStatus;
use system_tests::alice;
use system_tests::create_task;
use system_tests::harness;

#[test]
fn test_cascade_delete_removes_every_touching_edge() {
    let h = harness();
    let a = create_task(&h.engine, "A");
    let b = create_task(&h.engine, "B");
    let c = create_task(&h.engine, "C");

    h.engine
        .add_dependency(&a.core.id, &b.core.id, DependencyKind::RelatesTo, None, &alice())
        .unwrap();
    h.engine
        .add_dependency(&b.core.id, &c.core.id, DependencyKind::Blocks, None, &alice())
        .unwrap();

    h.engine.delete(&b.core.id, &DeleteOptions::new(alice())).unwrap();

    assert!(h.engine.get_dependencies(&a.core.id, None).unwrap().is_empty());
    assert!(h.engine.get_dependents(&c.core.id, None).unwrap().is_empty());
    assert!(
        h.engine
            .backend()
            .blocked_rows(&c.core.id)
            .unwrap()
            .iter()
            .all(|row| row.blocked_by != b.core.id)
    );
    assert!(h.engine.backend().blocked_rows(&c.core.id).unwrap().is_empty());

    // C was auto-blocked by the edge and is restored on the cascade.
    let restored = h.engine.get(&c.core.id, &Default::default()).unwrap().unwrap();
    assert_eq!(restored.element.as_task().unwrap().status, TaskStatus::Open);
}

#[test]
fn test_deletion_is_terminal_and_tombstones_the_task() {
    let h = harness();
    let task = create_task(&h.engine, "doomed");
    h.engine
        .delete(
            &task.core.id,
            &DeleteOptions {
                actor: alice(),
                reason: Some("obsolete".to_string()),
            },
        )
        .unwrap();

    let fetched = h.engine.get(&task.core.id, &Default::default()).unwrap().unwrap();
    assert_eq!(fetched.element.as_task().unwrap().status, TaskStatus::Tombstone);
    assert!(fetched.element.is_deleted());

    let again = h.engine.delete(&task.core.id, &DeleteOptions::new(alice())).unwrap_err();
    assert!(matches!(again, EngineError::NotFound { .. }));

    let events = h.engine.get_events(&task.core.id, &EventFilter::default()).unwrap();
    let deleted = events
        .iter()
        .find(|event| event.event_type == EventKind::Deleted)
        .expect("deleted event");
    assert_eq!(deleted.new_value.as_ref().unwrap()["reason"], "obsolete");
}

#[test]
fn test_tombstones_are_hidden_from_default_listings() {
    let h = harness();
    let keep = create_task(&h.engine, "keep");
    let drop = create_task(&h.engine, "drop");
    h.engine.delete(&drop.core.id, &DeleteOptions::new(alice())).unwrap();

    let listed = h.engine.list(&ElementFilter::default()).unwrap();
    let ids: Vec<_> = listed.iter().map(|element| element.id().clone()).collect();
    assert_eq!(ids, vec![keep.core.id]);

    let with_deleted = ElementFilter {
        include_deleted: true,
        ..ElementFilter::default()
    };
    assert_eq!(h.engine.list(&with_deleted).unwrap().len(), 2);
}
