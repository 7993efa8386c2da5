// system-tests/tests/listing.rs
// ============================================================================
// Module: Listing and Traversal Scenarios
// Description: Pagination clamps, search, hydration, trees, event log.
// ============================================================================
//! ## Overview
//! Covers pagination metadata with the silent limit clamp, search caps,
//! task hydration of document references, bounded dependency trees over
//! cycles, and event-log base-event accounting.

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

use elemgraph_core::DependencyKind;
use elemgraph_core::ElementFilter;
use elemgraph_core::ElementPatch;
use elemgraph_core::EventFilter;
use elemgraph_core::EventKind;
use elemgraph_core::FieldsPatch;
use elemgraph_core::GetOptions;
use elemgraph_core::MAX_LIST_LIMIT;
use elemgraph_core::NewDocument;
use elemgraph_core::NewElement;
use elemgraph_core::NewTask;
use elemgraph_core::TaskPatch;
use elemgraph_core::TaskStatus;
use system_tests::alice;
use system_tests::as_alice;
use system_tests::create_task;
use system_tests::harness;

// ============================================================================
// SECTION: Pagination
// ============================================================================

#[test]
fn test_paginated_listing_reports_totals_and_has_more() {
    let h = harness();
    for index in 0 .. 7 {
        let _ = create_task(&h.engine, &format!("task {index}"));
    }

    let page = h
        .engine
        .list_paginated(&ElementFilter {
            limit: Some(3),
            offset: Some(0),
            ..ElementFilter::default()
        })
        .unwrap();
    assert_eq!(page.items.len(), 3);
    assert_eq!(page.total, 7);
    assert_eq!(page.limit, 3);
    assert!(page.has_more);

    let last = h
        .engine
        .list_paginated(&ElementFilter {
            limit: Some(3),
            offset: Some(6),
            ..ElementFilter::default()
        })
        .unwrap();
    assert_eq!(last.items.len(), 1);
    assert!(!last.has_more);
}

#[test]
fn test_limits_above_the_cap_clamp_silently() {
    let h = harness();
    let _ = create_task(&h.engine, "solo");

    let page = h
        .engine
        .list_paginated(&ElementFilter {
            limit: Some(10_000),
            ..ElementFilter::default()
        })
        .unwrap();
    assert_eq!(page.limit, MAX_LIST_LIMIT);
}

// ============================================================================
// SECTION: Search and Hydration
// ============================================================================

#[test]
fn test_search_spans_titles_and_document_bodies() {
    let h = harness();
    let _ = create_task(&h.engine, "tune the reconciler");
    h.engine
        .create(
            NewElement::Document(NewDocument {
                content: "notes about the reconciler design".to_string(),
                ..NewDocument::default()
            }),
            &as_alice(),
        )
        .unwrap();
    let _ = create_task(&h.engine, "unrelated chore");

    let found = h.engine.search("reconciler", &ElementFilter::default()).unwrap();
    assert_eq!(found.len(), 2);
}

#[test]
fn test_get_hydrates_task_document_references() {
    let h = harness();
    let description = h
        .engine
        .create(
            NewElement::Document(NewDocument {
                content: "long form description".to_string(),
                ..NewDocument::default()
            }),
            &as_alice(),
        )
        .unwrap();
    let task = h
        .engine
        .create(
            NewElement::Task(NewTask {
                title: "documented".to_string(),
                description_ref: Some(description.id().clone()),
                ..NewTask::default()
            }),
            &as_alice(),
        )
        .unwrap();

    let plain = h.engine.get(task.id(), &GetOptions::default()).unwrap().unwrap();
    assert!(plain.description.is_none());

    let hydrated = h
        .engine
        .get(task.id(), &GetOptions { hydrate: true })
        .unwrap()
        .unwrap();
    assert_eq!(
        hydrated.description.unwrap().content,
        "long form description"
    );
}

// ============================================================================
// SECTION: Dependency Trees
// ============================================================================

#[test]
fn test_dependency_tree_is_bounded_on_cycles() {
    let h = harness();
    let a = create_task(&h.engine, "A");
    let b = create_task(&h.engine, "B");
    let c = create_task(&h.engine, "C");

    h.engine
        .add_dependency(&a.core.id, &b.core.id, DependencyKind::RelatesTo, None, &alice())
        .unwrap();
    h.engine
        .add_dependency(&b.core.id, &c.core.id, DependencyKind::RelatesTo, None, &alice())
        .unwrap();
    h.engine
        .add_dependency(&c.core.id, &a.core.id, DependencyKind::RelatesTo, None, &alice())
        .unwrap();

    let tree = h.engine.get_dependency_tree(&a.core.id).unwrap();
    assert_eq!(tree.node_count, 3);
    assert_eq!(tree.max_dependency_depth, 2);
    assert_eq!(tree.max_dependent_depth, 1);
    assert_eq!(tree.root.element.id, a.core.id);
    assert_eq!(tree.root.dependencies.len(), 1);
    assert_eq!(tree.root.dependents.len(), 1);
}

// ============================================================================
// SECTION: Event Accounting
// ============================================================================

#[test]
fn test_each_mutation_emits_exactly_one_base_event() {
    let h = harness();
    let task = create_task(&h.engine, "tracked");

    let close = ElementPatch {
        fields: Some(FieldsPatch::Task(TaskPatch {
            status: Some(TaskStatus::Closed),
            ..TaskPatch::default()
        })),
        ..ElementPatch::default()
    };
    h.engine.update(&task.core.id, close, &as_alice()).unwrap();

    let reopen = ElementPatch {
        fields: Some(FieldsPatch::Task(TaskPatch {
            status: Some(TaskStatus::Open),
            ..TaskPatch::default()
        })),
        ..ElementPatch::default()
    };
    h.engine.update(&task.core.id, reopen, &as_alice()).unwrap();

    let events = h.engine.get_events(&task.core.id, &EventFilter::default()).unwrap();
    let base: Vec<EventKind> = events
        .iter()
        .rev()
        .map(|event| event.event_type)
        .filter(|kind| {
            matches!(
                kind,
                EventKind::Created
                    | EventKind::Updated
                    | EventKind::Deleted
                    | EventKind::Closed
                    | EventKind::Reopened
            )
        })
        .collect();
    assert_eq!(base, vec![EventKind::Created, EventKind::Closed, EventKind::Reopened]);

    let closed = h
        .engine
        .get_events(
            &task.core.id,
            &EventFilter {
                event_types: Some(vec![EventKind::Closed]),
                ..EventFilter::default()
            },
        )
        .unwrap();
    assert_eq!(closed.len(), 1);
    assert!(closed[0].old_value.is_some());
    assert!(closed[0].new_value.is_some());
}

#[test]
fn test_closed_at_follows_the_status() {
    let h = harness();
    let task = create_task(&h.engine, "timed");
    let close = ElementPatch {
        fields: Some(FieldsPatch::Task(TaskPatch {
            status: Some(TaskStatus::Closed),
            ..TaskPatch::default()
        })),
        ..ElementPatch::default()
    };
    h.engine.update(&task.core.id, close, &as_alice()).unwrap();
    let closed = h.engine.get(&task.core.id, &GetOptions::default()).unwrap().unwrap();
    assert!(closed.element.as_task().unwrap().closed_at.is_some());

    let reopen = ElementPatch {
        fields: Some(FieldsPatch::Task(TaskPatch {
            status: Some(TaskStatus::Open),
            ..TaskPatch::default()
        })),
        ..ElementPatch::default()
    };
    h.engine.update(&task.core.id, reopen, &as_alice()).unwrap();
    let reopened = h.engine.get(&task.core.id, &GetOptions::default()).unwrap().unwrap();
    assert!(reopened.element.as_task().unwrap().closed_at.is_none());
}

#[test]
fn test_stats_summarize_the_store() {
    let h = harness();
    let _ = create_task(&h.engine, "one");
    let _ = create_task(&h.engine, "two");

    let stats = h.engine.stats().unwrap();
    assert_eq!(stats.total_elements, 2);
    assert_eq!(
        stats.elements.get(&elemgraph_core::ElementKind::Task),
        Some(&2)
    );
    assert_eq!(stats.events, 2);
    assert_eq!(stats.dirty_elements, 2);
    assert!(stats.file_size > 0);
}
