// system-tests/tests/sync_roundtrip.rs
// ============================================================================
// Module: Sync Scenarios
// Description: Export/import round-trips, LWW merge, errors, dirty feed.
// ============================================================================
//! ## Overview
//! Covers export-then-import equality into an empty store, the
//! last-writer-wins collision rules with hash provenance, per-line error
//! collection, dry runs, and the dirty-id feed.

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

use elemgraph_core::ConflictResolution;
use elemgraph_core::DependencyKind;
use elemgraph_core::ElementFilter;
use elemgraph_core::ElementPatch;
use elemgraph_core::ExportOptions;
use elemgraph_core::FieldsPatch;
use elemgraph_core::ImportOptions;
use elemgraph_core::StorageBackend;
use elemgraph_core::TaskPatch;
use serde_json::json;
use system_tests::alice;
use system_tests::as_alice;
use system_tests::create_task;
use system_tests::harness;

#[test]
fn test_export_then_import_into_an_empty_store_matches() {
    let source = harness();
    let a = create_task(&source.engine, "A");
    let b = create_task(&source.engine, "B");
    source
        .engine
        .add_dependency(&a.core.id, &b.core.id, DependencyKind::Blocks, None, &alice())
        .unwrap();

    let text = source.engine.export(&ExportOptions::default()).unwrap().unwrap();

    let target = harness();
    let report = target.engine.import_str(&text, &ImportOptions::default()).unwrap();
    assert!(report.success);
    assert_eq!(report.elements_imported, 2);
    assert_eq!(report.dependencies_imported, 1);
    assert_eq!(report.events_imported, 0);
    assert!(report.conflicts.is_empty());

    // Identical ids, hashes, and dependency triples.
    for id in [&a.core.id, &b.core.id] {
        let local = source.engine.backend().element(id).unwrap().unwrap();
        let remote = target.engine.backend().element(id).unwrap().unwrap();
        assert_eq!(local.content_hash, remote.content_hash);
        assert_eq!(local.element.kind(), remote.element.kind());
    }
    assert_eq!(
        source.engine.backend().all_dependencies().unwrap(),
        target.engine.backend().all_dependencies().unwrap()
    );

    // The imported edge set drives the rebuilt blocked cache.
    let blocked: BTreeSet<_> = target
        .engine
        .backend()
        .all_blocked_rows()
        .unwrap()
        .into_iter()
        .map(|row| row.element_id)
        .collect();
    assert_eq!(blocked, BTreeSet::from([b.core.id.clone()]));
}

#[test]
fn test_lww_import_keeps_the_newer_record() {
    let h = harness();
    let local = create_task(&h.engine, "Local");
    let local_row = h.engine.backend().element(&local.core.id).unwrap().unwrap();
    let newer_at = local.core.updated_at.plus_millis(10_000);

    let remote = json!({
        "id": local.core.id.as_str(),
        "type": "task",
        "title": "Remote",
        "status": "open",
        "priority": 3,
        "complexity": 3,
        "taskType": "task",
        "createdAt": local.core.created_at.unix_millis(),
        "updatedAt": newer_at.unix_millis(),
        "createdBy": "alice",
        "tags": [],
        "metadata": {},
    });
    let line = format!("{remote}\n");

    let report = h.engine.import_str(&line, &ImportOptions::default()).unwrap();
    assert!(report.success);
    assert_eq!(report.elements_imported, 1);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].resolution, ConflictResolution::Replaced);
    assert_ne!(report.conflicts[0].local_hash, report.conflicts[0].remote_hash);
    assert_eq!(report.conflicts[0].local_hash, local_row.content_hash);

    let merged = h.engine.get(&local.core.id, &Default::default()).unwrap().unwrap();
    assert_eq!(merged.element.as_task().unwrap().title, "Remote");

    // Re-importing the identical record changes nothing and keeps local.
    let report = h.engine.import_str(&line, &ImportOptions::default()).unwrap();
    assert!(report.success);
    assert_eq!(report.elements_imported, 0);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].resolution, ConflictResolution::KeptLocal);
    assert_eq!(report.conflicts[0].local_hash, report.conflicts[0].remote_hash);
}

#[test]
fn test_stale_records_are_kept_local() {
    let h = harness();
    let local = create_task(&h.engine, "Local");
    h.clock.advance_millis(5_000);
    let patch = ElementPatch {
        fields: Some(FieldsPatch::Task(TaskPatch {
            title: Some("Local v2".to_string()),
            ..TaskPatch::default()
        })),
        ..ElementPatch::default()
    };
    h.engine.update(&local.core.id, patch, &as_alice()).unwrap();

    let stale = json!({
        "id": local.core.id.as_str(),
        "type": "task",
        "title": "Stale remote",
        "status": "open",
        "priority": 3,
        "complexity": 3,
        "taskType": "task",
        "createdAt": local.core.created_at.unix_millis(),
        "updatedAt": local.core.created_at.unix_millis(),
        "createdBy": "alice",
        "tags": [],
        "metadata": {},
    });
    let report = h.engine.import_str(&format!("{stale}\n"), &ImportOptions::default()).unwrap();
    assert_eq!(report.elements_imported, 0);
    assert_eq!(report.conflicts[0].resolution, ConflictResolution::KeptLocal);

    let kept = h.engine.get(&local.core.id, &Default::default()).unwrap().unwrap();
    assert_eq!(kept.element.as_task().unwrap().title, "Local v2");
}

#[test]
fn test_invalid_lines_are_collected_not_fatal() {
    let h = harness();
    let good = create_task(&h.engine, "good");
    let export = h.engine.export(&ExportOptions::default()).unwrap().unwrap();

    let target = harness();
    let text = format!(
        "not json at all\n\n{}{{\"neither\": \"element nor dependency\"}}\n",
        export
    );
    let report = target.engine.import_str(&text, &ImportOptions::default()).unwrap();
    assert!(!report.success);
    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.errors[0].line, 1);
    assert_eq!(report.elements_imported, 1);
    assert!(target.engine.backend().element(&good.core.id).unwrap().is_some());
}

#[test]
fn test_dry_run_writes_nothing() {
    let source = harness();
    let _ = create_task(&source.engine, "ghost");
    let export = source.engine.export(&ExportOptions::default()).unwrap().unwrap();

    let target = harness();
    let options = ImportOptions {
        dry_run: true,
        ..ImportOptions::default()
    };
    let report = target.engine.import_str(&export, &options).unwrap();
    assert!(report.dry_run);
    assert_eq!(report.elements_imported, 1);
    assert!(target.engine.list(&ElementFilter::default()).unwrap().is_empty());
}

#[test]
fn test_export_to_path_and_import_file() {
    let source = harness();
    let _ = create_task(&source.engine, "on disk");
    let path = source.dir.path().join("export.jsonl");
    let returned = source
        .engine
        .export(&ExportOptions {
            path: Some(path.clone()),
            ..ExportOptions::default()
        })
        .unwrap();
    assert!(returned.is_none());

    let target = harness();
    let report = target.engine.import_file(&path, &ImportOptions::default()).unwrap();
    assert!(report.success);
    assert_eq!(report.elements_imported, 1);
}

#[test]
fn test_ephemeral_workflows_can_be_excluded() {
    let h = harness();
    let input = elemgraph_core::NewElement::Workflow(elemgraph_core::NewWorkflow {
        title: "scratch".to_string(),
        ephemeral: true,
        ..elemgraph_core::NewWorkflow::default()
    });
    h.engine.create(input, &as_alice()).unwrap();
    let _ = create_task(&h.engine, "durable");

    let full = h.engine.export(&ExportOptions::default()).unwrap().unwrap();
    assert_eq!(full.lines().count(), 2);

    let trimmed = h
        .engine
        .export(&ExportOptions {
            exclude_ephemeral: true,
            ..ExportOptions::default()
        })
        .unwrap()
        .unwrap();
    assert_eq!(trimmed.lines().count(), 1);
}

#[test]
fn test_dirty_feed_tracks_mutations_and_acknowledgement() {
    let h = harness();
    let task = create_task(&h.engine, "dirty");
    let dirty = h.engine.get_dirty_elements().unwrap();
    assert_eq!(dirty, vec![task.core.id.clone()]);

    h.engine.clear_dirty_elements(&dirty).unwrap();
    assert!(h.engine.get_dirty_elements().unwrap().is_empty());

    let patch = ElementPatch {
        tags: Some(BTreeSet::from(["touched".to_string()])),
        ..ElementPatch::default()
    };
    h.engine.update(&task.core.id, patch, &as_alice()).unwrap();
    assert_eq!(h.engine.get_dirty_elements().unwrap(), vec![task.core.id]);
}

#[test]
fn test_tombstones_propagate_through_export() {
    let source = harness();
    let task = create_task(&source.engine, "to delete");
    source
        .engine
        .delete(&task.core.id, &elemgraph_core::DeleteOptions::new(alice()))
        .unwrap();

    let export = source.engine.export(&ExportOptions::default()).unwrap().unwrap();
    let target = harness();
    let report = target.engine.import_str(&export, &ImportOptions::default()).unwrap();
    assert!(report.success);

    let imported = target.engine.backend().element(&task.core.id).unwrap().unwrap();
    assert!(imported.element.is_deleted());
}
