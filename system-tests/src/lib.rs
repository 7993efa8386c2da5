// system-tests/src/lib.rs
// ============================================================================
// Module: System Test Helpers
// Description: Shared fixtures for end-to-end engine scenarios.
// Purpose: Open engines over temporary SQLite stores with controllable time.
// Dependencies: elemgraph-core, elemgraph-store-sqlite, tempfile
// ============================================================================

//! ## Overview
//! Helpers shared by the system-test suites: engines over temporary on-disk
//! stores, a deterministic manual clock, and input-record shorthands.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use elemgraph_core::ActorId;
use elemgraph_core::Element;
use elemgraph_core::ElementEngine;
use elemgraph_core::EngineConfig;
use elemgraph_core::ManualClock;
use elemgraph_core::MutateOptions;
use elemgraph_core::NewElement;
use elemgraph_core::NewTask;
use elemgraph_core::Task;
use elemgraph_core::Timestamp;
use elemgraph_store_sqlite::SqliteBackend;
use elemgraph_store_sqlite::SqliteBackendConfig;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// An engine over a temporary store, with its clock handle and tempdir.
pub struct TestHarness {
    /// Engine under test.
    pub engine: ElementEngine<SqliteBackend>,
    /// Deterministic clock driving the engine.
    pub clock: Arc<ManualClock>,
    /// Temporary directory owning the store file.
    pub dir: TempDir,
}

/// Opens an engine over a fresh temporary store.
///
/// The clock starts at a fixed instant so assertions on instants and
/// last-writer-wins ordering are deterministic.
///
/// # Panics
///
/// Panics when the temporary store cannot be created.
#[must_use]
pub fn harness() -> TestHarness {
    #[allow(clippy::unwrap_used, reason = "test fixture setup")]
    let dir = TempDir::new().unwrap();
    let config = SqliteBackendConfig::at(dir.path().join("elements.db"));
    #[allow(clippy::unwrap_used, reason = "test fixture setup")]
    let backend = SqliteBackend::new(config).unwrap();
    let clock = Arc::new(ManualClock::starting_at(Timestamp::from_unix_millis(
        1_700_000_000_000,
    )));
    let engine = ElementEngine::with_clock(backend, EngineConfig::default(), clock.clone());
    TestHarness { engine, clock, dir }
}

/// Returns the default acting actor for tests.
#[must_use]
pub fn alice() -> ActorId {
    ActorId::new("alice")
}

/// Returns mutate options for the default actor.
#[must_use]
pub fn as_alice() -> MutateOptions {
    MutateOptions::new(alice())
}

/// Builds a task creation input with the given title.
#[must_use]
pub fn task_input(title: &str) -> NewElement {
    NewElement::Task(NewTask {
        title: title.to_string(),
        ..NewTask::default()
    })
}

/// Creates an open task and returns it.
///
/// # Panics
///
/// Panics when creation fails.
#[must_use]
pub fn create_task(engine: &ElementEngine<SqliteBackend>, title: &str) -> Task {
    #[allow(clippy::unwrap_used, reason = "test fixture setup")]
    let element = engine.create(task_input(title), &as_alice()).unwrap();
    match element {
        Element::Task(task) => task,
        #[allow(clippy::panic, reason = "test fixture setup")]
        _ => panic!("expected a task"),
    }
}
