// crates/elemgraph-store-sqlite/src/lib.rs
// ============================================================================
// Module: Elemgraph SQLite Store Library
// Description: Public surface of the SQLite storage backend.
// Purpose: Expose the backend, its configuration, and its error type.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! This crate implements the Elemgraph [`StorageBackend`] contract over
//! `SQLite`. Element rows hold a JSON `data` column queried with
//! `json_extract`; tags, dependencies, events, document versions, the
//! blocked cache, child counters, and the dirty feed are plain tables that
//! share each mutation's transaction.
//!
//! [`StorageBackend`]: elemgraph_core::StorageBackend

// ============================================================================
// SECTION: Modules
// ============================================================================

mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteBackend;
pub use store::SqliteBackendConfig;
pub use store::SqliteBackendError;
pub use store::SqliteJournalMode;
pub use store::SqliteSyncMode;
