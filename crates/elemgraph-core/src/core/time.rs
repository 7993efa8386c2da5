// crates/elemgraph-core/src/core/time.rs
// ============================================================================
// Module: Elemgraph Time Model
// Description: Canonical timestamp representation for elements and events.
// Purpose: Provide a single, totally ordered instant type for all records.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Every persisted instant in Elemgraph is a unix-epoch millisecond value.
//! Instants are totally ordered, which is what the last-writer-wins merge in
//! the sync layer relies on. The engine obtains instants through the
//! [`Clock`](crate::interfaces::Clock) interface rather than reading the wall
//! clock directly, so tests can drive time deterministically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix-epoch millisecond instant used across elements and events.
///
/// # Invariants
/// - Ordering is the numeric ordering of the millisecond value.
/// - Serializes transparently as an integer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix-epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the instant as unix-epoch milliseconds.
    #[must_use]
    pub const fn unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the instant advanced by the given number of milliseconds.
    #[must_use]
    pub const fn plus_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns the signed millisecond distance from `earlier` to `self`.
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Renders the instant as an RFC 3339 string for human-readable output.
    ///
    /// Falls back to the raw millisecond value when the instant is outside
    /// the representable calendar range.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000)
            .ok()
            .and_then(|instant| instant.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.0.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_rfc3339().fmt(f)
    }
}
