//! Domain models - sanctions document and screening types
//!
//! This module contains the canonical data types used throughout the system:
//! - `SanctionsDocument` - list identifier to `SanctionList` map, the persisted state
//! - `SanctionList` / `ListEntries` - one watch list, plain or date-of-birth-aware
//! - `MatchResult` - verdict of a screening query
//! - `DateOfBirth` - caller-supplied birth date, resolved to epoch seconds

pub mod types;

// Re-export commonly used types at module level
pub use types::{
    DateOfBirth, DobRecord, ListEntries, ListKind, MatchResult, SanctionList, SanctionsDocument,
};
