//! Services - business logic and state management
//!
//! - `list_store` - Cached, mtime-checked sanctions document with atomic persist
//! - `name_matcher` - Normalization and token-order matching
//! - `screener` - Caller-facing screening API and the process-wide default
//! - `update_coordinator` - Fetch, merge and persist refresh cycle

pub mod list_store;
pub mod name_matcher;
pub mod screener;
pub mod update_coordinator;

// Re-export commonly used types
pub use list_store::{ListStore, StoreError};
pub use name_matcher::{NameQuery, VerdictPolicy};
pub use screener::Screener;
pub use update_coordinator::{RefreshOutcome, UpdateCoordinator};
