//! IO modules - external system interfaces
//!
//! - `sources` - List sources feeding the refresh cycle (file, HTTP, composite)
//! - `http_api` - HTTP screening endpoint with Prometheus metrics

pub mod http_api;
pub mod sources;

// Re-export commonly used types
pub use sources::{CompositeSource, HttpSource, JsonFileSource, ListSource};
