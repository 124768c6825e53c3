//! Sanctions screening library
//!
//! Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;

pub use services::screener::{check, default_screener, is_sanctioned};
