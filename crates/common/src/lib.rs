//! Splice Common Utilities
//!
//! Shared infrastructure for all Splice crates:
//! - Error types and result aliases
//! - Media time helpers (microsecond timestamps, sample durations)
//! - Tracing/logging initialization
//! - Configuration loading

pub mod config;
pub mod error;
pub mod logging;
pub mod time;

pub use config::*;
pub use error::*;
pub use time::*;
