//! Utility Functions and Cross-Cutting Concerns
//!
//! - **serialization**: serde helpers for string-encoded REST values and
//!   millisecond durations in persisted configuration

pub mod serialization;

pub use serialization::*;
