//! Metrics for herald.
//!
//! This crate provides a unified metrics interface using the `metrics` crate
//! facade. Consumers record through the re-exported macros with the name
//! constants defined here; the exporter is chosen by whatever recorder the
//! embedding process installs.
//!
//! # Usage
//!
//! ```rust,ignore
//! use herald_metrics::{counter, ingest};
//!
//! counter!(ingest::MESSAGES_TOTAL).increment(1);
//! ```

mod definitions;

pub use definitions::*;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
