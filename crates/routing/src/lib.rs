//! Declarative routing: channel address → ordered downstream consumers.
//!
//! The table is the single extension point for routing policy. New rules are
//! data (config entries), never dispatch-code changes: the gateway pipeline
//! converts each [`RouteTarget`] into its task kind mechanically.

pub mod table;

pub use table::{RouteTarget, RoutingTable};
