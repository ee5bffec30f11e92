//! The herald gateway: webhook surface, pipeline executor, startup wiring.
//!
//! The axum app exposes the provider webhook routes and `/health`; everything
//! behind the route handlers runs as queued tasks executed by the
//! [`pipeline::Pipeline`]. Delivery-lifecycle events fan out over the
//! [`broadcast::BroadcastSink`] for real-time listeners.

pub mod broadcast;
pub mod pipeline;
pub mod server;
pub mod webhook;

pub use {
    broadcast::BroadcastSink,
    pipeline::Pipeline,
    server::{AppState, build_gateway_app, start_gateway},
};
