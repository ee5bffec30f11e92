//! Outbound dispatch: provider send, message record, delivery event.

pub mod dispatcher;

pub use dispatcher::OutboundDispatcher;
