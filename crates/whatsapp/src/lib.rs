//! WhatsApp Cloud API provider adapter.
//!
//! Implements the webhook side (subscription handshake, signed data calls,
//! payload normalization) and the Graph API send side of the
//! `ProviderAdapter` seam.

pub mod adapter;
pub mod config;
pub mod payload;

pub use {adapter::WhatsAppAdapter, config::WhatsAppChannelConfig};
