//! Telegram Bot API provider adapter.
//!
//! Webhook side (secret-token authentication, update normalization) and the
//! Bot API send side of the `ProviderAdapter` seam. Telegram has no
//! subscription handshake and no delivery receipts; the adapter reports the
//! handshake unsupported and always yields an empty status list.

pub mod adapter;
pub mod config;
pub mod payload;

pub use {adapter::TelegramAdapter, config::TelegramChannelConfig};
