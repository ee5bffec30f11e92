//! Provider-agnostic messaging model.
//!
//! Each provider (WhatsApp Cloud, Telegram Bot API) implements the
//! [`ProviderAdapter`] trait: verify the webhook handshake, authenticate a
//! data call, normalize the raw payload into canonical events, and build
//! outbound send requests. Everything downstream of the adapter seam works
//! on the canonical types defined here.

pub mod adapter;
pub mod error;
pub mod events;
pub mod model;
pub mod store;

pub use {
    adapter::{AdapterRegistry, ProviderAdapter, ProviderSendAck},
    error::{Error, Result},
    events::{DeliveryEvent, DeliveryEventSink, NoopDeliveryEventSink},
    model::{
        ChannelKind, DeliveryStatus, HandoverContext, InboundEvent, MessageKind, MessageRecord,
        NormalizedBatch, OutboundPayload, PersistOutcome, StatusEvent,
    },
    store::{
        ChannelState, ChannelStore, ContactRecord, ContactStatus, ContactStore, MessageStore,
        MetaEntry, MetaStore, NewOutboundMessage, StoredChannel,
    },
};
