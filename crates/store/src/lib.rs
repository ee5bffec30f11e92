//! SQLite persistence for the messaging pipeline.
//!
//! One store per table, each owning its schema through `init(&pool)`:
//! messages (with the provider-id idempotency constraint), contacts,
//! channels, and the generic entity-metadata key/value table. The contact
//! resolver sits on top of the contact and metadata stores.

pub mod channels;
pub mod contacts;
pub mod messages;
pub mod meta;
pub mod resolver;

pub use {
    channels::SqliteChannelStore, contacts::SqliteContactStore, messages::SqliteMessageStore,
    meta::SqliteMetaStore, resolver::ContactResolver,
};

/// Create every table this crate owns on the given pool.
pub async fn init_all(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    SqliteChannelStore::init(pool).await?;
    SqliteMessageStore::init(pool).await?;
    SqliteContactStore::init(pool).await?;
    SqliteMetaStore::init(pool).await?;
    Ok(())
}
