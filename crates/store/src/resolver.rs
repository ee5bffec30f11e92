//! Contact resolution: lazy upsert plus provider-linkage metadata.

use std::sync::Arc;

use {
    anyhow::Result,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use herald_channels::store::{ContactRecord, ContactStore, MetaStore, StoredChannel};

/// One provider-linkage entry in a contact's metadata collection: which
/// provider account this contact was observed talking through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileLinkage {
    pub identifier: String,
    pub provider: String,
    pub account_id: String,
    pub is_default: bool,
}

/// Resolves the sending party of an inbound message to a durable contact.
pub struct ContactResolver {
    contacts: Arc<dyn ContactStore>,
    meta: Arc<dyn MetaStore>,
}

impl ContactResolver {
    pub fn new(contacts: Arc<dyn ContactStore>, meta: Arc<dyn MetaStore>) -> Self {
        Self { contacts, meta }
    }

    /// Upsert the contact for `identifier` and record the linkage through
    /// `channel`.
    ///
    /// A missing contact is created with the supplied display name (or the
    /// identifier itself); an existing contact gets its name refreshed when
    /// the provider supplies a changed non-empty name. One linkage entry is
    /// kept per provider account, last write wins.
    pub async fn resolve(
        &self,
        identifier: &str,
        display_name: Option<&str>,
        channel: &StoredChannel,
    ) -> Result<ContactRecord> {
        let display_name = display_name.filter(|n| !n.is_empty());

        let contact = match self.contacts.get(identifier).await? {
            Some(existing) => {
                if let Some(name) = display_name
                    && name != existing.display_name
                {
                    debug!(identifier, name, "updating contact display name");
                    self.contacts.update_display_name(identifier, name).await?;
                    self.contacts.get(identifier).await?.unwrap_or(existing)
                } else {
                    existing
                }
            },
            None => {
                let name = display_name.unwrap_or(identifier);
                debug!(identifier, name, "creating contact");
                self.contacts.create(identifier, name).await?
            },
        };

        let linkage = ProfileLinkage {
            identifier: identifier.to_string(),
            provider: channel.kind.to_string(),
            account_id: channel.account_id.clone(),
            is_default: channel.is_default,
        };
        self.meta
            .set(
                "contact",
                &contact.id.to_string(),
                &format!("linkage:{}", channel.account_id),
                &serde_json::to_string(&linkage)?,
            )
            .await?;

        Ok(contact)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        herald_channels::{
            model::ChannelKind,
            store::{ChannelState, MetaStore},
        },
        sqlx::SqlitePool,
    };

    use {
        super::*,
        crate::{SqliteContactStore, SqliteMetaStore},
    };

    async fn resolver() -> (ContactResolver, Arc<SqliteMetaStore>) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteContactStore::init(&pool).await.unwrap();
        SqliteMetaStore::init(&pool).await.unwrap();
        let meta = Arc::new(SqliteMetaStore::new(pool.clone()));
        (
            ContactResolver::new(
                Arc::new(SqliteContactStore::new(pool)),
                Arc::clone(&meta) as Arc<dyn MetaStore>,
            ),
            meta,
        )
    }

    fn channel(account_id: &str) -> StoredChannel {
        StoredChannel {
            account_id: account_id.into(),
            kind: ChannelKind::Whatsapp,
            config: serde_json::json!({}),
            status: ChannelState::Active,
            is_default: true,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[tokio::test]
    async fn creates_contact_with_identifier_as_fallback_name() {
        let (resolver, _) = resolver().await;
        let contact = resolver
            .resolve("919990001111", None, &channel("wa-main"))
            .await
            .unwrap();
        assert_eq!(contact.display_name, "919990001111");
    }

    #[tokio::test]
    async fn updates_changed_display_name() {
        let (resolver, _) = resolver().await;
        resolver
            .resolve("919990001111", Some("Asha"), &channel("wa-main"))
            .await
            .unwrap();
        let contact = resolver
            .resolve("919990001111", Some("Asha K"), &channel("wa-main"))
            .await
            .unwrap();
        assert_eq!(contact.display_name, "Asha K");

        // Empty names never clobber a stored one.
        let contact = resolver
            .resolve("919990001111", Some(""), &channel("wa-main"))
            .await
            .unwrap();
        assert_eq!(contact.display_name, "Asha K");
    }

    #[tokio::test]
    async fn one_linkage_entry_per_account() {
        let (resolver, meta) = resolver().await;
        let contact = resolver
            .resolve("919990001111", Some("Asha"), &channel("wa-main"))
            .await
            .unwrap();
        resolver
            .resolve("919990001111", Some("Asha"), &channel("wa-main"))
            .await
            .unwrap();
        resolver
            .resolve("919990001111", Some("Asha"), &channel("wa-backup"))
            .await
            .unwrap();

        let entries = meta.entries("contact", &contact.id.to_string()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "linkage:wa-main");

        let linkage: ProfileLinkage = serde_json::from_str(&entries[0].value).unwrap();
        assert_eq!(linkage.provider, "whatsapp");
        assert!(linkage.is_default);
    }
}
