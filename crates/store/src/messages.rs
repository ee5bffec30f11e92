//! Message persistence with the provider-id idempotency guarantee.

use {anyhow::Result, async_trait::async_trait, sqlx::SqlitePool, tracing::warn};

use herald_channels::{
    model::{DeliveryStatus, InboundEvent, MessageKind, MessageRecord, PersistOutcome},
    store::{MessageStore, NewOutboundMessage},
};

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    account_id: String,
    provider_message_id: String,
    sender: String,
    recipient: String,
    kind: String,
    body: String,
    status: String,
    sent_at: i64,
    raw_payload: Option<String>,
    raw_response: Option<String>,
    created_at: i64,
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = anyhow::Error;

    fn try_from(r: MessageRow) -> Result<Self> {
        let status = DeliveryStatus::parse(&r.status)
            .ok_or_else(|| anyhow::anyhow!("unknown message status: {}", r.status))?;
        Ok(Self {
            id: r.id,
            account_id: r.account_id,
            provider_message_id: r.provider_message_id,
            sender: r.sender,
            recipient: r.recipient,
            kind: MessageKind::parse(&r.kind),
            body: r.body,
            status,
            sent_at: r.sent_at,
            raw_payload: r.raw_payload.as_deref().map(serde_json::from_str).transpose()?,
            raw_response: r.raw_response.as_deref().map(serde_json::from_str).transpose()?,
            created_at: r.created_at,
        })
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// SQLite-backed message store.
///
/// The UNIQUE index on `provider_message_id` is the dedup guarantee: two
/// workers persisting the same redelivered webhook race on the insert and
/// the loser reads back the winner's row.
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS messages (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id          TEXT    NOT NULL,
                provider_message_id TEXT    NOT NULL UNIQUE,
                sender              TEXT    NOT NULL,
                recipient           TEXT    NOT NULL,
                kind                TEXT    NOT NULL,
                body                TEXT    NOT NULL,
                status              TEXT    NOT NULL,
                sent_at             INTEGER NOT NULL,
                raw_payload         TEXT,
                raw_response        TEXT,
                created_at          INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_peer
             ON messages (account_id, sender, recipient, sent_at)",
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn fetch_by_provider_id(&self, provider_message_id: &str) -> Result<Option<MessageRecord>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE provider_message_id = ?",
        )
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn persist_inbound(
        &self,
        account_id: &str,
        event: &InboundEvent,
    ) -> Result<PersistOutcome> {
        if let Some(existing) = self.fetch_by_provider_id(&event.provider_message_id).await? {
            return Ok(PersistOutcome::Duplicate(existing));
        }

        let raw = serde_json::to_string(&event.raw)?;
        let now = now_secs();
        let insert = sqlx::query(
            r#"INSERT INTO messages
               (account_id, provider_message_id, sender, recipient, kind, body, status,
                sent_at, raw_payload, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(account_id)
        .bind(&event.provider_message_id)
        .bind(&event.sender)
        .bind(&event.recipient)
        .bind(event.kind.as_str())
        .bind(&event.body)
        .bind(DeliveryStatus::Received.as_str())
        .bind(event.timestamp)
        .bind(&raw)
        .bind(now)
        .execute(&self.pool)
        .await;

        match insert {
            Ok(result) => {
                let record = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ?")
                    .bind(result.last_insert_rowid())
                    .fetch_one(&self.pool)
                    .await?;
                Ok(PersistOutcome::Created(record.try_into()?))
            },
            // Concurrent redelivery: the other worker won the insert race.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let existing = self
                    .fetch_by_provider_id(&event.provider_message_id)
                    .await?
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "unique violation for {} but row not found",
                            event.provider_message_id
                        )
                    })?;
                Ok(PersistOutcome::Duplicate(existing))
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn record_outbound(&self, outbound: NewOutboundMessage) -> Result<MessageRecord> {
        let raw_response = outbound
            .raw_response
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = now_secs();
        let result = sqlx::query(
            r#"INSERT INTO messages
               (account_id, provider_message_id, sender, recipient, kind, body, status,
                sent_at, raw_response, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&outbound.account_id)
        .bind(&outbound.provider_message_id)
        .bind(&outbound.sender)
        .bind(&outbound.recipient)
        .bind(outbound.kind.as_str())
        .bind(&outbound.body)
        .bind(DeliveryStatus::Sent.as_str())
        .bind(outbound.sent_at)
        .bind(&raw_response)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn find_by_provider_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<MessageRecord>> {
        self.fetch_by_provider_id(provider_message_id).await
    }

    async fn apply_status(
        &self,
        provider_message_id: &str,
        status: DeliveryStatus,
        raw: &serde_json::Value,
    ) -> Result<bool> {
        let Some(existing) = self.fetch_by_provider_id(provider_message_id).await? else {
            return Ok(false);
        };
        if status.rank() < existing.status.rank() {
            warn!(
                provider_message_id,
                from = %existing.status,
                to = %status,
                "regressive status transition applied"
            );
        }

        let raw_json = serde_json::to_string(raw)?;
        sqlx::query(
            "UPDATE messages SET status = ?, raw_response = ? WHERE provider_message_id = ?",
        )
        .bind(status.as_str())
        .bind(&raw_json)
        .bind(provider_message_id)
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    async fn recent_conversation(
        &self,
        account_id: &str,
        peer: &str,
        limit: u32,
    ) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"SELECT * FROM messages
               WHERE account_id = ? AND (sender = ? OR recipient = ?)
               ORDER BY sent_at DESC, id DESC
               LIMIT ?"#,
        )
        .bind(account_id)
        .bind(peer)
        .bind(peer)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn last_exchange_at(&self, account_id: &str, peer: &str) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"SELECT MAX(sent_at) FROM messages
               WHERE account_id = ? AND (sender = ? OR recipient = ?)
               HAVING MAX(sent_at) IS NOT NULL"#,
        )
        .bind(account_id)
        .bind(peer)
        .bind(peer)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(ts,)| ts))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use herald_channels::model::MessageKind;

    use super::*;

    async fn test_store() -> SqliteMessageStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteMessageStore::init(&pool).await.unwrap();
        SqliteMessageStore::new(pool)
    }

    fn event(id: &str, sender: &str) -> InboundEvent {
        InboundEvent {
            provider_message_id: id.into(),
            sender: sender.into(),
            recipient: "15550001111".into(),
            sender_name: None,
            kind: MessageKind::Text,
            body: "Hello".into(),
            timestamp: 1_700_000_000,
            raw: serde_json::json!({"id": id}),
        }
    }

    #[tokio::test]
    async fn persist_then_redeliver_is_duplicate() {
        let store = test_store().await;

        let first = store
            .persist_inbound("wa-main", &event("wamid.1", "919990001111"))
            .await
            .unwrap();
        assert!(!first.is_duplicate());
        assert_eq!(first.record().status, DeliveryStatus::Received);

        let second = store
            .persist_inbound("wa-main", &event("wamid.1", "919990001111"))
            .await
            .unwrap();
        assert!(second.is_duplicate());
        assert_eq!(second.record().id, first.record().id);

        // Exactly one row.
        let found = store.find_by_provider_id("wamid.1").await.unwrap();
        assert!(found.is_some());
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn record_outbound_has_sent_status() {
        let store = test_store().await;
        let record = store
            .record_outbound(NewOutboundMessage {
                account_id: "wa-main".into(),
                provider_message_id: "wamid.out.1".into(),
                sender: "15550001111".into(),
                recipient: "919990001111".into(),
                kind: MessageKind::Text,
                body: "Hi there".into(),
                raw_response: Some(serde_json::json!({"messages": [{"id": "wamid.out.1"}]})),
                sent_at: 1_700_000_100,
            })
            .await
            .unwrap();
        assert_eq!(record.status, DeliveryStatus::Sent);
        assert!(record.is_outbound("15550001111"));
    }

    #[tokio::test]
    async fn apply_status_unknown_id_is_noop() {
        let store = test_store().await;
        let updated = store
            .apply_status("wamid.ghost", DeliveryStatus::Delivered, &serde_json::json!({}))
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn apply_status_overwrites() {
        let store = test_store().await;
        store
            .persist_inbound("wa-main", &event("wamid.2", "919990001111"))
            .await
            .unwrap();

        let raw = serde_json::json!({"status": "read"});
        let updated = store
            .apply_status("wamid.2", DeliveryStatus::Read, &raw)
            .await
            .unwrap();
        assert!(updated);

        let record = store.find_by_provider_id("wamid.2").await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Read);
        assert_eq!(record.raw_response, Some(raw));

        // Regression is applied (last write wins), only logged.
        store
            .apply_status("wamid.2", DeliveryStatus::Delivered, &serde_json::json!({}))
            .await
            .unwrap();
        let record = store.find_by_provider_id("wamid.2").await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn recent_conversation_newest_first() {
        let store = test_store().await;
        for (i, body) in ["one", "two", "three"].iter().enumerate() {
            let mut e = event(&format!("wamid.c{i}"), "919990001111");
            e.body = (*body).into();
            e.timestamp = 1_700_000_000 + i as i64;
            store.persist_inbound("wa-main", &e).await.unwrap();
        }
        // A different peer's message must not leak in.
        store
            .persist_inbound("wa-main", &event("wamid.other", "918880001111"))
            .await
            .unwrap();

        let turns = store
            .recent_conversation("wa-main", "919990001111", 2)
            .await
            .unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].body, "three");
        assert_eq!(turns[1].body, "two");
    }

    #[tokio::test]
    async fn last_exchange_covers_both_directions() {
        let store = test_store().await;
        assert!(
            store
                .last_exchange_at("wa-main", "917770001111")
                .await
                .unwrap()
                .is_none()
        );

        store
            .record_outbound(NewOutboundMessage {
                account_id: "wa-main".into(),
                provider_message_id: "wamid.out.2".into(),
                sender: "15550001111".into(),
                recipient: "917770001111".into(),
                kind: MessageKind::Text,
                body: "ping".into(),
                raw_response: None,
                sent_at: 1_700_000_500,
            })
            .await
            .unwrap();

        assert_eq!(
            store
                .last_exchange_at("wa-main", "917770001111")
                .await
                .unwrap(),
            Some(1_700_000_500)
        );
    }
}
