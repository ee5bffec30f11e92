use {anyhow::Result, async_trait::async_trait, sqlx::SqlitePool};

use herald_channels::{
    model::ChannelKind,
    store::{ChannelState, ChannelStore, StoredChannel},
};

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
struct ChannelRow {
    account_id: String,
    kind: String,
    config: String,
    status: String,
    is_default: bool,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ChannelRow> for StoredChannel {
    type Error = anyhow::Error;

    fn try_from(r: ChannelRow) -> Result<Self> {
        let kind = ChannelKind::parse(&r.kind)
            .ok_or_else(|| anyhow::anyhow!("unknown channel kind: {}", r.kind))?;
        let status = ChannelState::parse(&r.status)
            .ok_or_else(|| anyhow::anyhow!("unknown channel status: {}", r.status))?;
        Ok(Self {
            account_id: r.account_id,
            kind,
            config: serde_json::from_str(&r.config)?,
            status,
            is_default: r.is_default,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// SQLite-backed channel store.
pub struct SqliteChannelStore {
    pool: SqlitePool,
}

impl SqliteChannelStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the channels table schema.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS channels (
                account_id TEXT    PRIMARY KEY,
                kind       TEXT    NOT NULL,
                config     TEXT    NOT NULL,
                status     TEXT    NOT NULL DEFAULT 'active',
                is_default INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for SqliteChannelStore {
    async fn list(&self) -> Result<Vec<StoredChannel>> {
        let rows =
            sqlx::query_as::<_, ChannelRow>("SELECT * FROM channels ORDER BY updated_at DESC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get(&self, account_id: &str) -> Result<Option<StoredChannel>> {
        let row = sqlx::query_as::<_, ChannelRow>("SELECT * FROM channels WHERE account_id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn upsert(&self, channel: StoredChannel) -> Result<()> {
        let config_json = serde_json::to_string(&channel.config)?;
        sqlx::query(
            r#"INSERT INTO channels (account_id, kind, config, status, is_default, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(account_id) DO UPDATE SET
                 kind = excluded.kind,
                 config = excluded.config,
                 status = excluded.status,
                 is_default = excluded.is_default,
                 updated_at = excluded.updated_at"#,
        )
        .bind(&channel.account_id)
        .bind(channel.kind.as_str())
        .bind(&config_json)
        .bind(channel.status.as_str())
        .bind(channel.is_default)
        .bind(channel.created_at)
        .bind(channel.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, account_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM channels WHERE account_id = ?")
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
