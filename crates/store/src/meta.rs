//! Generic entity key/value metadata.

use {anyhow::Result, async_trait::async_trait, sqlx::SqlitePool};

use herald_channels::store::{MetaEntry, MetaStore};

#[derive(sqlx::FromRow)]
struct MetaRow {
    key: String,
    value: String,
    created_at: i64,
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// SQLite-backed entity metadata store.
///
/// Keys are unique per (entity kind, entity id); `set` is last-write-wins
/// and keeps the original insertion position, so `entries` lists a
/// re-observed key where it first appeared.
pub struct SqliteMetaStore {
    pool: SqlitePool,
}

impl SqliteMetaStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS entity_meta (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_kind TEXT    NOT NULL,
                entity_id   TEXT    NOT NULL,
                key         TEXT    NOT NULL,
                value       TEXT    NOT NULL,
                created_at  INTEGER NOT NULL,
                UNIQUE (entity_kind, entity_id, key)
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MetaStore for SqliteMetaStore {
    async fn get(&self, entity_kind: &str, entity_id: &str, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM entity_meta WHERE entity_kind = ? AND entity_id = ? AND key = ?",
        )
        .bind(entity_kind)
        .bind(entity_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(v,)| v))
    }

    async fn set(&self, entity_kind: &str, entity_id: &str, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO entity_meta (entity_kind, entity_id, key, value, created_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(entity_kind, entity_id, key) DO UPDATE SET value = excluded.value"#,
        )
        .bind(entity_kind)
        .bind(entity_id)
        .bind(key)
        .bind(value)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn entries(&self, entity_kind: &str, entity_id: &str) -> Result<Vec<MetaEntry>> {
        let rows = sqlx::query_as::<_, MetaRow>(
            r#"SELECT key, value, created_at FROM entity_meta
               WHERE entity_kind = ? AND entity_id = ?
               ORDER BY id"#,
        )
        .bind(entity_kind)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| MetaEntry {
                key: r.key,
                value: r.value,
                created_at: r.created_at,
            })
            .collect())
    }
}
