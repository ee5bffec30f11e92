//! Contact persistence.

use {anyhow::Result, async_trait::async_trait, sqlx::SqlitePool};

use herald_channels::store::{ContactRecord, ContactStatus, ContactStore};

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: i64,
    identifier: String,
    display_name: String,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ContactRow> for ContactRecord {
    type Error = anyhow::Error;

    fn try_from(r: ContactRow) -> Result<Self> {
        let status = ContactStatus::parse(&r.status)
            .ok_or_else(|| anyhow::anyhow!("unknown contact status: {}", r.status))?;
        Ok(Self {
            id: r.id,
            identifier: r.identifier,
            display_name: r.display_name,
            status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// SQLite-backed contact store. The external identifier is globally unique;
/// one contact is shared by every channel that sees the same identifier.
pub struct SqliteContactStore {
    pool: SqlitePool,
}

impl SqliteContactStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS contacts (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                identifier   TEXT    NOT NULL UNIQUE,
                display_name TEXT    NOT NULL,
                status       TEXT    NOT NULL DEFAULT 'active',
                created_at   INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ContactStore for SqliteContactStore {
    async fn get(&self, identifier: &str) -> Result<Option<ContactRecord>> {
        let row = sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts WHERE identifier = ?")
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn create(&self, identifier: &str, display_name: &str) -> Result<ContactRecord> {
        let now = now_secs();
        let result = sqlx::query(
            r#"INSERT INTO contacts (identifier, display_name, status, created_at, updated_at)
               VALUES (?, ?, 'active', ?, ?)"#,
        )
        .bind(identifier)
        .bind(display_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn update_display_name(&self, identifier: &str, display_name: &str) -> Result<()> {
        sqlx::query("UPDATE contacts SET display_name = ?, updated_at = ? WHERE identifier = ?")
            .bind(display_name)
            .bind(now_secs())
            .bind(identifier)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteContactStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteContactStore::init(&pool).await.unwrap();
        SqliteContactStore::new(pool)
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = test_store().await;
        let created = store.create("919990001111", "Asha").await.unwrap();
        assert_eq!(created.status, ContactStatus::Active);

        let got = store.get("919990001111").await.unwrap().unwrap();
        assert_eq!(got.id, created.id);
        assert_eq!(got.display_name, "Asha");
    }

    #[tokio::test]
    async fn update_display_name_changes_name_only() {
        let store = test_store().await;
        let created = store.create("919990001111", "919990001111").await.unwrap();
        store
            .update_display_name("919990001111", "Asha")
            .await
            .unwrap();
        let got = store.get("919990001111").await.unwrap().unwrap();
        assert_eq!(got.display_name, "Asha");
        assert_eq!(got.id, created.id);
    }

    #[tokio::test]
    async fn duplicate_identifier_rejected() {
        let store = test_store().await;
        store.create("919990001111", "Asha").await.unwrap();
        assert!(store.create("919990001111", "Asha").await.is_err());
    }
}
