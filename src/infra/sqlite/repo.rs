use crate::domain::repository::{CacheStore, RepoResult};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

pub struct SqliteCacheStore {
    pub pool: SqlitePool,
}

impl SqliteCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> RepoResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> RepoResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM cache_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> RepoResult<()> {
        sqlx::query(
            r#"INSERT INTO cache_entries (key, value, updated_at)
               VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
               ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
