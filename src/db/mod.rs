use crate::error::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

/// Key of the persisted "already voted" flag.
pub const VOTED_KEY: &str = "buildon-voted";

/// Local persisted vote flag. Only the exact value `"true"` counts as voted.
#[async_trait]
pub trait LocalFlagStore: Send + Sync {
    async fn has_voted(&self) -> Result<bool>;
    async fn mark_voted(&self) -> Result<()>;
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);

        // A single connection keeps `sqlite::memory:` databases coherent.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_flags (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get_flag(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM local_flags WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    pub async fn set_flag(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_flags (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LocalFlagStore for Database {
    async fn has_voted(&self) -> Result<bool> {
        Ok(self.get_flag(VOTED_KEY).await?.as_deref() == Some("true"))
    }

    async fn mark_voted(&self) -> Result<()> {
        self.set_flag(VOTED_KEY, "true").await
    }
}

/// Flag store that lives only as long as the process.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryFlags {
    voted: AtomicBool,
}

#[cfg(test)]
impl MemoryFlags {
    pub fn voted() -> Self {
        Self {
            voted: AtomicBool::new(true),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl LocalFlagStore for MemoryFlags {
    async fn has_voted(&self) -> Result<bool> {
        Ok(self.voted.load(Ordering::SeqCst))
    }

    async fn mark_voted(&self) -> Result<()> {
        self.voted.store(true, Ordering::SeqCst);
        Ok(())
    }
}
