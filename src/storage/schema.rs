use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StoreError;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database backed by a single
    /// pooled connection, so every query observes the same tables. File
    /// databases run in WAL mode with a small connection pool.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Busy` if the database is locked (SQLITE_BUSY,
    /// SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `StoreError::Migration` if the schema could not be applied.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        // Pre-create the DB file with user-only permissions
        #[cfg(unix)]
        if !in_memory {
            let db_path = std::path::Path::new(path);
            if !db_path.exists() {
                if let Some(parent) = db_path.parent().filter(|p| p.exists()) {
                    use std::os::unix::fs::OpenOptionsExt;
                    let _file = std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .mode(0o600)
                        .open(db_path)
                        .ok(); // If creation fails, SQLite will report the error at connect_with.
                    tracing::debug!(dir = %parent.display(), "Created database file");
                }
            }
        }

        // busy_timeout=5000: writers wait up to 5 seconds for the lock, which
        // bounds every store round-trip made by concurrent workers.
        let mut options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Each in-memory connection is its own database, so pin exactly one
        // and never let the pool recycle it.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| match StoreError::from_sqlx(e) {
            StoreError::Busy => StoreError::Busy,
            other => StoreError::Migration(other.to_string()),
        })?;
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT UNIQUE NOT NULL,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_fetched_at INTEGER,
                previous_fetched_at INTEGER
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_follows (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(user_id, feed_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY,
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                url TEXT UNIQUE NOT NULL,
                description TEXT,
                published_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Claim order scan: NULLs sort first in ascending SQLite order
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_feeds_last_fetched ON feeds(last_fetched_at, id)",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feed_follows_feed ON feed_follows(feed_id)")
            .execute(&mut *tx)
            .await?;

        // browse: posts of followed feeds, newest first
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_posts_feed_published ON posts(feed_id, published_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
