use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Store errors with enough structure for callers to branch on kind.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file is locked by another process or busy past the timeout
    #[error("Database is busy or locked by another process")]
    Busy,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A lookup by natural key found nothing
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A uniqueness constraint rejected the write
    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[source] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, detecting lock contention.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StoreError::Busy;
        }

        StoreError::Other(err)
    }

    /// Like [`StoreError::from_sqlx`], but maps unique violations to
    /// [`StoreError::Conflict`] naming the offending entity and key.
    pub(crate) fn conflict_or(err: sqlx::Error, entity: &'static str, key: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::Conflict {
                    entity,
                    key: key.to_string(),
                };
            }
        }
        Self::from_sqlx(err)
    }

    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::from_sqlx(err)
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
    /// Unix millis of the last claim; `None` until the feed is first claimed
    pub last_fetched_at: Option<i64>,
}

/// Feed listing row joined with the owning user's name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedWithOwner {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub owner_name: String,
    pub last_fetched_at: Option<i64>,
}

/// A feed handed out by a claim.
///
/// `last_fetched_at` is the timestamp written by the claim itself;
/// `previous_fetched_at` is the value it replaced (`None` for a first fetch).
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ClaimedFeed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub last_fetched_at: i64,
    pub previous_fetched_at: Option<i64>,
}

/// A follow row as returned on creation, with both sides' names resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FollowRow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub user_name: String,
    pub feed_name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FollowedFeed {
    pub feed_id: i64,
    pub feed_name: String,
    pub feed_url: String,
}

/// A post ready for insertion. `url` is the dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub feed_name: String,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub created_at: i64,
}

/// Current time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
