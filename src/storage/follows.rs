use sqlx::SqliteConnection;

use super::schema::Database;
use super::types::{now_millis, FollowRow, FollowedFeed, StoreError};

/// Insert a follow and read it back joined with the user and feed names.
///
/// Takes a bare connection so it can run inside a caller's transaction.
pub(super) async fn insert_follow(
    conn: &mut SqliteConnection,
    user_id: i64,
    feed_id: i64,
    now: i64,
) -> Result<FollowRow, sqlx::Error> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at) VALUES (?, ?, ?, ?)
         RETURNING id",
    )
    .bind(user_id)
    .bind(feed_id)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query_as(
        r#"
            SELECT ff.id, ff.user_id, ff.feed_id,
                   u.name AS user_name, f.name AS feed_name,
                   ff.created_at, ff.updated_at
            FROM feed_follows ff
            JOIN users u ON u.id = ff.user_id
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.id = ?
        "#,
    )
    .bind(id)
    .fetch_one(&mut *conn)
    .await
}

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Make `user_id` follow `feed_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the user already follows the feed.
    pub async fn create_follow(&self, user_id: i64, feed_id: i64) -> Result<FollowRow, StoreError> {
        let mut tx = self.pool.begin().await?;
        let follow = insert_follow(&mut *tx, user_id, feed_id, now_millis())
            .await
            .map_err(|e| StoreError::conflict_or(e, "follow", &format!("user {user_id} feed {feed_id}")))?;
        tx.commit().await?;
        Ok(follow)
    }

    /// Remove the follow between `user_id` and the feed at `url`.
    ///
    /// Only that pair's row is touched. Returns `false` if there was nothing
    /// to remove.
    pub async fn delete_follow(&self, user_id: i64, url: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM feed_follows
             WHERE user_id = ? AND feed_id = (SELECT id FROM feeds WHERE url = ?)",
        )
        .bind(user_id)
        .bind(url)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Feeds followed by `user_id`, ordered by feed name.
    pub async fn list_follows_for_user(&self, user_id: i64) -> Result<Vec<FollowedFeed>, StoreError> {
        let follows = sqlx::query_as(
            r#"
                SELECT f.id AS feed_id, f.name AS feed_name, f.url AS feed_url
                FROM feed_follows ff
                JOIN feeds f ON f.id = ff.feed_id
                WHERE ff.user_id = ?
                ORDER BY f.name, f.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(follows)
    }
}
