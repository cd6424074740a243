use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{now_millis, NewPost, Post, StoreError};

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post unless one with the same URL already exists.
    ///
    /// Returns `true` if a row was inserted. An existing URL is not an error;
    /// the stored post is left untouched.
    pub async fn insert_post_if_absent(&self, feed_id: i64, post: &NewPost) -> Result<bool, StoreError> {
        let now = now_millis();
        let result = sqlx::query(
            "INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(url) DO NOTHING",
        )
        .bind(feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert-if-absent a batch of posts for one feed in a single transaction.
    ///
    /// Conflicts on `url` (with stored posts, with posts from other feeds
    /// inserted concurrently, or within the batch itself) are skipped by the
    /// store. Returns the number of rows actually inserted.
    pub async fn insert_posts(&self, feed_id: i64, posts: &[NewPost]) -> Result<usize, StoreError> {
        if posts.is_empty() {
            return Ok(0);
        }

        const BATCH_SIZE: usize = 50;
        let now = now_millis();
        let mut tx = self.pool.begin().await?;
        let mut inserted: u64 = 0;

        for chunk in posts.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at) ",
            );

            builder.push_values(chunk, |mut b, post| {
                b.push_bind(feed_id)
                    .push_bind(&post.title)
                    .push_bind(&post.url)
                    .push_bind(&post.description)
                    .push_bind(post.published_at)
                    .push_bind(now)
                    .push_bind(now);
            });

            builder.push(" ON CONFLICT(url) DO NOTHING");

            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted as usize)
    }

    /// Most recent posts from feeds `user_id` follows.
    ///
    /// Ordered by publish date (newest first, undated last), then by
    /// insertion.
    pub async fn list_posts_for_user(&self, user_id: i64, limit: u32) -> Result<Vec<Post>, StoreError> {
        let posts = sqlx::query_as(
            r#"
                SELECT p.id, p.feed_id, f.name AS feed_name, p.title, p.url,
                       p.description, p.published_at, p.created_at
                FROM posts p
                JOIN feeds f ON f.id = p.feed_id
                JOIN feed_follows ff ON ff.feed_id = p.feed_id
                WHERE ff.user_id = ?
                ORDER BY p.published_at DESC NULLS LAST, p.created_at DESC, p.id DESC
                LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }
}
