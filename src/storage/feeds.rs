use super::follows::insert_follow;
use super::schema::Database;
use super::types::{now_millis, ClaimedFeed, Feed, FeedWithOwner, FollowRow, StoreError};

const FEED_COLUMNS: &str = "id, name, url, user_id, created_at, updated_at, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Create a feed owned by `user_id`. Feed URLs are globally unique.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if a feed with this URL already exists.
    pub async fn create_feed(&self, name: &str, url: &str, user_id: i64) -> Result<Feed, StoreError> {
        let now = now_millis();
        sqlx::query_as(&format!(
            "INSERT INTO feeds (name, url, user_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::conflict_or(e, "feed", url))
    }

    /// Create a feed and make its creator follow it, in one transaction.
    ///
    /// Either both rows exist afterwards or neither does.
    pub async fn create_feed_with_follow(
        &self,
        name: &str,
        url: &str,
        user_id: i64,
    ) -> Result<(Feed, FollowRow), StoreError> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        let feed: Feed = sqlx::query_as(&format!(
            "INSERT INTO feeds (name, url, user_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::conflict_or(e, "feed", url))?;

        let follow = insert_follow(&mut *tx, user_id, feed.id, now)
            .await
            .map_err(|e| StoreError::conflict_or(e, "follow", url))?;

        tx.commit().await?;
        Ok((feed, follow))
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Feed, StoreError> {
        sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("feed", url))
    }

    /// All feeds with the name of the user who added them.
    pub async fn list_feeds(&self) -> Result<Vec<FeedWithOwner>, StoreError> {
        let feeds = sqlx::query_as(
            r#"
                SELECT f.id, f.name, f.url, u.name AS owner_name, f.last_fetched_at
                FROM feeds f
                JOIN users u ON u.id = f.user_id
                ORDER BY f.name, f.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    // ========================================================================
    // Claim Operations
    // ========================================================================

    /// Claim up to `limit` least-recently-fetched feeds.
    ///
    /// Selection and the `last_fetched_at` bump happen in a single UPDATE
    /// statement, so concurrent callers can never receive the same feed
    /// before its timestamp has moved. Never-fetched feeds (NULL) come
    /// first, ties are broken by id. The new timestamp is never lower than
    /// the old one, even if the wall clock steps backwards.
    ///
    /// The returned batch is ordered by the timestamp each feed had before
    /// the claim.
    pub async fn claim_next_feeds(&self, limit: usize) -> Result<Vec<ClaimedFeed>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = now_millis();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut claimed: Vec<ClaimedFeed> = sqlx::query_as(
            r#"
                UPDATE feeds
                SET previous_fetched_at = last_fetched_at,
                    last_fetched_at = MAX(COALESCE(last_fetched_at, 0), ?1),
                    updated_at = ?1
                WHERE id IN (
                    SELECT id FROM feeds
                    ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
                    LIMIT ?2
                )
                RETURNING id, name, url, last_fetched_at, previous_fetched_at
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // RETURNING order is unspecified; restore claim order
        claimed.sort_by_key(|f| (f.previous_fetched_at, f.id));
        Ok(claimed)
    }

    /// Advance a single feed's `last_fetched_at` to now (monotonically).
    pub async fn mark_feed_fetched(&self, feed_id: i64) -> Result<(), StoreError> {
        let now = now_millis();
        let result = sqlx::query(
            r#"
                UPDATE feeds
                SET previous_fetched_at = last_fetched_at,
                    last_fetched_at = MAX(COALESCE(last_fetched_at, 0), ?1),
                    updated_at = ?1
                WHERE id = ?2
            "#,
        )
        .bind(now)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("feed", feed_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, StoreError};
    use std::collections::HashSet;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    async fn seed_feeds(db: &Database, count: usize) -> Vec<i64> {
        let user = db.create_user("owner").await.unwrap();
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let feed = db
                .create_feed(
                    &format!("Feed {i}"),
                    &format!("https://feed{i}.example.com/rss"),
                    user.id,
                )
                .await
                .unwrap();
            ids.push(feed.id);
        }
        ids
    }

    async fn set_last_fetched(db: &Database, feed_id: i64, at: Option<i64>) {
        sqlx::query("UPDATE feeds SET last_fetched_at = ? WHERE id = ?")
            .bind(at)
            .bind(feed_id)
            .execute(&db.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_feed_starts_unfetched() {
        let db = test_db().await;
        let user = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed("Blog", "https://example.com/rss", user.id)
            .await
            .unwrap();
        assert_eq!(feed.name, "Blog");
        assert_eq!(feed.user_id, user.id);
        assert_eq!(feed.last_fetched_at, None);

        let fetched = db.get_feed_by_url("https://example.com/rss").await.unwrap();
        assert_eq!(fetched, feed);
    }

    #[tokio::test]
    async fn test_duplicate_feed_url_is_conflict() {
        let db = test_db().await;
        let user = db.create_user("alice").await.unwrap();
        db.create_feed("A", "https://example.com/rss", user.id)
            .await
            .unwrap();
        let err = db
            .create_feed("B", "https://example.com/rss", user.id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { entity: "feed", .. }));
    }

    #[tokio::test]
    async fn test_create_feed_with_follow_rolls_back_on_conflict() {
        let db = test_db().await;
        let alice = db.create_user("alice").await.unwrap();
        let bob = db.create_user("bob").await.unwrap();
        db.create_feed_with_follow("A", "https://example.com/rss", alice.id)
            .await
            .unwrap();

        assert!(db
            .create_feed_with_follow("B", "https://example.com/rss", bob.id)
            .await
            .is_err());
        assert!(db.list_follows_for_user(bob.id).await.unwrap().is_empty());
        assert_eq!(db.list_feeds().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_feeds_includes_owner() {
        let db = test_db().await;
        let alice = db.create_user("alice").await.unwrap();
        db.create_feed("Blog", "https://example.com/rss", alice.id)
            .await
            .unwrap();

        let feeds = db.list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].owner_name, "alice");
        assert_eq!(feeds[0].url, "https://example.com/rss");
    }

    #[tokio::test]
    async fn test_claim_prefers_never_fetched() {
        let db = test_db().await;
        let ids = seed_feeds(&db, 2).await;
        let (a, b) = (ids[0], ids[1]);

        // B was fetched ten minutes ago, A never
        let ten_minutes_ago = chrono::Utc::now().timestamp_millis() - 10 * 60 * 1000;
        set_last_fetched(&db, b, Some(ten_minutes_ago)).await;
        set_last_fetched(&db, a, None).await;

        let batch = db.claim_next_feeds(1).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, a);
        assert_eq!(batch[0].previous_fetched_at, None);
    }

    #[tokio::test]
    async fn test_claim_orders_by_last_fetched() {
        let db = test_db().await;
        let ids = seed_feeds(&db, 4).await;

        set_last_fetched(&db, ids[0], Some(3_000)).await;
        set_last_fetched(&db, ids[1], Some(1_000)).await;
        set_last_fetched(&db, ids[2], None).await;
        set_last_fetched(&db, ids[3], Some(2_000)).await;

        let batch = db.claim_next_feeds(3).await.unwrap();
        let claimed: Vec<i64> = batch.iter().map(|f| f.id).collect();
        assert_eq!(claimed, vec![ids[2], ids[1], ids[3]]);

        // The claim stamped every member, so the leftover goes next
        let next = db.claim_next_feeds(1).await.unwrap();
        assert_eq!(next[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_claim_advances_timestamp() {
        let db = test_db().await;
        let ids = seed_feeds(&db, 1).await;

        let before = chrono::Utc::now().timestamp_millis();
        let batch = db.claim_next_feeds(5).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch[0].last_fetched_at >= before);

        let feed = db
            .get_feed_by_url("https://feed0.example.com/rss")
            .await
            .unwrap();
        assert_eq!(feed.id, ids[0]);
        assert_eq!(feed.last_fetched_at, Some(batch[0].last_fetched_at));
    }

    #[tokio::test]
    async fn test_claim_is_monotonic_when_stamp_in_future() {
        let db = test_db().await;
        let ids = seed_feeds(&db, 1).await;
        let future = chrono::Utc::now().timestamp_millis() + 60 * 60 * 1000;
        set_last_fetched(&db, ids[0], Some(future)).await;

        let batch = db.claim_next_feeds(1).await.unwrap();
        assert_eq!(batch[0].last_fetched_at, future);
        assert_eq!(batch[0].previous_fetched_at, Some(future));
    }

    #[tokio::test]
    async fn test_claim_zero_and_empty() {
        let db = test_db().await;
        assert!(db.claim_next_feeds(3).await.unwrap().is_empty());

        seed_feeds(&db, 2).await;
        assert!(db.claim_next_feeds(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successive_claims_rotate_through_all_feeds() {
        let db = test_db().await;
        let ids = seed_feeds(&db, 5).await;

        let mut seen = HashSet::new();
        for _ in 0..5 {
            let batch = db.claim_next_feeds(1).await.unwrap();
            assert!(seen.insert(batch[0].id), "feed claimed twice before rotation");
        }
        assert_eq!(seen, ids.into_iter().collect());
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claims.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        seed_feeds(&db, 40).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move { db.claim_next_feeds(5).await }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            let batch = handle.await.unwrap().unwrap();
            assert_eq!(batch.len(), 5);
            for feed in batch {
                assert!(seen.insert(feed.id), "feed {} claimed twice", feed.id);
            }
        }
        assert_eq!(seen.len(), 40);
    }

    #[tokio::test]
    async fn test_mark_feed_fetched() {
        let db = test_db().await;
        let ids = seed_feeds(&db, 1).await;

        db.mark_feed_fetched(ids[0]).await.unwrap();
        let feed = db
            .get_feed_by_url("https://feed0.example.com/rss")
            .await
            .unwrap();
        assert!(feed.last_fetched_at.is_some());

        assert!(matches!(
            db.mark_feed_fetched(9999).await,
            Err(StoreError::NotFound { entity: "feed", .. })
        ));
    }
}
