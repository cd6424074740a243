use crate::feed::parser::ParsedItem;
use crate::storage::{Database, NewPost, StoreError};

/// Outcome of ingesting one feed's items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Posts that did not exist before this call
    pub inserted: usize,
    /// Items dropped because they had no link to dedup on
    pub skipped: usize,
}

/// Persists parsed items exactly once per URL.
///
/// Deduplication is delegated entirely to the store's unique constraint on
/// `posts.url` plus `ON CONFLICT DO NOTHING`, so two workers racing to insert
/// a cross-posted article both succeed and exactly one row lands.
#[derive(Clone)]
pub struct PostIngester {
    db: Database,
}

impl PostIngester {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store the items of `feed_id` that are not stored yet.
    pub async fn ingest(&self, feed_id: i64, items: &[ParsedItem]) -> Result<IngestReport, StoreError> {
        let posts: Vec<NewPost> = items.iter().filter_map(to_new_post).collect();
        let skipped = items.len() - posts.len();

        if skipped > 0 {
            tracing::debug!(feed_id, skipped, "Items without a link skipped");
        }

        let inserted = self.db.insert_posts(feed_id, &posts).await?;
        Ok(IngestReport { inserted, skipped })
    }
}

/// The item link is the dedup key; items without one cannot be stored.
fn to_new_post(item: &ParsedItem) -> Option<NewPost> {
    let url = item.link.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
    Some(NewPost {
        title: item.title.clone(),
        url: url.to_string(),
        description: item.description.clone(),
        published_at: item.published_at,
    })
}
