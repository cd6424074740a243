use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::error::Error;
use crate::feed::ingest::{IngestReport, PostIngester};
use crate::feed::parser::parse_feed;
use crate::storage::{ClaimedFeed, Database};

pub const DEFAULT_USER_AGENT: &str = "gator";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors from the network half of a fetch.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The fetch exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Fewer bytes arrived than Content-Length announced
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Result of one unit of work, tagged with the feed it belongs to.
#[derive(Debug)]
pub struct FetchOutcome {
    pub feed_id: i64,
    pub result: Result<IngestReport, Error>,
}

/// Headroom so the worker's own timeout always fires before reqwest's.
const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Build the shared HTTP client with the identifying `User-Agent`.
///
/// `timeout` is the worker's fetch timeout; the client's own limit sits a
/// little above it and only guards against a leaked request.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, NetworkError> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout.saturating_add(CLIENT_TIMEOUT_GRACE))
        .build()?;
    Ok(client)
}

/// Fetches one claimed feed, parses it and ingests the items.
///
/// Cloning is cheap: the HTTP client and the database are both handles to
/// shared pools.
#[derive(Clone)]
pub struct FetchWorker {
    client: reqwest::Client,
    ingester: PostIngester,
    timeout: Duration,
}

impl FetchWorker {
    pub fn new(client: reqwest::Client, db: Database, timeout: Duration) -> Self {
        Self {
            client,
            ingester: PostIngester::new(db),
            timeout,
        }
    }

    /// Run fetch → parse → ingest for a single feed.
    ///
    /// Never retries: a failed feed keeps the timestamp its claim wrote and
    /// comes round again once it is the least recently fetched.
    pub async fn process(&self, feed: &ClaimedFeed) -> FetchOutcome {
        let result = self.fetch_and_ingest(feed).await;

        match &result {
            Ok(report) => tracing::info!(
                feed_id = feed.id,
                feed = %feed.name,
                inserted = report.inserted,
                skipped = report.skipped,
                "Feed ingested"
            ),
            Err(e) => tracing::warn!(
                feed_id = feed.id,
                feed = %feed.name,
                url = %feed.url,
                kind = ?e.kind(),
                error = %e,
                "Feed fetch failed"
            ),
        }

        FetchOutcome {
            feed_id: feed.id,
            result,
        }
    }

    async fn fetch_and_ingest(&self, feed: &ClaimedFeed) -> Result<IngestReport, Error> {
        let bytes = self.fetch(&feed.url).await?;
        tracing::trace!(feed_id = feed.id, bytes = bytes.len(), "Fetched feed body");

        let parsed = parse_feed(&bytes)?;
        let report = self.ingester.ingest(feed.id, &parsed.items).await?;
        Ok(report)
    }

    /// GET the feed body, bounded by the fetch timeout end to end.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, NetworkError> {
        tokio::time::timeout(self.timeout, async {
            let response = self.client.get(url).send().await?;

            if !response.status().is_success() {
                return Err(NetworkError::HttpStatus(response.status().as_u16()));
            }

            read_limited_bytes(response, MAX_FEED_SIZE).await
        })
        .await
        .map_err(|_| NetworkError::Timeout(self.timeout))?
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, NetworkError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(NetworkError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(NetworkError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // Connection dropped before Content-Length bytes arrived
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(NetworkError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
