//! The feed ingestion engine.
//!
//! - [`scheduler`] - Claims the least recently fetched feeds each tick and
//!   fans them out over a bounded pool
//! - [`fetcher`] - One HTTP retrieval under a timeout, handed to the parser
//!   and the ingester
//! - [`parser`] - RSS/Atom/JSON Feed → normalized items via `feed-rs`
//! - [`ingest`] - Insert-once persistence keyed on the item link
//!
//! # Example
//!
//! ```ignore
//! let client = build_client("gator", Duration::from_secs(30))?;
//! let worker = FetchWorker::new(client, db.clone(), Duration::from_secs(30));
//! let scheduler = FeedScheduler::new(db, worker, Duration::from_secs(60), 4);
//! scheduler.run(shutdown).await;
//! ```

pub mod fetcher;
pub mod ingest;
pub mod parser;
pub mod scheduler;

pub use fetcher::{build_client, FetchOutcome, FetchWorker, NetworkError};
pub use ingest::{IngestReport, PostIngester};
pub use parser::{parse_feed, ParseError, ParsedFeed, ParsedItem};
pub use scheduler::{CycleReport, FeedScheduler, RunSummary};
