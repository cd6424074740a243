//! gator: a multi-user RSS/Atom aggregator.
//!
//! Users follow feeds; a periodic collector claims the least recently fetched
//! feeds, fetches them over a bounded pool and stores every new post exactly
//! once in SQLite.

pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod storage;
pub mod util;

pub use error::{Error, ErrorKind};
