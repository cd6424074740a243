//! Small helpers shared by the parser and the command layer.
//!
//! - **Text**: HTML entity decoding for feed text, terminal-safe output
//! - **Durations**: Go-style interval strings for the aggregation loop
//! - **URL validation**: SSRF guard for feed URLs

mod duration;
mod text;
mod url_validator;

pub use duration::{parse_interval, DurationParseError};
pub use text::{decode_entities, strip_control_chars, truncate_to_width};
pub use url_validator::{validate_feed_url, UrlValidationError};
