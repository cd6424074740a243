//! Crate-level error type.
//!
//! Each layer owns a small `thiserror` enum; this one wraps them so the
//! scheduler and the command layer can branch on the failure class with
//! [`Error::kind`] instead of matching every variant.

use thiserror::Error;

use crate::config::ConfigError;
use crate::feed::{NetworkError, ParseError};
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A command argument was rejected before touching the store.
    #[error("{0}")]
    InvalidInput(String),

    /// Writing command output failed.
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure class of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Store,
    Network,
    Parse,
    InvalidInput,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::Store(_) => ErrorKind::Store,
            Error::Network(_) => ErrorKind::Network,
            Error::Parse(_) => ErrorKind::Parse,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_wrapped_error() {
        let store: Error = StoreError::not_found("user", "bob").into();
        assert_eq!(store.kind(), ErrorKind::Store);

        let network: Error = NetworkError::HttpStatus(404).into();
        assert_eq!(network.kind(), ErrorKind::Network);

        let parse: Error = ParseError::Malformed("eof".into()).into();
        assert_eq!(parse.kind(), ErrorKind::Parse);

        assert_eq!(Error::invalid_input("bad").kind(), ErrorKind::InvalidInput);
        assert_eq!(Error::from(ConfigError::NoCurrentUser).kind(), ErrorKind::Config);
    }

    #[test]
    fn test_display_is_transparent() {
        let err: Error = NetworkError::HttpStatus(503).into();
        assert_eq!(err.to_string(), "HTTP error: status 503");
    }
}
