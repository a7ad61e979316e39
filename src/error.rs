//! Error types for stream-commons.
//!
//! Both components fail fast and surface the first error. Nothing here is
//! retried internally.

use thiserror::Error;

/// Errors raised while decoding a chunked byte stream into text.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes do not decode under the declared encoding, even after
    /// allowing for a character split at a chunk boundary.
    #[error("content not in declared encoding ({encoding})")]
    Malformed { encoding: &'static str },

    /// The byte source failed. The source has already been dropped.
    #[error("byte source I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No encoding is registered under the requested label.
    #[error("unknown encoding label: {0:?}")]
    UnknownEncoding(String),
}

impl DecodeError {
    /// Name of the declared encoding for malformed-input errors.
    pub fn encoding(&self) -> Option<&'static str> {
        match self {
            DecodeError::Malformed { encoding } => Some(encoding),
            _ => None,
        }
    }

    /// True when the input itself is at fault rather than the source.
    pub fn is_malformed(&self) -> bool {
        matches!(self, DecodeError::Malformed { .. })
    }
}

/// Errors raised by [`crate::expiry::ExpiringCollection`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    /// The collection already holds `capacity` live elements.
    #[error("collection full: capacity {capacity} reached")]
    Full { capacity: usize },
}

/// Configuration parsing errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Result alias for decoding operations.
pub type Result<T> = std::result::Result<T, DecodeError>;
