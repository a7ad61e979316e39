//! stream-commons: charset-safe stream decoding and expiring collections
//!
//! Two independent components:
//! - `streaming`: decodes a chunked byte stream into text under a declared
//!   encoding, carrying characters split across chunk boundaries
//! - `expiry`: a concurrent multiset whose elements expire at absolute times,
//!   with a background cleaner and a scoped gate for multi-step sequences
//!
//! Logging goes through the `log` facade; structured events are emitted by
//! `telemetry`. Install any `log` backend to collect them.
//!
//! ```
//! use stream_commons::streaming::decode_reader;
//! use stream_commons::config::DecoderConfig;
//!
//! let bytes = "naïve café".as_bytes();
//! let config = DecoderConfig { chunk_size: 3, ..Default::default() };
//! let text = decode_reader(bytes, stream_commons::encoding_rs::UTF_8, &config).unwrap();
//! assert_eq!(text, "naïve café");
//! ```

pub mod config;
pub mod error;
pub mod expiry;
pub mod streaming;
pub mod telemetry;

pub use config::{CommonsConfig, DecoderConfig, ExpiryConfig};
pub use error::{CollectionError, ConfigError, DecodeError, Result};
pub use expiry::{Cleaner, CleanupOutcome, ExpiringCollection, GateGuard};
pub use streaming::{decode_reader, ChunkedDecoder, TextChunks};

// The encoding registry is part of the public API
pub use encoding_rs;
