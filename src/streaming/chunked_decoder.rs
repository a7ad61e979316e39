//! Charset-safe chunked decoder
//!
//! Multi-byte characters can split across chunk boundaries. The decoder keeps
//! the undecodable tail of each chunk as carry bytes and prepends them to the
//! next chunk, so a character cut in half by the transport is decoded whole
//! once its remaining bytes arrive.
//!
//! The boundary search trims the combined buffer from the tail one byte at a
//! time until a prefix decodes. It gives up after [`DEFAULT_MAX_CARRY_BYTES`]
//! (or the configured bound), which assumes the encoding's widest character is
//! a handful of bytes. Raise the bound for wider encodings.
//!
//! Encodings with stateful shift sequences (ISO-2022-JP) are not supported:
//! each chunk is decoded from the initial shift state.

use encoding_rs::{Encoding, UTF_8};
use log::{trace, warn};
use std::borrow::Cow;

use crate::config::DecoderConfig;
use crate::error::{DecodeError, Result};
use crate::telemetry;

/// Default bound on the boundary search, in bytes trimmed from the tail.
pub const DEFAULT_MAX_CARRY_BYTES: usize = 10;

/// Smallest carry bound accepted from configuration: the widest UTF-8 or
/// GB18030 character.
pub const MIN_CARRY_BYTES: usize = 4;

/// Incremental decoder for one byte stream.
///
/// Construct one per stream. After the last chunk call [`finish`], which
/// reports input that ended mid-character.
///
/// [`finish`]: ChunkedDecoder::finish
#[derive(Debug)]
pub struct ChunkedDecoder {
    encoding: &'static Encoding,
    /// Tail of the previous chunk that did not yet form a complete character
    carry: Vec<u8>,
    max_carry_bytes: usize,
    /// Set once the stream has failed; every later call fails the same way
    poisoned: bool,
    bytes_in: u64,
}

impl ChunkedDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self::with_max_carry(encoding, DEFAULT_MAX_CARRY_BYTES)
    }

    /// Create a decoder whose boundary search trims at most `max_carry_bytes`.
    pub fn with_max_carry(encoding: &'static Encoding, max_carry_bytes: usize) -> Self {
        Self {
            encoding,
            carry: Vec::new(),
            max_carry_bytes,
            poisoned: false,
            bytes_in: 0,
        }
    }

    pub fn from_config(encoding: &'static Encoding, config: &DecoderConfig) -> Self {
        Self::with_max_carry(encoding, config.effective_max_carry_bytes())
    }

    /// Resolve a WHATWG encoding label such as `"utf-8"` or `"sjis"`.
    pub fn for_label(label: &str) -> Result<Self> {
        Encoding::for_label(label.trim().as_bytes())
            .map(Self::new)
            .ok_or_else(|| DecodeError::UnknownEncoding(label.to_string()))
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Number of bytes currently held back for the next chunk
    pub fn carry_len(&self) -> usize {
        self.carry.len()
    }

    /// Total bytes fed through [`decode`](ChunkedDecoder::decode)
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Decode the next chunk, returning the text it completes.
    ///
    /// The returned fragment may be empty when the whole chunk was held back
    /// as carry.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String> {
        if self.poisoned {
            return Err(self.malformed());
        }
        if chunk.is_empty() {
            return Ok(String::new());
        }
        self.bytes_in += chunk.len() as u64;

        let combined: Cow<'_, [u8]> = if self.carry.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut buf = std::mem::take(&mut self.carry);
            buf.extend_from_slice(chunk);
            Cow::Owned(buf)
        };

        if let Some(text) = decode_exact(self.encoding, &combined) {
            return Ok(text);
        }

        // Incomplete sequence at the tail: find the longest prefix that decodes
        let max_trim = self.max_carry_bytes.min(combined.len());
        for trim in 1..=max_trim {
            let split = combined.len() - trim;
            if let Some(text) = decode_exact(self.encoding, &combined[..split]) {
                self.carry = combined[split..].to_vec();
                trace!(
                    "{}: holding {} carry bytes after {} decoded bytes",
                    self.encoding.name(),
                    trim,
                    split
                );
                return Ok(text);
            }
        }

        // Every trim failed, so the buffer as a whole is malformed
        Err(self.fail(combined.len()))
    }

    /// End the stream, decoding whatever carry remains on its own.
    pub fn finish(mut self) -> Result<String> {
        if self.poisoned {
            return Err(self.malformed());
        }
        if self.carry.is_empty() {
            return Ok(String::new());
        }
        match decode_exact(self.encoding, &self.carry) {
            Some(text) => {
                self.carry.clear();
                Ok(text)
            }
            None => {
                let pending = self.carry.len();
                Err(self.fail(pending))
            }
        }
    }

    fn fail(&mut self, pending: usize) -> DecodeError {
        self.poisoned = true;
        self.carry.clear();
        warn!(
            "content not in declared encoding {} ({} undecodable bytes pending after {} bytes read)",
            self.encoding.name(),
            pending,
            self.bytes_in
        );
        telemetry::decode_failed(self.encoding.name()).emit();
        self.malformed()
    }

    fn malformed(&self) -> DecodeError {
        DecodeError::Malformed {
            encoding: self.encoding.name(),
        }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new(UTF_8)
    }
}

/// Decode `bytes` completely, with no replacement characters and no BOM
/// sniffing. `None` when any part is malformed or a sequence is incomplete.
fn decode_exact(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
}
