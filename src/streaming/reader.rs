//! Drivers that feed a byte source through a [`ChunkedDecoder`]
//!
//! The source is taken by value and dropped as soon as the stream ends or
//! fails, so it is released on every exit path. Pass `&mut reader` to keep
//! ownership on the caller's side.

use encoding_rs::Encoding;
use log::debug;
use std::io::{self, Read};

use super::chunked_decoder::ChunkedDecoder;
use crate::config::DecoderConfig;
use crate::error::Result;

/// Iterator over decoded text fragments read from `R`.
///
/// Empty fragments (chunks held back entirely as carry) are skipped. The
/// final item is the tail produced by [`ChunkedDecoder::finish`], if any.
/// After an error the iterator is exhausted.
pub struct TextChunks<R> {
    source: Option<R>,
    decoder: Option<ChunkedDecoder>,
    buf: Vec<u8>,
}

impl<R: Read> TextChunks<R> {
    pub fn new(source: R, encoding: &'static Encoding, config: &DecoderConfig) -> Self {
        Self {
            source: Some(source),
            decoder: Some(ChunkedDecoder::from_config(encoding, config)),
            buf: vec![0u8; config.effective_chunk_size()],
        }
    }

    /// True while the source has not yet been released
    pub fn is_reading(&self) -> bool {
        self.source.is_some()
    }

    fn close(&mut self) {
        self.source = None;
        self.decoder = None;
    }
}

impl<R: Read> Iterator for TextChunks<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(source) = self.source.as_mut() {
            let n = match source.read(&mut self.buf) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.close();
                    return Some(Err(e.into()));
                }
            };

            if n == 0 {
                // End of stream: release the source before finishing
                self.source = None;
                break;
            }

            let decoder = self.decoder.as_mut()?;
            match decoder.decode(&self.buf[..n]) {
                Ok(text) if text.is_empty() => continue,
                Ok(text) => return Some(Ok(text)),
                Err(e) => {
                    self.close();
                    return Some(Err(e));
                }
            }
        }

        let decoder = self.decoder.take()?;
        debug!(
            "{} stream ended after {} bytes",
            decoder.encoding().name(),
            decoder.bytes_in()
        );
        match decoder.finish() {
            Ok(text) if text.is_empty() => None,
            result => Some(result),
        }
    }
}

/// Read `source` to the end and decode it as `encoding`.
pub fn decode_reader<R: Read>(
    source: R,
    encoding: &'static Encoding,
    config: &DecoderConfig,
) -> Result<String> {
    let mut out = String::new();
    for fragment in TextChunks::new(source, encoding, config) {
        out.push_str(&fragment?);
    }
    Ok(out)
}

/// Decode a sequence of chunks delivered by any byte source.
pub fn decode_chunks<I, B>(chunks: I, encoding: &'static Encoding, config: &DecoderConfig) -> Result<String>
where
    I: IntoIterator<Item = io::Result<B>>,
    B: AsRef<[u8]>,
{
    let mut decoder = ChunkedDecoder::from_config(encoding, config);
    let mut out = String::new();
    for chunk in chunks {
        out.push_str(&decoder.decode(chunk?.as_ref())?);
    }
    out.push_str(&decoder.finish()?);
    Ok(out)
}

/// Decode a complete in-memory buffer.
pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let mut decoder = ChunkedDecoder::new(encoding);
    let mut out = decoder.decode(bytes)?;
    out.push_str(&decoder.finish()?);
    Ok(out)
}
