//! Streaming text decoding
//!
//! This module turns chunked byte streams into text:
//! - Carries partial multi-byte characters across chunk boundaries
//! - Never buffers the whole input
//! - Releases the byte source on every exit path

pub mod chunked_decoder;
pub mod reader;

pub use chunked_decoder::{ChunkedDecoder, DEFAULT_MAX_CARRY_BYTES, MIN_CARRY_BYTES};
pub use reader::{decode_bytes, decode_chunks, decode_reader, TextChunks};
