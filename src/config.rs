//! Configuration for the decoder and the expiring collection
//!
//! Configuration is plain data parsed from JSON. Every field has a default,
//! so an empty object `{}` is a valid configuration.

use serde::Deserialize;

use crate::error::ConfigError;
use crate::streaming::{DEFAULT_MAX_CARRY_BYTES, MIN_CARRY_BYTES};

/// Shortest period the cleaner will wait between passes
pub const MIN_CLEANUP_INTERVAL_MS: u64 = 1;

/// Top-level library configuration
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CommonsConfig {
    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub expiry: ExpiryConfig,
}

/// Settings for chunked stream decoding
#[derive(Clone, Debug, Deserialize)]
pub struct DecoderConfig {
    /// Bytes requested from the source per read
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Longest tail the boundary search may hold back as carry
    #[serde(default = "default_max_carry_bytes")]
    pub max_carry_bytes: usize,
}

/// Settings for [`crate::expiry::ExpiringCollection`] and its cleaner
#[derive(Clone, Debug, Deserialize)]
pub struct ExpiryConfig {
    /// Period between background cleanup passes
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// Maximum live elements; unbounded when absent
    #[serde(default)]
    pub capacity: Option<usize>,

    /// Refuse elements whose expiry is not in the future
    #[serde(default = "default_reject_past_due")]
    pub reject_past_due: bool,

    /// Gate hold time after which a deferred cleanup logs a stall warning
    #[serde(default = "default_gate_stall_warning_ms")]
    pub gate_stall_warning_ms: u64,
}

fn default_chunk_size() -> usize {
    4096
}

fn default_max_carry_bytes() -> usize {
    DEFAULT_MAX_CARRY_BYTES
}

fn default_cleanup_interval_ms() -> u64 {
    1000
}

fn default_reject_past_due() -> bool {
    true
}

fn default_gate_stall_warning_ms() -> u64 {
    30_000
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_carry_bytes: default_max_carry_bytes(),
        }
    }
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: default_cleanup_interval_ms(),
            capacity: None,
            reject_past_due: default_reject_past_due(),
            gate_stall_warning_ms: default_gate_stall_warning_ms(),
        }
    }
}

impl CommonsConfig {
    /// Parse configuration from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config_str = std::str::from_utf8(bytes)?;
        Ok(serde_json::from_str(config_str)?)
    }
}

impl DecoderConfig {
    /// Read size actually used; a zero chunk size would never make progress
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }

    /// Carry bound actually used; anything below the widest character would
    /// report valid boundary splits as malformed
    pub fn effective_max_carry_bytes(&self) -> usize {
        self.max_carry_bytes.max(MIN_CARRY_BYTES)
    }
}

impl ExpiryConfig {
    /// Cleanup period, never shorter than [`MIN_CLEANUP_INTERVAL_MS`]
    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.cleanup_interval_ms.max(MIN_CLEANUP_INTERVAL_MS))
    }
}
