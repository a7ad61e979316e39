//! Structured telemetry events
//!
//! Events are serialized to JSON and written through the `log` facade so any
//! installed logger can collect them. The library never installs a logger.

use log::{info, warn};
use serde::Serialize;

/// Prefix on every emitted event line
pub const EVENT_PREFIX: &str = "[STREAM-COMMONS]";

/// Event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A stream failed to decode under its declared encoding
    DecodeFailed,
    /// A cleanup pass ran to completion
    CleanupCompleted,
    /// A cleanup pass was skipped because the gate was held
    CleanupDeferred,
    /// The gate has been held longer than the configured warning threshold
    GateStalled,
    /// An insert was refused at capacity
    CollectionFull,
}

/// Telemetry event for logging
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evicted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub held_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            encoding: None,
            evicted: None,
            remaining: None,
            held_ms: None,
            capacity: None,
        }
    }

    pub fn with_encoding(mut self, encoding: &str) -> Self {
        self.encoding = Some(encoding.to_string());
        self
    }

    pub fn with_counts(mut self, evicted: usize, remaining: usize) -> Self {
        self.evicted = Some(evicted);
        self.remaining = Some(remaining);
        self
    }

    pub fn with_held_ms(mut self, held_ms: u64) -> Self {
        self.held_ms = Some(held_ms);
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Log the event
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => match self.event_type {
                EventType::DecodeFailed | EventType::GateStalled | EventType::CollectionFull => {
                    warn!("{} {}", EVENT_PREFIX, json);
                }
                EventType::CleanupCompleted | EventType::CleanupDeferred => {
                    info!("{} {}", EVENT_PREFIX, json);
                }
            },
            Err(e) => {
                warn!("Failed to serialize telemetry event: {}", e);
            }
        }
    }
}

pub fn decode_failed(encoding: &str) -> Event {
    Event::new(EventType::DecodeFailed).with_encoding(encoding)
}

pub fn cleanup_completed(evicted: usize, remaining: usize) -> Event {
    Event::new(EventType::CleanupCompleted).with_counts(evicted, remaining)
}

pub fn cleanup_deferred() -> Event {
    Event::new(EventType::CleanupDeferred)
}

pub fn gate_stalled(held_ms: u64) -> Event {
    Event::new(EventType::GateStalled).with_held_ms(held_ms)
}

pub fn collection_full(capacity: usize) -> Event {
    Event::new(EventType::CollectionFull).with_capacity(capacity)
}
