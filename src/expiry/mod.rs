//! Time-expiring collection
//!
//! This module provides:
//! - A multiset whose elements expire at absolute times
//! - A scoped gate that keeps cleanup passes out of multi-step sequences
//! - A background cleaner thread and pluggable clocks

pub mod cleaner;
pub mod clock;
pub mod collection;

pub use cleaner::Cleaner;
pub use clock::{Clock, ManualClock, SystemClock};
pub use collection::{
    CleanerState, CleanupOutcome, CollectionStats, ExpiringCollection, GateGuard,
};
