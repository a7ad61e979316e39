//! Time-expiring concurrent collection
//!
//! Every element carries an absolute expiry time. Reads skip expired elements
//! straight away; physical removal happens in [`ExpiringCollection::cleanup`],
//! which a background [`Cleaner`](super::Cleaner) or any external scheduler
//! calls periodically.
//!
//! # Gate
//!
//! Single calls are atomic through the internal lock. A caller running a
//! multi-step sequence (iterate, then remove what it saw) takes a
//! [`GateGuard`] first. While any guard is alive, cleanup passes are deferred
//! to the next cycle instead of waiting. A scan holds the gate's lock for one
//! linear pass, so `acquire` waits at most that long.

use log::{debug, trace, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use super::clock::{Clock, SystemClock};
use crate::config::ExpiryConfig;
use crate::error::CollectionError;
use crate::telemetry;

#[derive(Debug)]
struct Entry<T> {
    value: T,
    expires_at: u64,
}

impl<T> Entry<T> {
    /// An element is gone from the moment its expiry time is reached
    fn is_live(&self, now: u64) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
struct GateState {
    holders: usize,
    held_since: Option<Instant>,
    stall_reported: bool,
}

/// Cleaner side of the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanerState {
    Idle,
    Scanning,
}

/// Result of one call to [`ExpiringCollection::cleanup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The gate was held; nothing was touched
    Deferred,
    /// The scan ran and evicted `evicted` elements
    Completed { evicted: usize, remaining: usize },
}

impl CleanupOutcome {
    pub fn is_deferred(&self) -> bool {
        matches!(self, CleanupOutcome::Deferred)
    }

    pub fn evicted(&self) -> usize {
        match self {
            CleanupOutcome::Completed { evicted, .. } => *evicted,
            CleanupOutcome::Deferred => 0,
        }
    }
}

/// Counters for cleanup activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    /// Completed cleanup passes
    pub passes: u64,
    /// Passes skipped because the gate was held
    pub deferred: u64,
    /// Elements physically evicted by cleanup
    pub evicted: u64,
    /// Stall warnings raised for long-held gates
    pub stalls: u64,
    /// Elements physically stored, including expired ones not yet evicted
    pub stored: usize,
}

/// Multiset of values that expire at caller-chosen times.
pub struct ExpiringCollection<T, C = SystemClock> {
    entries: RwLock<Vec<Entry<T>>>,
    gate: Mutex<GateState>,
    scanning: AtomicBool,
    clock: C,
    config: ExpiryConfig,
    passes: AtomicU64,
    deferred: AtomicU64,
    evicted: AtomicU64,
    stalls: AtomicU64,
}

impl<T> ExpiringCollection<T, SystemClock> {
    pub fn new() -> Self {
        Self::with_config(ExpiryConfig::default())
    }

    pub fn with_config(config: ExpiryConfig) -> Self {
        Self::with_clock(SystemClock, config)
    }
}

impl<T> Default for ExpiringCollection<T, SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C: Clock> ExpiringCollection<T, C> {
    pub fn with_clock(clock: C, config: ExpiryConfig) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            gate: Mutex::new(GateState::default()),
            scanning: AtomicBool::new(false),
            clock,
            config,
            passes: AtomicU64::new(0),
            deferred: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            stalls: AtomicU64::new(0),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &ExpiryConfig {
        &self.config
    }

    /// Insert `value` until `expires_at` (milliseconds since the UNIX epoch).
    ///
    /// Returns `Ok(false)` when `reject_past_due` is set and the expiry time
    /// has already been reached.
    ///
    /// # Errors
    /// `CollectionError::Full` when a capacity is configured and that many
    /// live elements are stored.
    pub fn add(&self, value: T, expires_at: u64) -> Result<bool, CollectionError> {
        let now = self.clock.now_millis();
        if self.config.reject_past_due && expires_at <= now {
            debug!("rejecting element already past due ({} <= {})", expires_at, now);
            return Ok(false);
        }

        let mut entries = self.write_entries();
        if let Some(capacity) = self.config.capacity {
            let live = entries.iter().filter(|e| e.is_live(now)).count();
            if live >= capacity {
                drop(entries);
                telemetry::collection_full(capacity).emit();
                return Err(CollectionError::Full { capacity });
            }
        }
        entries.push(Entry { value, expires_at });
        Ok(true)
    }

    /// Insert `value` for `ttl` from the clock's current time.
    pub fn add_for(&self, value: T, ttl: Duration) -> Result<bool, CollectionError> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expires_at = self.clock.now_millis().saturating_add(ttl_ms);
        self.add(value, expires_at)
    }

    /// Number of live elements
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.read_entries().iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        let now = self.clock.now_millis();
        !self.read_entries().iter().any(|e| e.is_live(now))
    }

    /// Remove every element, expired or not.
    pub fn clear(&self) {
        self.write_entries().clear();
    }

    /// Enter the gate. Cleanup passes are deferred until every guard drops.
    pub fn acquire(&self) -> GateGuard<'_> {
        let mut gate = self.lock_gate();
        gate.holders += 1;
        if gate.holders == 1 {
            gate.held_since = Some(Instant::now());
        }
        trace!("gate acquired ({} holders)", gate.holders);
        GateGuard {
            gate: &self.gate,
            acquired_at: Instant::now(),
        }
    }

    /// True while at least one [`GateGuard`] is alive
    pub fn is_gated(&self) -> bool {
        self.lock_gate().holders > 0
    }

    pub fn cleaner_state(&self) -> CleanerState {
        if self.scanning.load(Ordering::Acquire) {
            CleanerState::Scanning
        } else {
            CleanerState::Idle
        }
    }

    /// Run one cleanup pass now.
    ///
    /// The gate is checked once, before scanning. If it is held the pass is
    /// skipped; it never waits for a holder.
    pub fn cleanup(&self) -> CleanupOutcome {
        let mut gate = self.lock_gate();
        if gate.holders > 0 {
            self.deferred.fetch_add(1, Ordering::Relaxed);
            let held = gate.held_since.map(|t| t.elapsed()).unwrap_or_default();
            debug!(
                "cleanup deferred: gate held by {} caller(s) for {:?}",
                gate.holders, held
            );
            telemetry::cleanup_deferred().emit();

            let held_ms = u64::try_from(held.as_millis()).unwrap_or(u64::MAX);
            if held_ms >= self.config.gate_stall_warning_ms && !gate.stall_reported {
                gate.stall_reported = true;
                self.stalls.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "gate held for {}ms, cleanup starved (threshold {}ms)",
                    held_ms, self.config.gate_stall_warning_ms
                );
                telemetry::gate_stalled(held_ms).emit();
            }
            return CleanupOutcome::Deferred;
        }

        // The gate lock stays held for the scan so no sequence starts mid-pass
        self.scanning.store(true, Ordering::Release);
        let now = self.clock.now_millis();
        let (evicted, remaining) = {
            let mut entries = self.write_entries();
            let before = entries.len();
            entries.retain(|e| e.is_live(now));
            (before - entries.len(), entries.len())
        };
        self.scanning.store(false, Ordering::Release);
        drop(gate);

        self.passes.fetch_add(1, Ordering::Relaxed);
        self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        if evicted > 0 {
            telemetry::cleanup_completed(evicted, remaining).emit();
        } else {
            trace!("cleanup pass found nothing to evict ({} stored)", remaining);
        }
        CleanupOutcome::Completed { evicted, remaining }
    }

    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            passes: self.passes.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            stalls: self.stalls.load(Ordering::Relaxed),
            stored: self.read_entries().len(),
        }
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Vec<Entry<T>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Vec<Entry<T>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_gate(&self) -> MutexGuard<'_, GateState> {
        lock_gate(&self.gate)
    }
}

impl<T: PartialEq, C: Clock> ExpiringCollection<T, C> {
    pub fn contains(&self, value: &T) -> bool {
        let now = self.clock.now_millis();
        self.read_entries()
            .iter()
            .any(|e| e.is_live(now) && e.value == *value)
    }

    /// Remove one live occurrence of `value`.
    pub fn remove(&self, value: &T) -> bool {
        let now = self.clock.now_millis();
        let mut entries = self.write_entries();
        match entries
            .iter()
            .position(|e| e.is_live(now) && e.value == *value)
        {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }
}

impl<T: Clone, C: Clock> ExpiringCollection<T, C> {
    /// Snapshot of live values in insertion order
    pub fn values(&self) -> Vec<T> {
        let now = self.clock.now_millis();
        self.read_entries()
            .iter()
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
            .collect()
    }

    /// Iterate over a snapshot of live values.
    ///
    /// Take a [`GateGuard`] first when later steps depend on what the
    /// iteration observed.
    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.values().into_iter()
    }
}

fn lock_gate(gate: &Mutex<GateState>) -> MutexGuard<'_, GateState> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scoped hold on the gate. Dropping it releases the gate.
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    gate: &'a Mutex<GateState>,
    acquired_at: Instant,
}

impl GateGuard<'_> {
    /// How long this guard has been held
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut gate = lock_gate(self.gate);
        gate.holders = gate.holders.saturating_sub(1);
        if gate.holders == 0 {
            gate.held_since = None;
            gate.stall_reported = false;
        }
        trace!("gate released ({} holders)", gate.holders);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiry::clock::ManualClock;
    use std::sync::Arc;
    use std::thread;

    fn collection(clock: &ManualClock) -> ExpiringCollection<&'static str, ManualClock> {
        ExpiringCollection::with_clock(clock.clone(), ExpiryConfig::default())
    }

    #[test]
    fn test_add_and_read() {
        let clock = ManualClock::new(1_000);
        let items = collection(&clock);

        assert!(items.add("a", 2_000).unwrap());
        assert!(items.add("b", 3_000).unwrap());
        assert!(items.contains(&"a"));
        assert!(!items.contains(&"z"));
        assert_eq!(items.len(), 2);
        assert!(!items.is_empty());
    }

    #[test]
    fn test_expired_hidden_before_cleanup() {
        let clock = ManualClock::new(1_000);
        let items = collection(&clock);
        items.add("a", 1_500).unwrap();

        clock.set(1_600);
        assert!(!items.contains(&"a"));
        assert_eq!(items.len(), 0);
        assert!(items.is_empty());
        assert_eq!(items.stats().stored, 1);

        let outcome = items.cleanup();
        assert_eq!(outcome, CleanupOutcome::Completed { evicted: 1, remaining: 0 });
        assert_eq!(items.stats().stored, 0);
        assert!(!items.contains(&"a"));
    }

    #[test]
    fn test_expiry_time_itself_is_expired() {
        let clock = ManualClock::new(1_000);
        let items = collection(&clock);
        items.add("a", 1_500).unwrap();
        clock.set(1_500);
        assert!(!items.contains(&"a"));
    }

    #[test]
    fn test_past_due_rejected() {
        let clock = ManualClock::new(1_000);
        let items = collection(&clock);
        assert!(!items.add("late", 1_000).unwrap());
        assert!(!items.add("later", 10).unwrap());
        assert_eq!(items.stats().stored, 0);
    }

    #[test]
    fn test_past_due_accepted_when_allowed() {
        let clock = ManualClock::new(1_000);
        let config = ExpiryConfig {
            reject_past_due: false,
            ..Default::default()
        };
        let items = ExpiringCollection::with_clock(clock, config);
        assert!(items.add("late", 500).unwrap());
        // Stored but never visible
        assert!(!items.contains(&"late"));
        assert_eq!(items.cleanup().evicted(), 1);
    }

    #[test]
    fn test_add_for_ttl() {
        let clock = ManualClock::new(1_000);
        let items = collection(&clock);
        items.add_for("a", Duration::from_millis(250)).unwrap();
        clock.advance(249);
        assert!(items.contains(&"a"));
        clock.advance(1);
        assert!(!items.contains(&"a"));
    }

    #[test]
    fn test_gate_defers_cleanup() {
        let clock = ManualClock::new(1_000);
        let items = collection(&clock);
        items.add("short", 1_500).unwrap();
        items.add("long", 5_000).unwrap();
        clock.set(2_000);

        {
            let _guard = items.acquire();
            assert!(items.is_gated());
            let before = items.len();
            assert!(items.cleanup().is_deferred());
            assert!(items.cleanup().is_deferred());
            assert_eq!(items.len(), before);
            assert_eq!(items.stats().stored, 2);
        }

        assert!(!items.is_gated());
        assert_eq!(items.cleanup(), CleanupOutcome::Completed { evicted: 1, remaining: 1 });
        let stats = items.stats();
        assert_eq!(stats.deferred, 2);
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.evicted, 1);
    }

    #[test]
    fn test_guard_reports_hold_time() {
        let items: ExpiringCollection<u32> = ExpiringCollection::new();
        let guard = items.acquire();
        thread::sleep(Duration::from_millis(10));
        assert!(guard.held_for() >= Duration::from_millis(10));
    }

    #[test]
    fn test_stats_and_state_serialize() {
        let clock = ManualClock::new(0);
        let items = collection(&clock);
        items.add("a", 10).unwrap();
        clock.set(10);
        items.cleanup();

        let json = serde_json::to_string(&items.stats()).unwrap();
        assert!(json.contains("\"passes\":1"));
        assert!(json.contains("\"evicted\":1"));
        assert!(json.contains("\"stored\":0"));

        let state = serde_json::to_string(&items.cleaner_state()).unwrap();
        assert_eq!(state, "\"idle\"");
    }

    #[test]
    fn test_nested_guards() {
        let clock = ManualClock::new(0);
        let items = collection(&clock);
        let first = items.acquire();
        let second = items.acquire();
        drop(first);
        assert!(items.is_gated());
        assert!(items.cleanup().is_deferred());
        drop(second);
        assert!(!items.is_gated());
        assert!(!items.cleanup().is_deferred());
    }

    #[test]
    fn test_gated_iterate_then_remove() {
        let clock = ManualClock::new(0);
        let items = collection(&clock);
        items.add("keep", 100).unwrap();
        items.add("drop", 100).unwrap();

        let guard = items.acquire();
        for value in items.iter() {
            if value.starts_with('d') {
                assert!(items.remove(&value));
            }
        }
        drop(guard);
        assert_eq!(items.values(), vec!["keep"]);
    }

    #[test]
    fn test_clear_then_empty() {
        let clock = ManualClock::new(0);
        let items = collection(&clock);
        items.add("a", 10).unwrap();
        items.add("b", 1_000_000).unwrap();
        items.clear();
        assert!(items.is_empty());
        assert_eq!(items.stats().stored, 0);
    }

    #[test]
    fn test_duplicates_and_remove_one() {
        let clock = ManualClock::new(0);
        let items = collection(&clock);
        items.add("x", 10).unwrap();
        items.add("x", 20).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.remove(&"x"));
        assert_eq!(items.len(), 1);
        assert!(items.contains(&"x"));
        assert!(items.remove(&"x"));
        assert!(!items.remove(&"x"));
    }

    #[test]
    fn test_remove_ignores_expired() {
        let clock = ManualClock::new(0);
        let items = collection(&clock);
        items.add("x", 10).unwrap();
        clock.set(10);
        assert!(!items.remove(&"x"));
    }

    #[test]
    fn test_values_in_insertion_order() {
        let clock = ManualClock::new(0);
        let items = collection(&clock);
        items.add("c", 30).unwrap();
        items.add("a", 10).unwrap();
        items.add("b", 20).unwrap();
        assert_eq!(items.values(), vec!["c", "a", "b"]);
        clock.set(15);
        assert_eq!(items.iter().collect::<Vec<_>>(), vec!["c", "b"]);
    }

    #[test]
    fn test_capacity_counts_live_elements() {
        let clock = ManualClock::new(0);
        let config = ExpiryConfig {
            capacity: Some(2),
            ..Default::default()
        };
        let items = ExpiringCollection::with_clock(clock.clone(), config);
        items.add("a", 10).unwrap();
        items.add("b", 100).unwrap();
        assert_eq!(items.add("c", 100), Err(CollectionError::Full { capacity: 2 }));

        clock.set(10);
        assert_eq!(items.add("c", 100), Ok(true));
    }

    #[test]
    fn test_stall_reported_once_per_hold() {
        let clock = ManualClock::new(0);
        let config = ExpiryConfig {
            gate_stall_warning_ms: 0,
            ..Default::default()
        };
        let items: ExpiringCollection<u32, _> = ExpiringCollection::with_clock(clock, config);

        let guard = items.acquire();
        items.cleanup();
        items.cleanup();
        assert_eq!(items.stats().stalls, 1);
        drop(guard);

        let _guard = items.acquire();
        items.cleanup();
        assert_eq!(items.stats().stalls, 2);
    }

    #[test]
    fn test_cleaner_state_idle_outside_scan() {
        let items: ExpiringCollection<u32> = ExpiringCollection::new();
        assert_eq!(items.cleaner_state(), CleanerState::Idle);
        items.cleanup();
        assert_eq!(items.cleaner_state(), CleanerState::Idle);
    }

    #[test]
    fn test_concurrent_writers_and_cleanup() {
        let clock = ManualClock::new(0);
        let items: Arc<ExpiringCollection<u32, ManualClock>> =
            Arc::new(ExpiringCollection::with_clock(clock.clone(), ExpiryConfig::default()));

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let items = Arc::clone(&items);
                thread::spawn(move || {
                    for i in 0..250u32 {
                        // Even values expire at 50, odd ones at 1000
                        let expires_at = if i % 2 == 0 { 50 } else { 1_000 };
                        items.add(t * 1_000 + i, expires_at).unwrap();
                    }
                })
            })
            .collect();

        let cleaner = {
            let items = Arc::clone(&items);
            thread::spawn(move || {
                for _ in 0..100 {
                    items.cleanup();
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        cleaner.join().unwrap();

        assert_eq!(items.len(), 1_000);
        clock.set(50);
        assert_eq!(items.len(), 500);
        items.cleanup();
        assert_eq!(items.stats().stored, 500);
    }
}
