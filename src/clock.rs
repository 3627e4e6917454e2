//! Monotonic clock and time-ordered scheduling queue.
//!
//! Everything in the hub that is time-based — brightness fades, future-dated
//! outbound messages, reconnect deadlines — runs off a single monotonic
//! microsecond counter anchored at process start. Wall-clock time is never
//! consulted, so NTP steps and suspend/resume cannot reorder scheduled work.
//!
//! The anchor is a [`tokio::time::Instant`], which means the whole timing
//! stack (including `sleep_until` in the event loop) is driven by tokio's
//! clock and can be frozen and stepped in tests via `tokio::time::pause`.

// Rust guideline compliant 2026-03

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Monotonic microsecond clock.
///
/// `now_us()` is microseconds since the clock was created. Conversions back
/// to [`Instant`] (for `sleep_until` deadlines) go through [`Clock::instant_at`].
#[derive(Debug, Clone)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    /// Anchor a new clock at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Microseconds elapsed since the anchor.
    #[must_use]
    pub fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    /// The instant corresponding to `at_us` microseconds after the anchor.
    #[must_use]
    pub fn instant_at(&self, at_us: u64) -> Instant {
        self.origin + Duration::from_micros(at_us)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// A queued entry: fire time, insertion sequence, payload.
#[derive(Debug)]
struct Entry<T> {
    at_us: u64,
    seq: u64,
    item: T,
}

/// Time-ordered queue with stable FIFO ordering among equal timestamps.
///
/// Used both for the hub's scheduled calls and for each remote's
/// future-dated outbound messages. Timestamps are monotonic non-decreasing
/// from head to tail; ties preserve insertion order via a sequence counter.
#[derive(Debug)]
pub struct Timeline<T> {
    entries: VecDeque<Entry<T>>,
    next_seq: u64,
}

impl<T> Timeline<T> {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_seq: 0,
        }
    }

    /// Insert `item` to fire at `at_us`, after any entry with the same time.
    pub fn push(&mut self, at_us: u64, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        // All entries with at_us <= the new time sort before it; inserting at
        // the partition point keeps equal timestamps in insertion order.
        let idx = self.entries.partition_point(|e| e.at_us <= at_us);
        self.entries.insert(idx, Entry { at_us, seq, item });
    }

    /// Remove and return every entry due at `now`, in firing order.
    ///
    /// The due entries are detached *before* the caller runs any of them, so
    /// work scheduled from inside a callback lands in the queue and fires on
    /// the next pass rather than being re-entered in this one.
    pub fn take_due(&mut self, now_us: u64) -> Vec<T> {
        let split = self.entries.partition_point(|e| e.at_us <= now_us);
        self.entries.drain(..split).map(|e| e.item).collect()
    }

    /// Fire time of the earliest entry, if any.
    #[must_use]
    pub fn next_at(&self) -> Option<u64> {
        self.entries.front().map(|e| e.at_us)
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every queued entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over `(fire_time, item)` pairs in firing order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.entries.iter().map(|e| (e.at_us, &e.item))
    }
}

impl<T> Default for Timeline<T> {
    fn default() -> Self {
        Self::new()
    }
}
