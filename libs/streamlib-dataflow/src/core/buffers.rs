// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Buffer cells for data exchange between two ports.
//!
//! A cell has exactly one writer (an output port) and one reader (an input
//! port). Its consumption policy is fixed at construction:
//!
//! - [`ConsumptionPolicy::LatestWins`]: one current slot. Writes replace it,
//!   reads return it without consuming. Stale frames are worthless for
//!   real-time video, so overwriting unread values is counted but not an error.
//! - [`ConsumptionPolicy::OrderedAll`]: bounded FIFO. Every value is read
//!   exactly once, in write order. A write into a full queue waits for a
//!   bounded time and is then rejected as a dropped chunk.
//!
//! Each entry remembers when it was written so a consumer can restrict reads
//! to values that existed when its tick was issued (see [`BufferCell::read_before`]).
//!
//! A cell whose reader is gone is [closed](BufferCell::close): writes into it
//! are discarded immediately and never wait.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::core::error::{Result, StreamError};

/// How a cell hands values to its reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionPolicy {
    /// Drop-stale: reads observe the most recent write.
    LatestWins,
    /// Never-drop: reads consume values oldest-first.
    OrderedAll { capacity: usize },
}

impl ConsumptionPolicy {
    pub fn is_ordered(&self) -> bool {
        matches!(self, ConsumptionPolicy::OrderedAll { .. })
    }
}

impl std::fmt::Display for ConsumptionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumptionPolicy::LatestWins => write!(f, "latest_wins"),
            ConsumptionPolicy::OrderedAll { capacity } => write!(f, "ordered_all({})", capacity),
        }
    }
}

struct Entry<T> {
    value: T,
    written_at: Instant,
}

enum Slots<T> {
    Latest {
        current: Option<Entry<T>>,
        // Value superseded by `current`, kept so a causal read can still be
        // served when `current` was written after the reader's cutoff.
        shadow: Option<Entry<T>>,
        current_read: bool,
    },
    Ordered {
        queue: VecDeque<Entry<T>>,
        capacity: usize,
    },
}

/// Point-in-time counters for a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CellStats {
    pub writes: u64,
    pub reads: u64,
    /// Latest-wins: values overwritten before anyone read them.
    pub dropped_frames: u64,
    /// Ordered-all: writes rejected because the queue stayed full.
    pub dropped_chunks: u64,
}

#[derive(Default)]
struct CellCounters {
    writes: AtomicU64,
    reads: AtomicU64,
    dropped_frames: AtomicU64,
    dropped_chunks: AtomicU64,
}

/// Single-producer/single-consumer handoff between two ports.
pub struct BufferCell<T> {
    label: String,
    policy: ConsumptionPolicy,
    slots: Mutex<Slots<T>>,
    space_available: Condvar,
    closed: AtomicBool,
    counters: CellCounters,
}

impl<T> BufferCell<T> {
    /// Create a cell with the given policy.
    ///
    /// # Panics
    ///
    /// Panics if an ordered-all capacity is 0.
    pub fn new(policy: ConsumptionPolicy) -> Self {
        let slots = match policy {
            ConsumptionPolicy::LatestWins => Slots::Latest {
                current: None,
                shadow: None,
                current_read: false,
            },
            ConsumptionPolicy::OrderedAll { capacity } => {
                assert!(
                    capacity >= 1,
                    "Ordered-all cell must have capacity >= 1, got {}",
                    capacity
                );
                Slots::Ordered {
                    queue: VecDeque::with_capacity(capacity),
                    capacity,
                }
            }
        };

        Self {
            label: String::from("cell"),
            policy,
            slots: Mutex::new(slots),
            space_available: Condvar::new(),
            closed: AtomicBool::new(false),
            counters: CellCounters::default(),
        }
    }

    pub fn latest_wins() -> Self {
        Self::new(ConsumptionPolicy::LatestWins)
    }

    pub fn ordered_all(capacity: usize) -> Self {
        Self::new(ConsumptionPolicy::OrderedAll { capacity })
    }

    /// Name used in error messages (typically the connection it backs).
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn policy(&self) -> ConsumptionPolicy {
        self.policy
    }

    /// Write without waiting.
    ///
    /// Latest-wins writes always succeed. Ordered-all writes into a full queue
    /// return [`StreamError::BufferFull`].
    pub fn try_write(&self, value: T) -> Result<()> {
        self.write_timeout(value, Duration::ZERO)
    }

    /// Write, waiting up to `timeout` for a free slot on a full ordered-all queue.
    ///
    /// Writes into a closed cell are discarded and succeed.
    pub fn write_timeout(&self, value: T, timeout: Duration) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let entry = Entry {
            value,
            written_at: Instant::now(),
        };
        let mut slots = self.slots.lock();

        if let Slots::Latest {
            current,
            shadow,
            current_read,
        } = &mut *slots
        {
            if current.is_some() && !*current_read {
                self.counters.dropped_frames.fetch_add(1, Ordering::Relaxed);
            }
            *shadow = current.replace(entry);
            *current_read = false;
        } else {
            let deadline = Instant::now() + timeout;
            let mut pending = entry;
            loop {
                if self.is_closed() {
                    return Ok(());
                }
                match Self::push_if_room(&mut slots, pending) {
                    Ok(()) => break,
                    Err(rejected) => pending = rejected,
                }
                if timeout.is_zero()
                    || self
                        .space_available
                        .wait_until(&mut slots, deadline)
                        .timed_out()
                {
                    if self.is_closed() {
                        return Ok(());
                    }
                    // A slot may have opened right at the deadline.
                    if Self::push_if_room(&mut slots, pending).is_err() {
                        self.counters.dropped_chunks.fetch_add(1, Ordering::Relaxed);
                        return Err(StreamError::BufferFull(self.label.clone()));
                    }
                    break;
                }
            }
        }

        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn push_if_room(slots: &mut Slots<T>, entry: Entry<T>) -> std::result::Result<(), Entry<T>> {
        match slots {
            Slots::Ordered { queue, capacity } if queue.len() < *capacity => {
                queue.push_back(entry);
                Ok(())
            }
            _ => Err(entry),
        }
    }

    /// Read according to the cell's policy.
    ///
    /// Latest-wins returns the current value without consuming it (repeated
    /// reads return the same value). Ordered-all consumes the oldest value.
    pub fn read(&self) -> Option<T>
    where
        T: Clone,
    {
        self.read_inner(None)
    }

    /// Like [`read`](Self::read), but ignores anything written after `cutoff`.
    ///
    /// A latest-wins cell falls back to the value the current one replaced
    /// if that older value predates the cutoff.
    pub fn read_before(&self, cutoff: Instant) -> Option<T>
    where
        T: Clone,
    {
        self.read_inner(Some(cutoff))
    }

    fn read_inner(&self, cutoff: Option<Instant>) -> Option<T>
    where
        T: Clone,
    {
        let visible = |entry: &Entry<T>| cutoff.is_none_or(|c| entry.written_at <= c);
        let mut slots = self.slots.lock();

        let value = match &mut *slots {
            Slots::Latest {
                current,
                shadow,
                current_read,
            } => match current {
                Some(entry) if visible(entry) => {
                    *current_read = true;
                    Some(entry.value.clone())
                }
                _ => shadow
                    .as_ref()
                    .filter(|entry| visible(entry))
                    .map(|entry| entry.value.clone()),
            },
            Slots::Ordered { queue, .. } => {
                let front_visible = queue.front().is_some_and(|entry| visible(entry));
                if front_visible {
                    let entry = queue.pop_front();
                    self.space_available.notify_one();
                    entry.map(|entry| entry.value)
                } else {
                    None
                }
            }
        };

        if value.is_some() {
            self.counters.reads.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Number of values a reader could still observe.
    ///
    /// Latest-wins reports 0 or 1 (whether a value has ever been written).
    pub fn len(&self) -> usize {
        match &*self.slots.lock() {
            Slots::Latest { current, .. } => usize::from(current.is_some()),
            Slots::Ordered { queue, .. } => queue.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset to the freshly constructed state (counters are kept).
    pub fn clear(&self) {
        match &mut *self.slots.lock() {
            Slots::Latest {
                current,
                shadow,
                current_read,
            } => {
                *current = None;
                *shadow = None;
                *current_read = false;
            }
            Slots::Ordered { queue, .. } => queue.clear(),
        }
        self.space_available.notify_all();
    }

    /// Detach the reader: drop buffered values, release waiting writers, and
    /// discard every later write. Closing is permanent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> CellStats {
        CellStats {
            writes: self.counters.writes.load(Ordering::Relaxed),
            reads: self.counters.reads.load(Ordering::Relaxed),
            dropped_frames: self.counters.dropped_frames.load(Ordering::Relaxed),
            dropped_chunks: self.counters.dropped_chunks.load(Ordering::Relaxed),
        }
    }
}

impl<T> std::fmt::Debug for BufferCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferCell")
            .field("label", &self.label)
            .field("policy", &self.policy)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
