// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Tick broadcasting for independent handler execution.
//!
//! The coordinator hands every tick to every subscriber through a bounded
//! channel using non-blocking sends. A subscriber whose queue is full (the
//! handler is still busy) misses that tick and the miss is counted; the clock
//! is never blocked by a handler.
//!
//! Cooperative handlers subscribe with a tokio channel, isolated handlers
//! with a crossbeam channel so their OS thread can `for tick in rx`.
//! Dropping the broadcaster closes every channel, which is how handler loops
//! are told to exit.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::core::clocks::Tick;

const HISTORY_LEN: usize = 64;

/// Issue times of recently broadcast ticks.
///
/// Lets a handler still working on tick N find out when tick N+1 went out,
/// so it can ignore data produced in response to N+1.
#[derive(Debug, Default)]
pub struct TickHistory {
    recent: Mutex<VecDeque<(u64, Instant)>>,
}

impl TickHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tick: &Tick) {
        let mut recent = self.recent.lock();
        if recent.len() == HISTORY_LEN {
            recent.pop_front();
        }
        recent.push_back((tick.frame_number, tick.issued_at));
    }

    /// When the first tick after `frame_number` was issued, if it has been.
    pub fn issued_after(&self, frame_number: u64) -> Option<Instant> {
        let recent = self.recent.lock();
        recent
            .iter()
            .find(|(frame, _)| *frame > frame_number)
            .map(|(_, issued_at)| *issued_at)
    }

    pub fn clear(&self) {
        self.recent.lock().clear();
    }
}

enum TickSender {
    Task(tokio::sync::mpsc::Sender<Tick>),
    Thread(crossbeam_channel::Sender<Tick>),
}

enum SendOutcome {
    Delivered,
    Busy,
    Closed,
}

impl TickSender {
    fn try_send(&self, tick: Tick) -> SendOutcome {
        match self {
            TickSender::Task(tx) => match tx.try_send(tick) {
                Ok(()) => SendOutcome::Delivered,
                Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => SendOutcome::Busy,
                Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
            },
            TickSender::Thread(tx) => match tx.try_send(tick) {
                Ok(()) => SendOutcome::Delivered,
                Err(crossbeam_channel::TrySendError::Full(_)) => SendOutcome::Busy,
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => SendOutcome::Closed,
            },
        }
    }
}

struct Subscriber {
    label: String,
    sender: TickSender,
    dropped: Arc<AtomicU64>,
}

/// Fans each tick out to all subscribers.
pub struct TickBroadcaster {
    subscribers: Vec<Subscriber>,
    queue_depth: usize,
    history: Arc<TickHistory>,
}

impl TickBroadcaster {
    /// Create a broadcaster whose subscriber queues hold `queue_depth` ticks.
    pub fn new(queue_depth: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            queue_depth: queue_depth.max(1),
            history: Arc::new(TickHistory::new()),
        }
    }

    pub fn with_history(mut self, history: Arc<TickHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn history(&self) -> &Arc<TickHistory> {
        &self.history
    }

    /// Subscribe an async task. Missed ticks are added to `dropped`.
    pub fn subscribe_task(
        &mut self,
        label: impl Into<String>,
        dropped: Arc<AtomicU64>,
    ) -> tokio::sync::mpsc::Receiver<Tick> {
        let (tx, rx) = tokio::sync::mpsc::channel(self.queue_depth);
        self.subscribers.push(Subscriber {
            label: label.into(),
            sender: TickSender::Task(tx),
            dropped,
        });
        rx
    }

    /// Subscribe an OS thread. Missed ticks are added to `dropped`.
    pub fn subscribe_thread(
        &mut self,
        label: impl Into<String>,
        dropped: Arc<AtomicU64>,
    ) -> crossbeam_channel::Receiver<Tick> {
        let (tx, rx) = crossbeam_channel::bounded(self.queue_depth);
        self.subscribers.push(Subscriber {
            label: label.into(),
            sender: TickSender::Thread(tx),
            dropped,
        });
        rx
    }

    /// Send `tick` to every subscriber without blocking.
    ///
    /// Subscribers whose receiver is gone are removed. Returns how many
    /// subscribers accepted the tick.
    pub fn broadcast(&mut self, tick: Tick) -> usize {
        self.history.record(&tick);

        let mut delivered = 0;
        self.subscribers.retain(|subscriber| {
            match subscriber.sender.try_send(tick) {
                SendOutcome::Delivered => {
                    delivered += 1;
                    true
                }
                SendOutcome::Busy => {
                    subscriber.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(
                        "[{}] Busy, dropped tick {}",
                        subscriber.label,
                        tick.frame_number
                    );
                    true
                }
                SendOutcome::Closed => {
                    tracing::debug!("[{}] Tick receiver closed, unsubscribing", subscriber.label);
                    false
                }
            }
        });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Drop every subscriber channel. Handler loops see a closed channel.
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}

impl Default for TickBroadcaster {
    fn default() -> Self {
        Self::new(4)
    }
}
