// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Paired port range allocator.
//!
//! Hands out even ids from `[start, end)`; each even id reserves the pair
//! `(id, id + 1)` for transports that need two endpoints (media + control).
//! The search cursor only moves forward and wraps, so a freed id is reused
//! once the cursor comes back around rather than immediately.

use parking_lot::Mutex;
use std::collections::BTreeMap;

use crate::core::error::{Result, StreamError};

#[derive(Debug, Clone)]
struct Allocation {
    label: String,
    paired: bool,
}

#[derive(Debug)]
struct AllocatorState {
    cursor: u16,
    allocated: BTreeMap<u16, Allocation>,
}

#[derive(Debug)]
pub struct PortAllocator {
    start: u16,
    end: u16,
    state: Mutex<AllocatorState>,
}

impl PortAllocator {
    /// Allocator over `[start, end)`. Both bounds must be even and `start < end`.
    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start % 2 != 0 || end % 2 != 0 {
            return Err(StreamError::Configuration(format!(
                "Port range bounds must be even, got [{}, {})",
                start, end
            )));
        }
        if start >= end {
            return Err(StreamError::Configuration(format!(
                "Port range start must be below end, got [{}, {})",
                start, end
            )));
        }

        Ok(Self {
            start,
            end,
            state: Mutex::new(AllocatorState {
                cursor: start,
                allocated: BTreeMap::new(),
            }),
        })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// Number of pair slots in the range.
    pub fn capacity(&self) -> usize {
        usize::from((self.end - self.start) / 2)
    }

    /// Reserve the next free even id.
    pub fn allocate(&self, label: &str) -> Result<u16> {
        self.reserve(label, false)
    }

    /// Reserve the next free pair `(id, id + 1)`.
    pub fn allocate_pair(&self, label: &str) -> Result<(u16, u16)> {
        let id = self.reserve(label, true)?;
        Ok((id, id + 1))
    }

    fn reserve(&self, label: &str, paired: bool) -> Result<u16> {
        let mut state = self.state.lock();

        for _ in 0..self.capacity() {
            let candidate = state.cursor;
            state.cursor = if candidate + 2 >= self.end {
                self.start
            } else {
                candidate + 2
            };

            if !state.allocated.contains_key(&candidate) {
                state.allocated.insert(
                    candidate,
                    Allocation {
                        label: label.to_string(),
                        paired,
                    },
                );
                tracing::debug!("[PortAllocator] Allocated {} for '{}'", candidate, label);
                return Ok(candidate);
            }
        }

        tracing::warn!(
            "[PortAllocator] Range [{}, {}) exhausted ('{}' requested)",
            self.start,
            self.end,
            label
        );
        Err(StreamError::PortRangeExhausted {
            start: self.start,
            end: self.end,
        })
    }

    /// Release an id returned by [`allocate`](Self::allocate) or
    /// [`allocate_pair`](Self::allocate_pair).
    pub fn free(&self, id: u16) -> Result<()> {
        let mut state = self.state.lock();
        match state.allocated.remove(&id) {
            Some(allocation) => {
                tracing::debug!("[PortAllocator] Freed {} ('{}')", id, allocation.label);
                Ok(())
            }
            None => Err(StreamError::PortNotAllocated(id)),
        }
    }

    /// Release a pair by its first id. Fails unless `id` was allocated as a pair.
    pub fn free_pair(&self, id: u16) -> Result<()> {
        let mut state = self.state.lock();
        match state.allocated.get(&id) {
            Some(allocation) if allocation.paired => {
                tracing::debug!(
                    "[PortAllocator] Freed pair ({}, {}) ('{}')",
                    id,
                    id + 1,
                    allocation.label
                );
                state.allocated.remove(&id);
                Ok(())
            }
            _ => Err(StreamError::PortNotAllocated(id)),
        }
    }

    pub fn is_allocated(&self, id: u16) -> bool {
        self.state.lock().allocated.contains_key(&id)
    }

    /// Label an id was allocated under.
    pub fn label(&self, id: u16) -> Option<String> {
        self.state
            .lock()
            .allocated
            .get(&id)
            .map(|allocation| allocation.label.clone())
    }

    pub fn allocated_count(&self) -> usize {
        self.state.lock().allocated.len()
    }
}
