// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Runtime-owned pool of byte buffers.
//!
//! Handlers borrow buffers through their [`ProcessContext`](super::ProcessContext).
//! A [`PooledBuffer`] borrows the context, so it cannot outlive the tick it
//! was acquired in. Dropping it returns the allocation to the pool;
//! [`PooledBuffer::freeze`] turns it into message bytes instead.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Statistics about buffer pool usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferPoolStats {
    /// Buffers handed out so far
    pub acquired: u64,
    /// Acquisitions served from a retained buffer
    pub reused: u64,
    pub in_use: usize,
    pub available: usize,
}

pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    max_retained: usize,
    acquired: AtomicU64,
    reused: AtomicU64,
    in_use: AtomicUsize,
}

impl BufferPool {
    /// Pool keeping at most `max_retained` idle buffers.
    pub fn new(max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_retained)),
            max_retained,
            acquired: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            in_use: AtomicUsize::new(0),
        }
    }

    /// Zero-filled buffer of `len` bytes.
    pub fn acquire(&self, len: usize) -> PooledBuffer<'_> {
        let recycled = {
            let mut free = self.free.lock();
            // Prefer a buffer that already has the capacity.
            match free.iter().position(|buf| buf.capacity() >= len) {
                Some(index) => Some(free.swap_remove(index)),
                None => free.pop(),
            }
        };

        let mut buf = match recycled {
            Some(buf) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => BytesMut::with_capacity(len),
        };
        buf.clear();
        buf.resize(len, 0);

        self.acquired.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_add(1, Ordering::Relaxed);

        PooledBuffer {
            buf: Some(buf),
            pool: self,
        }
    }

    fn release(&self, buf: Option<BytesMut>) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        if let Some(buf) = buf {
            let mut free = self.free.lock();
            if free.len() < self.max_retained {
                free.push(buf);
            }
        }
    }

    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            in_use: self.in_use.load(Ordering::Relaxed),
            available: self.free.lock().len(),
        }
    }

    /// Drop every idle buffer.
    pub fn clear_unused(&self) {
        self.free.lock().clear();
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("BufferPool")
            .field("max_retained", &self.max_retained)
            .field("in_use", &stats.in_use)
            .field("available", &stats.available)
            .finish()
    }
}

/// Buffer lent for one tick. Returns to the pool on drop.
pub struct PooledBuffer<'a> {
    buf: Option<BytesMut>,
    pool: &'a BufferPool,
}

impl PooledBuffer<'_> {
    /// Convert into immutable bytes for a message. The allocation leaves
    /// the pool.
    pub fn freeze(mut self) -> Bytes {
        self.buf.take().map(BytesMut::freeze).unwrap_or_default()
    }
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(self.buf.take());
    }
}
