// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::time::Instant;

/// Clock tick with timing information.
///
/// Ticks are signals to process, not data carriers. Every handler alive at
/// broadcast time receives the same `Tick` value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Monotonic frame counter (starts at 0 after a clock reset)
    pub frame_number: u64,
    /// Seconds since the clock was reset
    pub timestamp: f64,
    /// Seconds since the previous tick (frame-rate independent movement)
    pub delta_time: f64,
    /// Moment the clock released this tick
    pub issued_at: Instant,
}

impl Tick {
    pub fn new(frame_number: u64, timestamp: f64, delta_time: f64) -> Self {
        Self {
            frame_number,
            timestamp,
            delta_time,
            issued_at: Instant::now(),
        }
    }
}
