// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Clock trait - active tick source driving the runtime.
//!
//! The runtime's coordinator owns exactly one clock and awaits
//! [`Clock::next_tick`] in a loop. Awaiting the next tick is the only
//! mandatory suspension point on the cooperative path.

use std::future::Future;

use super::Tick;

/// Tick generator.
///
/// Implementations must emit strictly increasing `frame_number`s (by 1) and
/// non-negative `delta_time`s, and must never return immediately in a tight
/// loop when the caller is behind schedule.
pub trait Clock: Send + 'static {
    /// Wait for and return the next tick.
    fn next_tick(&mut self) -> impl Future<Output = Tick> + Send;

    /// Establish a new time origin and restart frame numbering at 0.
    fn reset(&mut self);

    /// Nominal tick rate.
    fn fps(&self) -> f64;

    /// Identifier for the clock source (e.g. `software`).
    fn clock_id(&self) -> &str;
}
