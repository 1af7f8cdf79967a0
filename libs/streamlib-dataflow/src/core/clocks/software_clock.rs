// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Free-running software clock (bathtub mode).
//!
//! Wake times are scheduled on a fixed grid (`baseline + n * period`) so the
//! mean interval converges to `1 / fps`. Two rules keep a late caller from
//! producing a burst of near-zero `delta_time` ticks:
//!
//! - every wait lasts at least `min_sleep` (half a period);
//! - a caller more than one period behind moves the grid to "now" instead of
//!   catching up tick-for-tick.
//!
//! Rebaselining only moves the grid. `frame_number` keeps counting.

use std::time::{Duration, Instant};

use super::{Clock, Tick};
use crate::core::error::{Result, StreamError};

pub struct SoftwareClock {
    fps: f64,
    period: Duration,
    min_sleep: Duration,
    clock_id: String,
    /// Time origin for `Tick::timestamp`
    origin: Instant,
    /// Start of the current schedule grid
    baseline: Instant,
    /// Ticks issued on the current grid
    scheduled: u64,
    frame_number: u64,
    last_tick_time: Option<Instant>,
}

impl SoftwareClock {
    /// Create a software clock ticking at `fps`.
    ///
    /// `fps` is a target, not a guarantee. It must be finite and positive.
    pub fn new(fps: f64) -> Result<Self> {
        Self::with_id(fps, "software")
    }

    pub fn with_id(fps: f64, clock_id: impl Into<String>) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(StreamError::Configuration(format!(
                "Clock fps must be a finite positive number, got {}",
                fps
            )));
        }

        let period = Duration::from_secs_f64(1.0 / fps);
        let now = Instant::now();

        Ok(Self {
            fps,
            period,
            min_sleep: period / 2,
            clock_id: clock_id.into(),
            origin: now,
            baseline: now,
            scheduled: 0,
            frame_number: 0,
            last_tick_time: None,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Shortest wait `next_tick` will ever perform.
    pub fn min_sleep(&self) -> Duration {
        self.min_sleep
    }

    /// Frame number the next tick will carry.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    fn wake_time(&mut self, now: Instant) -> Instant {
        let target = self.baseline + self.period.mul_f64(self.scheduled as f64);

        if now > target + self.period {
            tracing::debug!(
                "[Clock] {} behind schedule by {:.1}ms at frame {}, rebaselining",
                self.clock_id,
                (now - target).as_secs_f64() * 1000.0,
                self.frame_number
            );
            self.baseline = now + self.min_sleep;
            self.scheduled = 0;
            return self.baseline;
        }

        target.max(now + self.min_sleep)
    }
}

impl Clock for SoftwareClock {
    async fn next_tick(&mut self) -> Tick {
        let wake = self.wake_time(Instant::now());
        tokio::time::sleep_until(tokio::time::Instant::from_std(wake)).await;

        let current_time = Instant::now();
        let delta_time = current_time
            .duration_since(self.last_tick_time.unwrap_or(self.origin))
            .as_secs_f64();

        let tick = Tick {
            frame_number: self.frame_number,
            timestamp: current_time.duration_since(self.origin).as_secs_f64(),
            delta_time,
            issued_at: current_time,
        };

        self.last_tick_time = Some(current_time);
        self.frame_number += 1;
        self.scheduled += 1;

        tick
    }

    fn reset(&mut self) {
        let now = Instant::now();
        self.origin = now;
        self.baseline = now;
        self.scheduled = 0;
        self.frame_number = 0;
        self.last_tick_time = None;
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn clock_id(&self) -> &str {
        &self.clock_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_fps() {
        assert!(SoftwareClock::new(0.0).is_err());
        assert!(SoftwareClock::new(-30.0).is_err());
        assert!(SoftwareClock::new(f64::NAN).is_err());
        assert!(SoftwareClock::new(f64::INFINITY).is_err());

        let clock = SoftwareClock::new(50.0).unwrap();
        assert_eq!(clock.period(), Duration::from_millis(20));
        assert_eq!(clock.min_sleep(), Duration::from_millis(10));
        assert_eq!(clock.clock_id(), "software");
    }

    #[tokio::test]
    async fn test_frame_numbers_increase_by_one() {
        let mut clock = SoftwareClock::new(200.0).unwrap();

        let mut last = None;
        for expected in 0..10 {
            let tick = clock.next_tick().await;
            assert_eq!(tick.frame_number, expected);
            assert!(tick.delta_time >= 0.0);
            if let Some(previous) = last {
                assert!(tick.timestamp > previous);
            }
            last = Some(tick.timestamp);
        }
    }

    #[tokio::test]
    async fn test_reset_restarts_frame_numbering() {
        let mut clock = SoftwareClock::with_id(200.0, "test").unwrap();
        clock.next_tick().await;
        clock.next_tick().await;
        assert_eq!(clock.frame_number(), 2);

        clock.reset();
        let tick = clock.next_tick().await;
        assert_eq!(tick.frame_number, 0);
        assert!(tick.timestamp < 0.1);
    }

    #[tokio::test]
    async fn test_mean_interval_converges() {
        let fps = 100.0;
        let mut clock = SoftwareClock::new(fps).unwrap();
        clock.next_tick().await;

        let start = Instant::now();
        let ticks = 30;
        for _ in 0..ticks {
            clock.next_tick().await;
        }
        let mean = start.elapsed().as_secs_f64() / ticks as f64;

        let period = 1.0 / fps;
        assert!(
            mean > period * 0.9 && mean < period * 1.6,
            "mean interval {:.4}s too far from {:.4}s",
            mean,
            period
        );
    }

    #[tokio::test]
    async fn test_no_tick_flood_after_stall() {
        let fps = 100.0;
        let mut clock = SoftwareClock::new(fps).unwrap();
        let min_sleep = clock.min_sleep().as_secs_f64();

        let mut deltas = Vec::new();
        for i in 0..30 {
            if i == 10 {
                // Caller falls several periods behind.
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            let tick = clock.next_tick().await;
            assert_eq!(tick.frame_number, i);
            deltas.push(tick.delta_time);
        }

        for (i, delta) in deltas.iter().enumerate().skip(1) {
            assert!(
                *delta >= min_sleep * 0.9,
                "tick {} delta {:.4}s below the anti-flood floor",
                i,
                delta
            );
        }

        // The stall shows up as one long delta, not as a burst afterwards.
        assert!(deltas[10] >= 0.05);
        let after: Vec<f64> = deltas[12..].to_vec();
        let mean_after = after.iter().sum::<f64>() / after.len() as f64;
        assert!(
            mean_after > 0.009 && mean_after < 0.02,
            "mean interval after stall {:.4}s",
            mean_after
        );
    }
}
