// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Clock behaviour, standalone and driving a runtime.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use streamlib_dataflow::{
    ActorRegistry, Clock, PortSpec, ProcessContext, Result, RuntimeConfig, SoftwareClock,
    StreamHandler, StreamRuntime, Tick,
};

#[tokio::test]
async fn test_software_clock_mean_interval_converges() {
    let mut clock = SoftwareClock::new(100.0).unwrap();
    let first = clock.next_tick().await;
    let begin = Instant::now();

    let mut last = first;
    for _ in 0..50 {
        last = clock.next_tick().await;
    }

    let mean = begin.elapsed().as_secs_f64() / 50.0;
    assert!(mean > 0.009 && mean < 0.016, "mean interval {:.4}s", mean);
    assert_eq!(last.frame_number, 50);
    assert!(last.timestamp > first.timestamp);
}

#[tokio::test]
async fn test_software_clock_recovers_from_stall_without_flood() {
    let mut clock = SoftwareClock::new(100.0).unwrap();
    clock.next_tick().await;

    // Caller falls 20 periods behind.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut deltas = Vec::new();
    for _ in 0..10 {
        deltas.push(clock.next_tick().await.delta_time);
    }

    let min_sleep = clock.min_sleep().as_secs_f64();
    for delta in &deltas[1..] {
        assert!(
            *delta >= min_sleep * 0.9,
            "tick after stall came {:.4}s after the previous one",
            delta
        );
    }
}

/// Ticks every millisecond until `limit` frames have been issued, then
/// never again.
struct CountedClock {
    next: u64,
    limit: u64,
}

impl Clock for CountedClock {
    fn next_tick(&mut self) -> impl Future<Output = Tick> + Send {
        let frame = self.next;
        let exhausted = frame >= self.limit;
        self.next += 1;
        async move {
            if exhausted {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
            Tick::new(frame, frame as f64 / 1000.0, 0.001)
        }
    }

    fn reset(&mut self) {
        self.next = 0;
    }

    fn fps(&self) -> f64 {
        1000.0
    }

    fn clock_id(&self) -> &str {
        "counted"
    }
}

struct Collector {
    frames: Arc<Mutex<Vec<u64>>>,
}

impl StreamHandler for Collector {
    fn ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        self.frames.lock().push(ctx.frame_number());
        Ok(())
    }
}

#[test]
fn test_runtime_driven_by_custom_clock() {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let clock = CountedClock { next: 0, limit: 20 };

    let mut rt = StreamRuntime::with_clock(clock, RuntimeConfig::default())
        .unwrap()
        .with_registry(Arc::new(ActorRegistry::new()));
    assert_eq!(rt.fps(), 1000.0);

    rt.add_handler(Collector {
        frames: Arc::clone(&frames),
    })
    .unwrap();

    rt.start().unwrap();
    thread::sleep(Duration::from_millis(300));
    rt.stop().unwrap();

    let frames = frames.lock();
    assert_eq!(frames.len(), 20);
    assert_eq!(*frames, (0..20).collect::<Vec<u64>>());
}
