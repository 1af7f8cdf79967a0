// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Integration tests for runtime start/stop and tick delivery.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use streamlib_dataflow::core::handler::LifecycleState;
use streamlib_dataflow::core::context::HandlerContext;
use streamlib_dataflow::{
    ActorRegistry, Dispatcher, Message, PortSpec, ProcessContext, Result, RuntimeConfig,
    RuntimeState, StartPolicy, StreamError, StreamHandler, StreamRuntime, audio_input,
    audio_output,
};

type Seen = Arc<Mutex<Vec<(u64, f64, f64)>>>;

/// Records every tick it is handed.
struct TickRecorder {
    dispatcher: Dispatcher,
    seen: Seen,
}

impl StreamHandler for TickRecorder {
    fn ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn dispatcher(&self) -> Dispatcher {
        self.dispatcher
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let tick = ctx.tick();
        self.seen
            .lock()
            .push((tick.frame_number, tick.timestamp, tick.delta_time));
        Ok(())
    }
}

fn runtime(fps: f64) -> StreamRuntime {
    let config = RuntimeConfig {
        stop_grace_ms: 300,
        ..RuntimeConfig::with_fps(fps)
    };
    StreamRuntime::with_config(config)
        .expect("Failed to create runtime")
        .with_registry(Arc::new(ActorRegistry::new()))
}

#[test]
fn test_every_handler_sees_identical_ticks() {
    let mut rt = runtime(60.0);
    let recorders: Vec<Seen> = (0..4).map(|_| Seen::default()).collect();

    for (i, seen) in recorders.iter().enumerate() {
        let dispatcher = if i % 2 == 0 {
            Dispatcher::Cooperative
        } else {
            Dispatcher::Isolated
        };
        rt.add_handler(TickRecorder {
            dispatcher,
            seen: Arc::clone(seen),
        })
        .expect("Failed to add handler");
    }

    rt.start().expect("Failed to start");
    thread::sleep(Duration::from_millis(400));
    rt.stop().expect("Failed to stop");

    // frame -> (timestamp, delta) as seen by the first handler to record it
    let mut canonical: BTreeMap<u64, (f64, f64)> = BTreeMap::new();
    for seen in &recorders {
        let seen = seen.lock();
        assert!(seen.len() >= 10, "only {} ticks delivered", seen.len());
        assert!(
            seen.windows(2).all(|w| w[0].0 < w[1].0),
            "frame numbers must increase"
        );

        for &(frame, timestamp, delta) in seen.iter() {
            let expected = *canonical.entry(frame).or_insert((timestamp, delta));
            assert_eq!(expected, (timestamp, delta), "tick {} differs", frame);
        }
    }

    let shared = recorders
        .iter()
        .map(|seen| seen.lock().iter().map(|t| t.0).collect::<Vec<_>>())
        .reduce(|a, b| a.into_iter().filter(|f| b.contains(f)).collect())
        .unwrap_or_default();
    assert!(shared.len() >= 10, "handlers share only {} frames", shared.len());
}

/// Fails every third tick.
struct Unreliable;

impl StreamHandler for Unreliable {
    fn ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        if ctx.frame_number() % 3 == 0 {
            return Err(StreamError::Runtime("flaky sensor".into()));
        }
        Ok(())
    }
}

#[test]
fn test_process_errors_are_counted_not_fatal() {
    let mut rt = runtime(100.0);
    let handle = rt.add_handler(Unreliable).unwrap();

    rt.start().unwrap();
    thread::sleep(Duration::from_millis(200));
    let status = rt.status();
    rt.stop().unwrap();

    let stats = status.handler(handle.id().as_str()).unwrap().stats;
    assert!(stats.ticks_processed >= 5);
    assert!(stats.process_errors >= 1);
    assert!(stats.process_errors < stats.ticks_processed);
}

/// Blocks far longer than a tick period.
struct Sluggish;

impl StreamHandler for Sluggish {
    fn ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::Isolated
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<()> {
        thread::sleep(Duration::from_millis(60));
        Ok(())
    }
}

#[test]
fn test_slow_isolated_handler_does_not_stall_others() {
    let mut rt = runtime(100.0);
    let slow = rt.add_handler(Sluggish).unwrap();
    let fast_seen = Seen::default();
    let fast = rt
        .add_handler(TickRecorder {
            dispatcher: Dispatcher::Cooperative,
            seen: Arc::clone(&fast_seen),
        })
        .unwrap();

    rt.start().unwrap();
    thread::sleep(Duration::from_millis(500));
    let status = rt.status();
    rt.stop().unwrap();

    let slow_stats = status.handler(slow.id().as_str()).unwrap().stats;
    let fast_stats = status.handler(fast.id().as_str()).unwrap().stats;

    assert!(slow_stats.ticks_dropped > 0, "slow handler should miss ticks");
    assert!(fast_stats.ticks_processed > slow_stats.ticks_processed * 2);
    assert!(fast_seen.lock().len() >= 25);
}

/// Never returns from `process` within the grace period.
struct Stuck;

impl StreamHandler for Stuck {
    fn ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::Isolated
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<()> {
        thread::sleep(Duration::from_secs(2));
        Ok(())
    }
}

#[test]
fn test_stop_is_bounded_by_grace_period() {
    let mut rt = runtime(50.0);
    rt.add_handler(Stuck).unwrap();

    rt.start().unwrap();
    thread::sleep(Duration::from_millis(100));

    let begin = Instant::now();
    rt.stop().unwrap();
    assert!(
        begin.elapsed() < Duration::from_millis(1200),
        "stop took {:?}",
        begin.elapsed()
    );
    assert_eq!(rt.state(), RuntimeState::Stopped);
}

#[test]
fn test_handler_states_through_lifecycle() {
    let mut rt = runtime(60.0);
    let seen = Seen::default();
    let handle = rt
        .add_handler(TickRecorder {
            dispatcher: Dispatcher::Isolated,
            seen: Arc::clone(&seen),
        })
        .unwrap();
    let id = handle.id().as_str().to_string();

    assert_eq!(rt.handler(&id).unwrap().state(), LifecycleState::Created);
    rt.start().unwrap();
    thread::sleep(Duration::from_millis(150));
    assert_eq!(rt.handler(&id).unwrap().state(), LifecycleState::Running);
    rt.stop().unwrap();
    assert_eq!(rt.handler(&id).unwrap().state(), LifecycleState::Stopped);

    let delivered = seen.lock().len();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(seen.lock().len(), delivered, "no ticks after stop");
}

/// Emits one audio chunk per tick.
struct Tone;

impl StreamHandler for Tone {
    fn ports(&self) -> Vec<PortSpec> {
        vec![audio_output("audio")]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        ctx.write("audio", Message::audio(vec![0u8; 64], 1, 48_000, ctx.tick().timestamp))
    }
}

/// Audio sink whose device never opens.
struct DeadSpeaker;

impl StreamHandler for DeadSpeaker {
    fn ports(&self) -> Vec<PortSpec> {
        vec![audio_input("audio")]
    }

    fn on_start(&mut self, _ctx: &HandlerContext) -> Result<()> {
        Err(StreamError::Runtime("audio device unavailable".into()))
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<()> {
        Ok(())
    }
}

#[test]
fn test_disabled_consumer_does_not_back_up_producer() {
    let config = RuntimeConfig {
        start_policy: StartPolicy::Isolate,
        ordered_queue_capacity: 4,
        stop_grace_ms: 300,
        ..RuntimeConfig::with_fps(100.0)
    };
    let mut rt = StreamRuntime::with_config(config)
        .unwrap()
        .with_registry(Arc::new(ActorRegistry::new()));
    let tone = rt.add_handler(Tone).unwrap();
    let speaker = rt.add_handler(DeadSpeaker).unwrap();
    let id = rt
        .connect(&tone.output("audio"), &speaker.input("audio"))
        .unwrap();

    rt.start().unwrap();
    thread::sleep(Duration::from_millis(400));
    let status = rt.status();
    let link = rt.connection(&id).unwrap().links()[0].clone();
    rt.stop().unwrap();

    let stats = status.handler(tone.id().as_str()).unwrap().stats;
    assert!(stats.ticks_processed >= 20, "only {} ticks", stats.ticks_processed);
    assert_eq!(stats.process_errors, 0);
    assert!(link.is_closed());
    assert_eq!(link.pending(), 0);
    assert_eq!(link.stats().dropped_chunks, 0);
}
