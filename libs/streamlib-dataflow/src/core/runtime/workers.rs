// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Handler execution: the coordinator thread and isolated worker threads.
//!
//! The coordinator owns the clock and the tick broadcaster on a single
//! threaded tokio runtime. Cooperative handlers are tasks on that runtime and
//! yield after every `process` call. Isolated handlers get a dedicated OS
//! thread each, fed through a crossbeam channel.
//!
//! Every worker holds a clone of an exit sender. When the last one is gone
//! the stop path knows all workers have returned.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

use crate::core::clocks::{Clock, Tick};
use crate::core::config::RuntimeConfig;
use crate::core::context::{BufferPool, ProcessContext};
use crate::core::error::{Result, StreamError};
use crate::core::events::{TickBroadcaster, TickHistory};
use crate::core::handler::{BoxedHandler, HandlerId, HandlerRecord};
use crate::core::ports::HandlerPorts;
use crate::core::scheduling::Dispatcher;

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic payload")
    }
}

/// Everything a worker needs to drive one handler.
pub(crate) struct Worker {
    pub(crate) record: Arc<HandlerRecord>,
    pub(crate) handler: Arc<Mutex<BoxedHandler>>,
    pub(crate) ports: Arc<HandlerPorts>,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) history: Arc<TickHistory>,
}

impl Worker {
    /// Run `process` for one tick. Errors and panics are logged and counted;
    /// the worker keeps going.
    pub(crate) fn process_tick(&self, tick: Tick) {
        let id = self.record.id();
        // Ticks still queued when stop begins are skipped.
        if !self.record.state().is_active() {
            return;
        }

        let mut handler = self.handler.lock();
        let mut ctx = ProcessContext::new(tick, id, &self.ports, &self.pool, &self.history);
        let ok = match panic::catch_unwind(AssertUnwindSafe(|| handler.process(&mut ctx))) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(
                    "[{}] process() failed at frame {}: {}",
                    id,
                    tick.frame_number,
                    e
                );
                false
            }
            Err(payload) => {
                tracing::error!(
                    "[{}] process() panicked at frame {}: {}",
                    id,
                    tick.frame_number,
                    panic_message(payload.as_ref())
                );
                false
            }
        };
        drop(handler);

        self.record.stats().record_tick(tick.frame_number, ok);
        self.record.mark_running();
    }
}

/// Handles to the threads of a running graph.
pub(crate) struct ActiveWorkers {
    shutdown: Option<oneshot::Sender<()>>,
    coordinator: Option<JoinHandle<()>>,
    isolated: Vec<(HandlerId, JoinHandle<()>)>,
    exited: Receiver<()>,
}

impl ActiveWorkers {
    /// Spawn isolated threads and the coordinator, then wait for the
    /// coordinator to come up.
    pub(crate) fn spawn<C: Clock>(
        clock: C,
        workers: Vec<Worker>,
        config: &RuntimeConfig,
        history: Arc<TickHistory>,
    ) -> Result<Self> {
        let (exit_tx, exited) = crossbeam_channel::bounded::<()>(0);
        let mut broadcaster = TickBroadcaster::new(config.tick_queue_depth).with_history(history);
        let mut cooperative = Vec::new();
        let mut isolated = Vec::new();

        for worker in workers {
            let id = worker.record.id().clone();
            let dropped = worker.record.stats().dropped_counter();

            match worker.record.dispatcher() {
                Dispatcher::Cooperative => {
                    let rx = broadcaster.subscribe_task(id.to_string(), dropped);
                    cooperative.push((worker, rx));
                }
                Dispatcher::Isolated => {
                    let rx = broadcaster.subscribe_thread(id.to_string(), dropped);
                    let handle = spawn_isolated(worker, rx, exit_tx.clone())?;
                    isolated.push((id, handle));
                }
            }
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let grace = config.stop_grace();

        let coordinator = std::thread::Builder::new()
            .name("streamlib-coordinator".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                rt.block_on(coordinate(clock, broadcaster, cooperative, shutdown_rx, grace));
                drop(exit_tx);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(StreamError::Runtime(
                    "Coordinator thread exited during startup".into(),
                ));
            }
        }

        Ok(Self {
            shutdown: Some(shutdown_tx),
            coordinator: Some(coordinator),
            isolated,
            exited,
        })
    }

    /// Stop the clock, close every tick channel, and wait for workers until
    /// `deadline`. Workers still inside `process` after that are abandoned.
    pub(crate) fn shutdown(mut self, deadline: Instant) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        let all_exited = loop {
            match self.exited.recv_deadline(deadline) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Disconnected) => break true,
                Err(RecvTimeoutError::Timeout) => break false,
            }
        };

        if let Some(handle) = self.coordinator.take() {
            if all_exited || handle.is_finished() {
                if handle.join().is_err() {
                    tracing::error!("[Runtime] Coordinator thread panicked");
                }
            } else {
                tracing::warn!("[Runtime] Cooperative handlers still busy after grace period, abandoning");
            }
        }

        for (id, handle) in self.isolated.drain(..) {
            if all_exited || handle.is_finished() {
                if handle.join().is_err() {
                    tracing::error!("[{}] Worker thread panicked", id);
                }
            } else {
                tracing::warn!("[{}] Still inside process() after grace period, abandoning thread", id);
            }
        }
    }
}

fn spawn_isolated(
    worker: Worker,
    rx: Receiver<Tick>,
    exit: Sender<()>,
) -> Result<JoinHandle<()>> {
    let id = worker.record.id().clone();
    let handle = std::thread::Builder::new()
        .name(format!("streamlib-{}", id))
        .spawn(move || {
            tracing::debug!("[{}] Isolated worker started", id);
            for tick in rx {
                worker.process_tick(tick);
            }
            tracing::debug!("[{}] Isolated worker stopped", id);
            drop(exit);
        })?;
    Ok(handle)
}

async fn coordinate<C: Clock>(
    mut clock: C,
    mut broadcaster: TickBroadcaster,
    cooperative: Vec<(Worker, mpsc::Receiver<Tick>)>,
    mut shutdown: oneshot::Receiver<()>,
    grace: Duration,
) {
    let mut tasks = tokio::task::JoinSet::new();
    for (worker, mut rx) in cooperative {
        tasks.spawn(async move {
            while let Some(tick) = rx.recv().await {
                worker.process_tick(tick);
                tokio::task::yield_now().await;
            }
        });
    }

    tracing::info!(
        "[Clock] Started {} at {} fps ({} cooperative task(s))",
        clock.clock_id(),
        clock.fps(),
        tasks.len()
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            tick = clock.next_tick() => {
                broadcaster.broadcast(tick);
            }
        }
    }

    // Closing the channels ends every task loop.
    broadcaster.clear();
    drop(broadcaster);

    let drained = tokio::time::timeout(grace, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            "[Clock] {} cooperative task(s) still running after {:?}, aborting",
            tasks.len(),
            grace
        );
        tasks.abort_all();
    }

    tracing::info!("[Clock] Stopped {}", clock.clock_id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ProcessContext;
    use crate::core::handler::{HandlerId, LifecycleState, StreamHandler};
    use crate::core::ports::PortSpec;

    struct Flaky;

    impl StreamHandler for Flaky {
        fn ports(&self) -> Vec<PortSpec> {
            Vec::new()
        }

        fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
            match ctx.frame_number() {
                1 => Err(StreamError::Runtime("bad frame".into())),
                2 => panic!("boom"),
                _ => Ok(()),
            }
        }
    }

    fn worker() -> Worker {
        let id = HandlerId::new("flaky").unwrap();
        let record = Arc::new(HandlerRecord::new(
            id.clone(),
            "Flaky",
            Dispatcher::Cooperative,
            false,
        ));
        let ports = HandlerPorts::from_specs(&id, Vec::new(), Duration::from_millis(1)).unwrap();
        Worker {
            record,
            handler: Arc::new(Mutex::new(Box::new(Flaky))),
            ports: Arc::new(ports),
            pool: Arc::new(BufferPool::new(2)),
            history: Arc::new(TickHistory::new()),
        }
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[test]
    fn test_process_tick_survives_errors_and_panics() {
        let worker = worker();
        worker.record.set_state(LifecycleState::Started);

        for frame in 0..4 {
            worker.process_tick(Tick::new(frame, frame as f64 / 30.0, 1.0 / 30.0));
        }

        let stats = worker.record.stats().snapshot();
        assert_eq!(stats.ticks_processed, 4);
        assert_eq!(stats.process_errors, 2);
        assert_eq!(stats.last_frame, Some(3));
        assert_eq!(worker.record.state(), LifecycleState::Running);
    }

    #[test]
    fn test_inactive_handler_skips_ticks() {
        let worker = worker();
        worker.record.set_state(LifecycleState::Stopping);
        worker.process_tick(Tick::new(0, 0.0, 0.0));
        assert_eq!(worker.record.stats().snapshot().ticks_processed, 0);
    }
}
