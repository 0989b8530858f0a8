//! Blocking worker loops around the pipeline components.
//!
//! Each loop owns its component, runs it once per iteration, and hands the
//! result to a bounded queue. Run them on `tokio::task::spawn_blocking` or
//! plain threads; queue operations use `blocking_send`/`blocking_recv`.
//! Pause and exit are only observed between iterations.

use navlink_fc::{MavTransport, TransportError};
use navlink_proto::command::CommandOutput;
use navlink_proto::telemetry::Snapshot;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::command::CommandEngine;
use crate::error::FuseError;
use crate::heartbeat::{HeartbeatEmitter, HeartbeatMonitor};
use crate::telemetry::TelemetryFuser;

/// How often a paused worker re-checks the controller.
const PAUSE_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    Run,
    Pause,
    Exit,
}

/// Shared pause/exit switch for every worker of a pipeline.
#[derive(Debug, Clone)]
pub struct WorkerController {
    tx: Arc<watch::Sender<WorkerSignal>>,
}

impl Default for WorkerController {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(WorkerSignal::Run);
        Self { tx: Arc::new(tx) }
    }

    pub fn pause(&self) {
        self.set(WorkerSignal::Pause);
    }

    pub fn resume(&self) {
        self.set(WorkerSignal::Run);
    }

    /// Exit is final: later pause/resume calls are ignored.
    pub fn request_exit(&self) {
        self.tx.send_replace(WorkerSignal::Exit);
    }

    pub fn is_exit_requested(&self) -> bool {
        *self.tx.borrow() == WorkerSignal::Exit
    }

    pub fn signals(&self) -> WorkerSignals {
        WorkerSignals { rx: self.tx.subscribe() }
    }

    fn set(&self, signal: WorkerSignal) {
        self.tx.send_if_modified(|cur| {
            if *cur == WorkerSignal::Exit || *cur == signal {
                return false;
            }
            *cur = signal;
            true
        });
    }
}

/// Worker-side view of a [`WorkerController`].
#[derive(Debug, Clone)]
pub struct WorkerSignals {
    rx: watch::Receiver<WorkerSignal>,
}

impl WorkerSignals {
    pub fn is_exit_requested(&self) -> bool {
        *self.rx.borrow() == WorkerSignal::Exit
    }

    /// Block while paused. Returns `false` once exit has been requested.
    pub fn wait_while_paused(&self) -> bool {
        loop {
            match *self.rx.borrow() {
                WorkerSignal::Run => return true,
                WorkerSignal::Exit => return false,
                WorkerSignal::Pause => {}
            }
            std::thread::sleep(PAUSE_POLL);
        }
    }

    /// Sleep out the rest of `period` measured from `started`.
    fn sleep_rest(&self, started: Instant, period: Duration) {
        let rest = period.saturating_sub(started.elapsed());
        if !rest.is_zero() {
            std::thread::sleep(rest);
        }
    }
}

/// Sample telemetry back to back and forward each snapshot.
pub fn telemetry_worker<T: MavTransport>(
    mut fuser: TelemetryFuser<T>,
    output: mpsc::Sender<Snapshot>,
    signals: WorkerSignals,
) {
    info!("telemetry worker: started (window {:?})", fuser.window());
    while signals.wait_while_paused() {
        match fuser.run() {
            Ok(snap) => {
                if output.blocking_send(snap).is_err() {
                    debug!("telemetry worker: output queue closed");
                    break;
                }
            }
            Err(FuseError::Transport(TransportError::Closed)) => {
                warn!("telemetry worker: link closed");
                break;
            }
            Err(e) => warn!("telemetry worker: skipped pass: {}", e),
        }
    }
    info!("telemetry worker: done");
}

/// Emit one heartbeat per period. Failures are retried on the next period.
pub fn heartbeat_sender_worker<T: MavTransport>(
    mut emitter: HeartbeatEmitter<T>,
    period: Duration,
    signals: WorkerSignals,
) {
    info!("heartbeat sender: started (period {:?})", period);
    while signals.wait_while_paused() {
        let started = Instant::now();
        emitter.run();
        signals.sleep_rest(started, period);
    }
    info!("heartbeat sender: done");
}

/// Poll liveness once per period and forward every verdict.
pub fn heartbeat_receiver_worker<T: MavTransport>(
    mut monitor: HeartbeatMonitor<T>,
    output: mpsc::Sender<bool>,
    signals: WorkerSignals,
) {
    let period = monitor.period();
    info!("heartbeat receiver: started (period {:?})", period);
    while signals.wait_while_paused() {
        let started = Instant::now();
        let connected = monitor.run();
        if output.blocking_send(connected).is_err() {
            debug!("heartbeat receiver: output queue closed");
            break;
        }
        signals.sleep_rest(started, period);
    }
    info!("heartbeat receiver: done");
}

/// Decide on every incoming snapshot. Stops when the snapshot queue closes.
pub fn command_worker<T: MavTransport>(
    mut engine: CommandEngine<T>,
    mut input: mpsc::Receiver<Snapshot>,
    output: mpsc::Sender<CommandOutput>,
    signals: WorkerSignals,
) {
    info!("command worker: started (target {:?})", engine.target());
    while signals.wait_while_paused() {
        let Some(snap) = input.blocking_recv() else {
            debug!("command worker: input queue closed");
            break;
        };
        match engine.run(&snap) {
            Ok(out) => {
                if output.blocking_send(out).is_err() {
                    debug!("command worker: output queue closed");
                    break;
                }
            }
            Err(e) => warn!("command worker: no command this cycle: {}", e),
        }
    }
    info!("command worker: done");
}
