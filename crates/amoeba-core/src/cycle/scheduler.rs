use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{Orchestrator, StopSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    Idle,
    Scheduled,
    Running,
    /// No agents left. Only a reset and a new start leave this state.
    Extinct,
}

/// Drives [`Orchestrator::run_cycle`] from one background task. The first
/// tick fires one interval after `start()`. Each later tick starts
/// `cycle_interval_ms` after the previous one started, or right away when the
/// previous tick overran.
pub struct CycleRunner {
    orchestrator: Arc<Mutex<Orchestrator>>,
    stop: StopSignal,
    state: Arc<watch::Sender<RunnerState>>,
    driver: Option<JoinHandle<()>>,
    max_cycles: Option<u64>,
}

impl CycleRunner {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let stop = orchestrator.stop_signal();
        let (state, _rx) = watch::channel(RunnerState::Idle);
        Self {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            stop,
            state: Arc::new(state),
            driver: None,
            max_cycles: None,
        }
    }

    /// Stops on its own after this many completed ticks per start.
    pub fn with_max_cycles(mut self, limit: Option<u64>) -> Self {
        self.max_cycles = limit;
        self
    }

    /// Lock between ticks to inspect or reconfigure.
    pub fn orchestrator(&self) -> Arc<Mutex<Orchestrator>> {
        Arc::clone(&self.orchestrator)
    }

    pub fn state(&self) -> RunnerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunnerState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.driver.as_ref().is_some_and(|d| !d.is_finished())
    }

    /// Schedules the first tick one interval from now. Returns `false` when
    /// already running. A start that follows a `stop()` the driver has not
    /// acted on yet withdraws the stop and keeps the current driver.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            let mut pending_stop = None;
            self.state.send_if_modified(|state| {
                if matches!(*state, RunnerState::Scheduled | RunnerState::Running) {
                    let stopped = self.stop.is_stopped();
                    if stopped {
                        self.stop.resume();
                    }
                    pending_stop = Some(stopped);
                }
                false
            });
            match pending_stop {
                Some(true) => {
                    tracing::info!("cycle.resumed");
                    return true;
                }
                Some(false) => return false,
                // The driver has already settled on exiting.
                None => {}
            }
        }
        self.stop.resume();
        self.state.send_replace(RunnerState::Scheduled);
        self.driver = Some(tokio::spawn(drive(
            Arc::clone(&self.orchestrator),
            self.stop.subscribe(),
            Arc::clone(&self.state),
            self.max_cycles,
        )));
        tracing::info!("cycle.started");
        true
    }

    /// Cancels the pending tick. A tick already past its start finishes, but
    /// outstanding decisions are discarded.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Waits for the driver task to exit.
    pub async fn join(&mut self) -> anyhow::Result<()> {
        if let Some(driver) = self.driver.take() {
            driver.await.context("cycle driver task failed")?;
        }
        Ok(())
    }
}

async fn drive(
    orchestrator: Arc<Mutex<Orchestrator>>,
    mut stop: watch::Receiver<bool>,
    state: Arc<watch::Sender<RunnerState>>,
    max_cycles: Option<u64>,
) {
    let mut completed = 0u64;
    let mut last_cycle = orchestrator.lock().await.cycle();
    let mut deadline = Instant::now() + interval(&orchestrator).await;
    loop {
        state.send_replace(RunnerState::Scheduled);
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                _ = stop_requested(&mut stop) => {
                    if finish_if_stopped(&state, &stop) {
                        tracing::info!(cycle = last_cycle, reason = "requested", "cycle.stopped");
                        return;
                    }
                }
            }
        }

        let started = Instant::now();
        state.send_replace(RunnerState::Running);
        let (report, interval_ms) = {
            let mut orch = orchestrator.lock().await;
            let report = orch.run_cycle().await;
            (report, orch.settings().sim.cycle_interval_ms)
        };
        last_cycle = report.cycle();

        if report.is_terminal() {
            state.send_replace(RunnerState::Extinct);
            tracing::info!(cycle = last_cycle, reason = "extinct", "cycle.stopped");
            return;
        }
        if finish_if_stopped(&state, &stop) {
            tracing::info!(cycle = last_cycle, reason = "requested", "cycle.stopped");
            return;
        }
        completed += 1;
        if max_cycles.is_some_and(|limit| completed >= limit) {
            state.send_replace(RunnerState::Idle);
            tracing::info!(cycle = last_cycle, reason = "max_cycles", "cycle.stopped");
            return;
        }
        deadline = started + Duration::from_millis(interval_ms);
    }
}

async fn interval(orchestrator: &Mutex<Orchestrator>) -> Duration {
    Duration::from_millis(orchestrator.lock().await.settings().sim.cycle_interval_ms)
}

/// Goes Idle when a stop is still requested. Runs under the state lock so a
/// concurrent `start()` either withdraws the stop first or sees Idle.
fn finish_if_stopped(state: &watch::Sender<RunnerState>, stop: &watch::Receiver<bool>) -> bool {
    state.send_if_modified(|current| {
        if !*stop.borrow() {
            return false;
        }
        *current = RunnerState::Idle;
        true
    })
}

async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
