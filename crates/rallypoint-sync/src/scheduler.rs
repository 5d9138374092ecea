//! Periodic re-sync with an explicit lifecycle.
//!
//! One task per scheduler runs cycles strictly one after another. Ticks that
//! fall due while a cycle is in flight are skipped, so a slow backend never
//! sees overlapping cycles. `stop()` drops any in-flight cycle; its results
//! are never published.
//!
//! Events go out on a bounded channel. When the consumer falls
//! [`EVENT_BUFFER`] events behind, newer events are dropped with a warning;
//! [`PollScheduler::state`] and [`PollScheduler::latest`] stay current
//! regardless.

use std::sync::Arc;
use std::time::Duration;

use rallypoint_core::MAX_POLL_INTERVAL_SECS;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::fetcher::{FetchError, SessionExpired};
use crate::gate::GateError;
use crate::pipeline::{CycleError, CycleOutcome, Snapshot, SyncPipeline};

/// Events a consumer may fall behind by before new ones are dropped.
pub const EVENT_BUFFER: usize = 16;

const MAX_PERIOD: Duration = Duration::from_secs(MAX_POLL_INTERVAL_SECS);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Initializing,
    Polling,
    Stopped,
}

/// Why the scheduler stopped on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HaltReason {
    #[error("no session credential")]
    Unauthenticated,
    #[error("location permission denied and no fallback position")]
    LocationPermissionDenied,
    #[error(transparent)]
    SessionExpired(SessionExpired),
    #[error("session store failed: {0}")]
    Store(String),
}

impl HaltReason {
    /// The consumer should send the user to sign in.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::SessionExpired(_))
    }
}

impl From<CycleError> for HaltReason {
    fn from(err: CycleError) -> Self {
        match err {
            CycleError::Gate(GateError::Unauthenticated) => Self::Unauthenticated,
            CycleError::Gate(GateError::LocationPermissionDenied) => Self::LocationPermissionDenied,
            CycleError::Gate(GateError::Store(e)) => Self::Store(e.to_string()),
            CycleError::SessionExpired(e) => Self::SessionExpired(e),
        }
    }
}

/// What the consumer hears from a running scheduler. `cycle` counts from 1.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A fresh marker set that replaces the previous one.
    Snapshot { cycle: u64, snapshot: Arc<Snapshot> },
    /// Every feed failed; the previous snapshot still stands.
    Stale { cycle: u64, errors: Vec<FetchError> },
    /// A recoverable gate failure; polling continues.
    Skipped { cycle: u64, reason: String },
    /// Terminal. Nothing follows.
    Halted(HaltReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("scheduler already started")]
    AlreadyStarted,
    #[error("scheduler is stopped; construct a new one")]
    Terminal,
    #[error("poll period {0:?} must be positive and at most one day")]
    InvalidPeriod(Duration),
}

pub struct PollScheduler {
    pipeline: Arc<SyncPipeline>,
    period: Duration,
    state: Arc<watch::Sender<SchedulerState>>,
    latest: Arc<watch::Sender<Option<Arc<Snapshot>>>>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollScheduler {
    /// Fails for a zero period or one longer than a day.
    pub fn new(pipeline: Arc<SyncPipeline>, period: Duration) -> Result<Self, SchedulerError> {
        if period.is_zero() || period > MAX_PERIOD {
            return Err(SchedulerError::InvalidPeriod(period));
        }
        Ok(Self {
            pipeline,
            period,
            state: Arc::new(watch::Sender::new(SchedulerState::Idle)),
            latest: Arc::new(watch::Sender::new(None)),
            stop: watch::Sender::new(false),
            task: None,
        })
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Most recently published snapshot, if any cycle has produced one.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.borrow().clone()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Spawn the polling task. Runs one cycle immediately, then one per period.
    pub fn start(&mut self) -> Result<mpsc::Receiver<SyncEvent>, SchedulerError> {
        match self.state() {
            SchedulerState::Idle => {}
            SchedulerState::Stopped => return Err(SchedulerError::Terminal),
            SchedulerState::Initializing | SchedulerState::Polling => {
                return Err(SchedulerError::AlreadyStarted);
            }
        }

        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        transition(&self.state, SchedulerState::Initializing);
        info!(period = ?self.period, "starting poll scheduler");

        let worker = Worker {
            pipeline: self.pipeline.clone(),
            state: self.state.clone(),
            latest: self.latest.clone(),
            stop: self.stop.subscribe(),
            events,
        };
        self.task = Some(tokio::spawn(worker.run(self.period)));
        Ok(rx)
    }

    /// Cancel the task and wait for it to finish. Idempotent.
    pub async fn stop(&mut self) {
        self.stop.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "poll task ended abnormally");
            }
        }
        transition(&self.state, SchedulerState::Stopped);
        debug!("poll scheduler stopped");
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Move to `next` unless already stopped.
fn transition(state: &watch::Sender<SchedulerState>, next: SchedulerState) {
    state.send_if_modified(|current| {
        if *current == SchedulerState::Stopped || *current == next {
            return false;
        }
        *current = next;
        true
    });
}

enum Step {
    Continue,
    Halt,
}

struct Worker {
    pipeline: Arc<SyncPipeline>,
    state: Arc<watch::Sender<SchedulerState>>,
    latest: Arc<watch::Sender<Option<Arc<Snapshot>>>>,
    stop: watch::Receiver<bool>,
    events: mpsc::Sender<SyncEvent>,
}

impl Worker {
    async fn run(mut self, period: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycle = 0u64;

        loop {
            if cycle > 0 {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = self.stop.changed() => return,
                }
            }
            cycle += 1;

            let result = tokio::select! {
                result = self.pipeline.run_cycle() => result,
                _ = self.stop.changed() => {
                    debug!(cycle, "stop requested, dropping in-flight cycle");
                    return;
                }
            };
            if *self.stop.borrow() {
                return;
            }

            let initializing = cycle == 1;
            if let Step::Halt = self.apply(cycle, initializing, result) {
                return;
            }
        }
    }

    fn apply(
        &self,
        cycle: u64,
        initializing: bool,
        result: Result<CycleOutcome, CycleError>,
    ) -> Step {
        match result {
            Ok(CycleOutcome::Fresh(snapshot)) => {
                let snapshot = Arc::new(snapshot);
                self.latest.send_replace(Some(snapshot.clone()));
                transition(&self.state, SchedulerState::Polling);
                self.emit(SyncEvent::Snapshot { cycle, snapshot });
                Step::Continue
            }
            Ok(CycleOutcome::Stale { errors }) => {
                transition(&self.state, SchedulerState::Polling);
                self.emit(SyncEvent::Stale { cycle, errors });
                Step::Continue
            }
            Err(err) if initializing || err.requires_login() => {
                let reason = HaltReason::from(err);
                warn!(cycle, %reason, "halting poll scheduler");
                transition(&self.state, SchedulerState::Stopped);
                self.emit(SyncEvent::Halted(reason));
                Step::Halt
            }
            Err(err) => {
                warn!(cycle, error = %err, "skipping cycle");
                self.emit(SyncEvent::Skipped {
                    cycle,
                    reason: err.to_string(),
                });
                Step::Continue
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(capacity = EVENT_BUFFER, "event consumer lagging, sync event dropped");
            }
            Err(TrySendError::Closed(_)) => debug!("sync event dropped, no receiver"),
        }
    }
}
