//! # Refresh Scheduler
//!
//! Drives fetch, diff and broadcast cycles on a fixed period.
//!
//! ## States
//!
//! The scheduler is either `Idle` or `Running` a cycle. `run_cycle` flips
//! the state with a compare-and-swap; a caller that finds a cycle already in
//! flight gets `CycleOutcome::Skipped` and touches nothing. Two cycles can
//! therefore never interleave their reads and writes of the snapshot, and a
//! slow fetch can not overwrite a newer snapshot with stale data.
//!
//! ## Timing
//!
//! `run` performs one cycle immediately and then one per period. Ticks that
//! come due while a cycle is still in flight are skipped
//! (`MissedTickBehavior::Skip`), not queued.
//!
//! ## Failure Isolation
//!
//! A failed fetch is logged and ends the cycle. The snapshot and the
//! subscribers are untouched and the next tick proceeds normally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::core::hub::Hub;
use crate::ingestors::rows::{snapshot_from_rows, FetchError, RowSource};

/// Whether a cycle is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick.
    Idle,
    /// A cycle is in flight.
    Running,
}

/// Result of one `run_cycle` call.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Another cycle was in flight; nothing was done.
    Skipped,
    /// The fetch failed; nothing changed.
    Failed(FetchError),
    /// The fetched snapshot equals the cached one; nothing was sent.
    Unchanged,
    /// This many items changed and were broadcast.
    Published(usize),
}

/// Resets the running flag however the cycle ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// # Refresh Scheduler
pub struct RefreshScheduler<S> {
    source: S,
    hub: Arc<Hub>,
    period: Duration,
    running: AtomicBool,
}

impl<S: RowSource> RefreshScheduler<S> {
    /// Creates a scheduler fetching from `source` into `hub` every `period`.
    /// A zero period is raised to one millisecond.
    pub fn new(source: S, hub: Arc<Hub>, period: Duration) -> Self {
        Self {
            source,
            hub,
            period: period.max(Duration::from_millis(1)),
            running: AtomicBool::new(false),
        }
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// The configured period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// The row source being polled.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// # Run Cycle
    ///
    /// Fetch, diff against the cached snapshot and, when something changed,
    /// replace the snapshot and broadcast the change set.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh cycle still in flight, skipping");
            return CycleOutcome::Skipped;
        }
        let _running = RunningGuard(&self.running);

        let rows = match self.source.fetch_rows().await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "Error refreshing data");
                return CycleOutcome::Failed(e);
            }
        };

        let next = snapshot_from_rows(rows);
        let changes = self.hub.publish(next);
        if changes.is_empty() {
            debug!("Refresh cycle found no changes");
            CycleOutcome::Unchanged
        } else {
            info!(changes = changes.len(), "Refresh cycle published changes");
            CycleOutcome::Published(changes.len())
        }
    }

    /// # Run
    ///
    /// Cycles immediately, then once per period, until `shutdown` fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_secs = self.period.as_secs_f64(), "Refresh scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Refresh scheduler received shutdown signal.");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }
}
