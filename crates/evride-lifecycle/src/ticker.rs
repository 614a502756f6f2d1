//! Periodic time-window recomputation for an active rental.

use std::sync::Arc;
use std::time::Duration;

use evride_core::{Rental, RentalStatus, TimeWindow, compute_time_window};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{Clock, RentalController};

/// Default recomputation cadence.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

/// Shortest cadence the ticker runs at.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Why a ticker task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerExit {
    /// The rental left `ACTIVE` (or never was).
    LeftActive(RentalStatus),
    /// The controller was torn down or dropped.
    Detached,
    /// [`TimeWindowTicker::cancel`] was called.
    Cancelled,
}

/// Cancellable task recomputing a rental's [`TimeWindow`] at a fixed cadence.
///
/// Dropping the ticker aborts the task.
#[derive(Debug)]
pub struct TimeWindowTicker {
    windows: watch::Receiver<TimeWindow>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<TickerExit>>,
}

impl TimeWindowTicker {
    /// Spawns a ticker following `controller`'s snapshots.
    ///
    /// Must be called from within a tokio runtime. Cadences shorter than
    /// [`MIN_TICK_INTERVAL`] are raised to it.
    pub fn spawn(controller: &RentalController, cadence: Duration) -> Self {
        let cadence = cadence.max(MIN_TICK_INTERVAL);
        let clock = controller.clock();
        let snapshots = controller.subscribe();
        let detached = controller.detach_signal();
        let initial = compute_time_window(&snapshots.borrow(), clock.now());
        let (windows_tx, windows) = watch::channel(initial);
        let (stop, stop_rx) = watch::channel(false);
        let rental_id = controller.rental_id();

        let task = tokio::spawn(async move {
            let exit = run(snapshots, detached, stop_rx, clock, cadence, windows_tx).await;
            tracing::debug!(%rental_id, ?exit, "time window ticker finished");
            exit
        });

        Self {
            windows,
            stop,
            task: Some(task),
        }
    }

    /// Receiver observing every recomputed window.
    pub fn windows(&self) -> watch::Receiver<TimeWindow> {
        self.windows.clone()
    }

    /// Most recent window.
    pub fn latest(&self) -> TimeWindow {
        *self.windows.borrow()
    }

    /// Asks the task to stop at its next wake-up.
    pub fn cancel(&self) {
        self.stop.send_replace(true);
    }

    /// Returns `true` once the task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the task to finish and reports why.
    ///
    /// Returns `None` if the task panicked or was aborted.
    pub async fn finished(mut self) -> Option<TickerExit> {
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl Drop for TimeWindowTicker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    mut snapshots: watch::Receiver<Rental>,
    mut detached: watch::Receiver<bool>,
    mut stop: watch::Receiver<bool>,
    clock: Arc<dyn Clock>,
    cadence: Duration,
    windows: watch::Sender<TimeWindow>,
) -> TickerExit {
    let mut interval = tokio::time::interval(cadence);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *detached.borrow_and_update() {
            return TickerExit::Detached;
        }
        if *stop.borrow_and_update() {
            return TickerExit::Cancelled;
        }

        let rental = snapshots.borrow_and_update().clone();
        if rental.status != RentalStatus::Active {
            windows.send_replace(compute_time_window(&rental, clock.now()));
            return TickerExit::LeftActive(rental.status);
        }

        tokio::select! {
            _ = interval.tick() => {
                let window = compute_time_window(&rental, clock.now());
                tracing::trace!(
                    rental_id = %rental.id,
                    elapsed_ms = window.elapsed_ms,
                    remaining_ms = ?window.remaining_ms,
                    "time window tick"
                );
                windows.send_replace(window);
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return TickerExit::Detached;
                }
            }
            changed = detached.changed() => {
                if changed.is_err() {
                    return TickerExit::Detached;
                }
            }
            changed = stop.changed() => {
                if changed.is_err() {
                    return TickerExit::Cancelled;
                }
            }
        }
    }
}
