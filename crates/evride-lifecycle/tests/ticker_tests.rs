//! Integration tests for the time-window ticker.

mod common;

use std::sync::Arc;
use std::time::Duration;

use evride_core::{MS_PER_HOUR, RentalStatus, TimeWindow};
use evride_lifecycle::{
    Clock, DEFAULT_TICK_INTERVAL_MS, LifecycleContext, MIN_TICK_INTERVAL, RentalController,
    TickerExit, TimeWindowTicker,
};
use evride_qr::scan;
use evride_remote::{RemoteAuthority, ScriptedAuthority};

fn cadence() -> Duration {
    Duration::from_millis(DEFAULT_TICK_INTERVAL_MS)
}

#[tokio::test(start_paused = true)]
async fn ticker_tests_recompute_every_second_while_active() {
    let remote: Arc<dyn RemoteAuthority> = Arc::new(ScriptedAuthority::new(
        common::rental(RentalStatus::Active),
        common::t0(),
    ));
    let clock: Arc<dyn Clock> = Arc::new(common::TokioClock::new());
    let context = LifecycleContext::new(remote, common::signed_in()).with_clock(clock);
    let controller =
        RentalController::from_snapshot(common::rental(RentalStatus::Active), context);

    let ticker = TimeWindowTicker::spawn(&controller, cadence());
    tokio::time::sleep(Duration::from_millis(3_500)).await;

    let window = ticker.latest();
    assert_eq!(window.elapsed_ms, 3_000);
    assert_eq!(window.remaining_ms, Some(2 * MS_PER_HOUR - 3_000));
    assert!(!ticker.is_finished());
}

#[tokio::test]
async fn ticker_tests_first_window_after_pickup_starts_at_zero() {
    let harness = common::harness(RentalStatus::Paid);
    harness
        .controller
        .pickup(&scan("VEHICLE_7"), None)
        .await
        .expect("pickup should succeed");

    let ticker = TimeWindowTicker::spawn(&harness.controller, cadence());
    let window = ticker.latest();

    assert!(window.is_started());
    assert_eq!(window.elapsed_ms, 0);
    assert_eq!(window.percent_complete, 0.0);
}

#[tokio::test]
async fn ticker_tests_stop_when_rental_leaves_active() {
    let harness = common::harness(RentalStatus::Active);
    let ticker = TimeWindowTicker::spawn(&harness.controller, cadence());

    harness
        .controller
        .return_vehicle(&scan("STATION_5"), None)
        .await
        .expect("return should succeed");

    assert_eq!(
        ticker.finished().await,
        Some(TickerExit::LeftActive(RentalStatus::Completed))
    );
}

#[tokio::test]
async fn ticker_tests_stop_on_teardown() {
    let harness = common::harness(RentalStatus::Active);
    let ticker = TimeWindowTicker::spawn(&harness.controller, cadence());

    harness.controller.teardown();

    assert_eq!(ticker.finished().await, Some(TickerExit::Detached));
}

#[tokio::test]
async fn ticker_tests_stop_on_cancel() {
    let harness = common::harness(RentalStatus::Active);
    let ticker = TimeWindowTicker::spawn(&harness.controller, cadence());

    ticker.cancel();

    assert_eq!(ticker.finished().await, Some(TickerExit::Cancelled));
}

#[tokio::test]
async fn ticker_tests_never_run_for_inactive_rentals() {
    let harness = common::harness(RentalStatus::Paid);
    let ticker = TimeWindowTicker::spawn(&harness.controller, cadence());

    assert_eq!(ticker.latest(), TimeWindow::NOT_STARTED);
    assert_eq!(
        ticker.finished().await,
        Some(TickerExit::LeftActive(RentalStatus::Paid))
    );
}

#[tokio::test(start_paused = true)]
async fn ticker_tests_zero_cadence_is_raised_to_the_minimum() {
    let remote: Arc<dyn RemoteAuthority> = Arc::new(ScriptedAuthority::new(
        common::rental(RentalStatus::Active),
        common::t0(),
    ));
    let clock: Arc<dyn Clock> = Arc::new(common::TokioClock::new());
    let context = LifecycleContext::new(remote, common::signed_in()).with_clock(clock);
    let controller =
        RentalController::from_snapshot(common::rental(RentalStatus::Active), context);

    let ticker = TimeWindowTicker::spawn(&controller, Duration::ZERO);
    tokio::time::sleep(MIN_TICK_INTERVAL * 5).await;

    assert!(!ticker.is_finished());
    assert!(ticker.latest().elapsed_ms > 0);

    ticker.cancel();
    assert_eq!(ticker.finished().await, Some(TickerExit::Cancelled));
}
