//! Integration tests for the single in-flight slot and teardown.

mod common;

use std::sync::Arc;

use evride_core::RentalStatus;
use evride_lifecycle::{LifecycleError, RefreshOutcome, Transition};
use evride_qr::scan;
use evride_remote::{RemoteCall, ScriptedAuthority};
use tokio::sync::Notify;

#[tokio::test]
async fn reentrancy_tests_double_pickup_issues_one_remote_call() {
    let harness = common::harness(RentalStatus::Paid);
    let code = scan("VEHICLE_7");

    let (first, second) = tokio::join!(
        harness.controller.pickup(&code, None),
        harness.controller.pickup(&code, None)
    );

    let outcomes = [first, second];
    let succeeded = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(outcomes.iter().any(|outcome| {
        *outcome
            == Err(LifecycleError::OperationInProgress {
                requested: Transition::Pickup,
                running: Transition::Pickup,
            })
    }));

    let pickups = harness
        .remote
        .calls()
        .iter()
        .filter(|call| matches!(call, RemoteCall::Pickup(..)))
        .count();
    assert_eq!(pickups, 1);
    assert_eq!(harness.controller.status(), RentalStatus::Active);
    assert_eq!(harness.controller.in_flight(), None);
}

#[tokio::test]
async fn reentrancy_tests_dropped_call_releases_slot() {
    let gate = Arc::new(Notify::new());
    let remote = ScriptedAuthority::new(common::rental(RentalStatus::Paid), common::t0())
        .with_gate(Arc::clone(&gate));
    let harness = common::harness_with(remote, common::rental(RentalStatus::Paid));
    let code = scan("VEHICLE_7");

    tokio::select! {
        biased;
        _ = harness.controller.pickup(&code, None) => panic!("gated pickup must not finish"),
        _ = tokio::task::yield_now() => {}
    }

    assert_eq!(harness.controller.in_flight(), None);
    assert_eq!(harness.controller.status(), RentalStatus::Paid);
}

#[tokio::test]
async fn reentrancy_tests_late_answer_after_teardown_is_dropped() {
    let gate = Arc::new(Notify::new());
    let remote = ScriptedAuthority::new(common::rental(RentalStatus::Paid), common::t0())
        .with_gate(Arc::clone(&gate));
    let harness = common::harness_with(remote, common::rental(RentalStatus::Paid));
    let code = scan("VEHICLE_7");

    let release = async {
        tokio::task::yield_now().await;
        harness.controller.teardown();
        gate.notify_one();
    };
    let (result, ()) = tokio::join!(harness.controller.pickup(&code, None), release);

    assert_eq!(result, Err(LifecycleError::Detached));
    assert_eq!(harness.controller.status(), RentalStatus::Paid);
    assert_eq!(harness.remote.rental().status, RentalStatus::Active);
    assert_eq!(
        harness.controller.pickup(&code, None).await,
        Err(LifecycleError::Detached)
    );
}

#[tokio::test]
async fn reentrancy_tests_refresh_during_transition_is_superseded() {
    let harness = common::harness(RentalStatus::Pending);

    let (refreshed, confirmed) = tokio::join!(
        harness.controller.refresh(),
        harness.controller.confirm_payment()
    );

    assert_eq!(refreshed, Ok(RefreshOutcome::Superseded));
    assert_eq!(
        confirmed.map(|rental| rental.status),
        Ok(RentalStatus::Paid)
    );
    assert_eq!(harness.controller.status(), RentalStatus::Paid);
}
