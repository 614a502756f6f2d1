//! Integration tests for snapshot refresh.

mod common;

use evride_core::{RentalId, RentalStatus};
use evride_lifecycle::{LifecycleError, RefreshOutcome, RentalController};
use evride_remote::{RemoteCall, RemoteError};

#[tokio::test]
async fn refresh_tests_identical_reads_never_mutate() {
    let harness = common::harness(RentalStatus::Paid);
    let snapshots = harness.controller.subscribe();

    for _ in 0..3 {
        assert_eq!(
            harness.controller.refresh().await,
            Ok(RefreshOutcome::Unchanged)
        );
    }

    assert_eq!(harness.controller.status(), RentalStatus::Paid);
    assert!(!snapshots.has_changed().expect("controller is alive"));
    assert_eq!(harness.remote.side_effect_count(), 0);
}

#[tokio::test]
async fn refresh_tests_apply_changes_made_elsewhere() {
    let harness = common::harness(RentalStatus::Paid);
    harness.remote.set_rental(common::rental(RentalStatus::Active));

    let outcome = harness.controller.refresh().await.expect("refresh should work");

    assert!(matches!(outcome, RefreshOutcome::Applied(ref rental) if rental.status == RentalStatus::Active));
    assert_eq!(harness.controller.status(), RentalStatus::Active);
}

#[tokio::test]
async fn refresh_tests_reject_answers_for_other_rentals() {
    let harness = common::harness(RentalStatus::Paid);
    harness.remote.misroute_reads_to(RentalId(43));

    assert_eq!(
        harness.controller.refresh().await,
        Err(LifecycleError::StaleSnapshot {
            expected: RentalId(42),
            got: RentalId(43),
        })
    );
    assert_eq!(harness.controller.snapshot(), common::rental(RentalStatus::Paid));
}

#[tokio::test]
async fn refresh_tests_failure_surfaces_without_mutation() {
    let harness = common::harness(RentalStatus::Active);
    harness.remote.fail_next(RemoteError::Timeout);

    assert_eq!(
        harness.controller.refresh().await,
        Err(LifecycleError::RemoteFailure(RemoteError::Timeout))
    );
    assert_eq!(harness.controller.status(), RentalStatus::Active);
}

#[tokio::test]
async fn refresh_tests_load_fetches_initial_snapshot() {
    let harness = common::harness(RentalStatus::Pending);
    let context = common::context(&harness.remote, &harness.clock, &harness.session);

    let loaded = RentalController::load(RentalId(42), context)
        .await
        .expect("load should work");

    assert_eq!(loaded.rental_id(), RentalId(42));
    assert_eq!(loaded.status(), RentalStatus::Pending);
    assert_eq!(
        harness.remote.calls(),
        vec![RemoteCall::GetRentalDetails(RentalId(42))]
    );
}
