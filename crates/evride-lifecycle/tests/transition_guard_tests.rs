//! Integration tests for transition guards and identity checks.

mod common;

use evride_core::{RentalStatus, StationId, VehicleId};
use evride_lifecycle::{LifecycleError, Transition};
use evride_qr::{CodeKind, scan};
use evride_remote::{RemoteCall, RemoteError};

#[tokio::test]
async fn transition_guard_tests_matching_scan_activates_rental() {
    let harness = common::harness(RentalStatus::Paid);

    let rental = harness
        .controller
        .pickup(&scan("VEHICLE_7"), None)
        .await
        .expect("pickup should succeed");

    assert_eq!(rental.status, RentalStatus::Active);
    assert_eq!(rental.start_time, Some(common::t0()));
    assert_eq!(harness.controller.status(), RentalStatus::Active);

    let window = harness.controller.time_window();
    assert!(window.is_started());
    assert_eq!(window.elapsed_ms, 0);

    match harness.remote.calls().as_slice() {
        [RemoteCall::Pickup(rental_id, request)] => {
            assert_eq!(rental_id.get(), 42);
            assert_eq!(request.vehicle_id, VehicleId(7));
            assert_eq!(request.qr_code, "VEHICLE_7");
            assert_eq!(request.location.latitude, 0.0);
        }
        other => panic!("unexpected calls: {other:?}"),
    }
}

#[tokio::test]
async fn transition_guard_tests_mismatched_scan_never_reaches_authority() {
    let harness = common::harness(RentalStatus::Paid);

    let error = harness
        .controller
        .pickup(&scan("VEHICLE_9"), None)
        .await
        .expect_err("mismatch should be rejected");

    assert_eq!(
        error,
        LifecycleError::IdentityMismatch {
            expected: VehicleId(7),
            got: VehicleId(9),
        }
    );
    assert!(harness.remote.calls().is_empty());
    assert_eq!(harness.controller.status(), RentalStatus::Paid);
}

#[tokio::test]
async fn transition_guard_tests_pickup_rejects_other_code_kinds() {
    let harness = common::harness(RentalStatus::Paid);

    assert_eq!(
        harness.controller.pickup(&scan("STATION_5"), None).await,
        Err(LifecycleError::WrongCodeKind {
            expected: CodeKind::Vehicle,
            got: CodeKind::Station,
        })
    );
    assert_eq!(
        harness.controller.pickup(&scan("hello"), None).await,
        Err(LifecycleError::UnrecognizedCode)
    );
    assert!(harness.remote.calls().is_empty());
}

#[tokio::test]
async fn transition_guard_tests_pickup_outside_paid_is_invalid() {
    for status in [
        RentalStatus::Pending,
        RentalStatus::Active,
        RentalStatus::Completed,
        RentalStatus::Cancelled,
    ] {
        let harness = common::harness(status);

        assert_eq!(
            harness.controller.pickup(&scan("VEHICLE_7"), None).await,
            Err(LifecycleError::InvalidTransition {
                transition: Transition::Pickup,
                from: status,
            })
        );
        assert!(harness.remote.calls().is_empty());
        assert_eq!(harness.controller.status(), status);
    }
}

#[tokio::test]
async fn transition_guard_tests_return_uses_scanned_station() {
    let harness = common::harness(RentalStatus::Active);
    assert_eq!(
        harness.controller.snapshot().vehicle.origin_station_id(),
        Some(StationId(3))
    );

    let rental = harness
        .controller
        .return_vehicle(&scan("STATION_5"), None)
        .await
        .expect("return should succeed");

    assert_eq!(rental.status, RentalStatus::Completed);
    assert!(rental.end_time.is_some());
    match harness.remote.calls().as_slice() {
        [RemoteCall::ReturnVehicle(_, request)] => {
            assert_eq!(request.station_id, StationId(5));
            assert_eq!(request.qr_code, "STATION_5");
        }
        other => panic!("unexpected calls: {other:?}"),
    }
}

#[tokio::test]
async fn transition_guard_tests_return_rejects_vehicle_codes() {
    let harness = common::harness(RentalStatus::Active);

    assert_eq!(
        harness.controller.return_vehicle(&scan("VEHICLE_7"), None).await,
        Err(LifecycleError::WrongCodeKind {
            expected: CodeKind::Station,
            got: CodeKind::Vehicle,
        })
    );
    assert_eq!(
        harness.controller.return_vehicle(&scan("STATION_"), None).await,
        Err(LifecycleError::UnrecognizedCode)
    );
    assert_eq!(harness.controller.status(), RentalStatus::Active);
}

#[tokio::test]
async fn transition_guard_tests_return_requires_active() {
    let harness = common::harness(RentalStatus::Paid);

    assert_eq!(
        harness.controller.return_vehicle(&scan("STATION_5"), None).await,
        Err(LifecycleError::InvalidTransition {
            transition: Transition::Return,
            from: RentalStatus::Paid,
        })
    );
    assert!(harness.remote.calls().is_empty());
}

#[tokio::test]
async fn transition_guard_tests_confirm_payment_moves_pending_to_paid() {
    let harness = common::harness(RentalStatus::Pending);

    let rental = harness
        .controller
        .confirm_payment()
        .await
        .expect("confirmation should succeed");
    assert_eq!(rental.status, RentalStatus::Paid);

    assert_eq!(
        harness.controller.confirm_payment().await,
        Err(LifecycleError::InvalidTransition {
            transition: Transition::ConfirmPayment,
            from: RentalStatus::Paid,
        })
    );
    assert_eq!(harness.remote.side_effect_count(), 1);
}

#[tokio::test]
async fn transition_guard_tests_remote_failure_keeps_state_and_message() {
    let harness = common::harness(RentalStatus::Paid);
    harness.remote.fail_next(RemoteError::Client(
        409,
        "Vehicle is under maintenance".to_string(),
    ));

    let error = harness
        .controller
        .pickup(&scan("VEHICLE_7"), None)
        .await
        .expect_err("remote failure should surface");

    assert_eq!(error.to_string(), "Vehicle is under maintenance");
    assert_eq!(harness.controller.status(), RentalStatus::Paid);
    assert_eq!(harness.controller.in_flight(), None);

    let retried = harness
        .controller
        .pickup(&scan("VEHICLE_7"), None)
        .await
        .expect("manual retry should succeed");
    assert_eq!(retried.status, RentalStatus::Active);
}

#[tokio::test]
async fn transition_guard_tests_server_snapshot_replaces_local_fields() {
    let harness = common::harness(RentalStatus::Pending);
    let mut server = common::rental(RentalStatus::Pending);
    server.total_cost = rust_decimal::Decimal::new(135_000, 0);
    harness.remote.set_rental(server);

    let rental = harness
        .controller
        .confirm_payment()
        .await
        .expect("confirmation should succeed");

    assert_eq!(rental.total_cost, rust_decimal::Decimal::new(135_000, 0));
    assert_eq!(harness.controller.snapshot(), rental);
}
