//! Integration tests for the confirmation flow.

mod common;

use chrono::Duration;
use evride_core::{RentalStatus, StationId, TimeWindow, compute_time_window};
use evride_lifecycle::{LifecycleError, Transition};
use evride_remote::RemoteError;
use evride_ui::{
    ClickDecision, ConfirmationFlow, ConfirmationState, ConfirmationSummary, Notice,
    RecoveryHint, TicketIssuer, station_label,
};

fn pickup_summary() -> ConfirmationSummary {
    ConfirmationSummary::new(
        Transition::Pickup,
        &common::rental(RentalStatus::Paid),
        &TimeWindow::NOT_STARTED,
    )
}

#[test]
fn confirmation_flow_tests_return_summary_lists_elapsed_and_destination() {
    let rental = common::rental(RentalStatus::Active);
    let window = compute_time_window(&rental, common::t0() + Duration::minutes(42));
    let summary = ConfirmationSummary::new(Transition::Return, &rental, &window)
        .with_destination(station_label(&common::stations(), StationId(5)));

    assert_eq!(summary.headline(), "Ready to return the vehicle?");
    assert_eq!(
        summary.lines(),
        vec![
            "Rental: #42".to_string(),
            "Vehicle: EB-007".to_string(),
            "Package: Two hours (2h)".to_string(),
            "Cost: 150,000 VND".to_string(),
            "Time used: 42m 0s".to_string(),
            "Return to: Harbor Square".to_string(),
        ]
    );
}

#[test]
fn confirmation_flow_tests_pickup_summary_has_no_elapsed_time() {
    let summary = pickup_summary();

    assert_eq!(summary.elapsed, None);
    assert_eq!(summary.destination, None);
    assert_eq!(summary.lines().len(), 4);
}

#[test]
fn confirmation_flow_tests_ticket_submits_exactly_once() {
    let mut flow = ConfirmationFlow::new(TicketIssuer::seeded(1));
    let ticket = flow
        .open(pickup_summary(), "VEHICLE_7")
        .expect("idle flow should open");

    assert_eq!(flow.click(&ticket), ClickDecision::Submit(Transition::Pickup));
    assert!(flow.state().is_submitting());
    assert_eq!(flow.click(&ticket), ClickDecision::Ignored);
    assert_eq!(flow.open(pickup_summary(), "VEHICLE_7"), None);

    assert!(flow.succeed(&ticket, "Rental started"));
    assert_eq!(
        flow.state().notice(),
        Some(&Notice::Success("Rental started".to_string()))
    );
    assert_eq!(flow.click(&ticket), ClickDecision::Ignored);
}

#[test]
fn confirmation_flow_tests_failure_returns_to_idle_with_verbatim_message() {
    let mut flow = ConfirmationFlow::new(TicketIssuer::seeded(2));
    let first = flow
        .open(pickup_summary(), "VEHICLE_7")
        .expect("idle flow should open");
    assert_eq!(flow.click(&first), ClickDecision::Submit(Transition::Pickup));

    let error = LifecycleError::RemoteFailure(RemoteError::Client(
        409,
        "Vehicle is under maintenance".to_string(),
    ));
    assert!(flow.fail(&first, &error));
    assert_eq!(
        flow.state().notice(),
        Some(&Notice::Failure {
            message: "Vehicle is under maintenance".to_string(),
            hint: Some(RecoveryHint::RetryManually),
        })
    );

    let second = flow
        .open(pickup_summary(), "VEHICLE_7")
        .expect("failed flow should reopen");
    assert_ne!(first.key(), second.key());
    assert_eq!(flow.click(&first), ClickDecision::Ignored);
    assert_eq!(flow.click(&second), ClickDecision::Submit(Transition::Pickup));
}

#[test]
fn confirmation_flow_tests_stale_ticket_does_not_close_review() {
    let mut flow = ConfirmationFlow::new(TicketIssuer::seeded(3));
    let stale = flow
        .open(pickup_summary(), "VEHICLE_7")
        .expect("idle flow should open");
    let fresh = flow
        .open(pickup_summary(), "VEHICLE_7")
        .expect("reviewing flow should reopen");

    assert_eq!(flow.click(&stale), ClickDecision::Ignored);
    assert!(matches!(
        flow.state(),
        ConfirmationState::Reviewing { ticket, .. } if *ticket == fresh
    ));
    assert!(!flow.succeed(&fresh, "too early"));

    flow.dismiss();
    assert_eq!(flow.state(), &ConfirmationState::Idle { notice: None });
    assert_eq!(flow.click(&fresh), ClickDecision::Ignored);
}
