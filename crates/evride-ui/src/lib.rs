#![warn(missing_docs)]
//! # evride-ui
//!
//! ## Purpose
//! Defines the view-facing projection of a rental and the confirmation state
//! shown before every side-effecting transition.
//!
//! ## Responsibilities
//! - Project a rental snapshot and its time window into display-ready text.
//! - Pick the next customer action for each status.
//! - Model the confirmation flow and the tickets that make each confirmation
//!   click count once.
//! - Group a customer's rentals into ongoing and past history.
//! - Map lifecycle failures to recovery hints.
//!
//! ## Data flow
//! Controller snapshot + ticker window -> [`RentalView::project`] -> render.
//! Trigger -> [`ConfirmationFlow::open`] -> click -> controller call ->
//! [`ConfirmationFlow::succeed`] or [`ConfirmationFlow::fail`].
//!
//! ## Ownership and lifetimes
//! Views own their strings so they can be handed to any renderer without
//! borrowing the controller.
//!
//! ## Error model
//! This crate favors explicit state over recoverable errors. Clicks that no
//! longer apply are reported as [`ClickDecision::Ignored`].
//!
//! ## Security and privacy notes
//! Views carry no credentials. Ticket keys are one-way fingerprints of the
//! scanned payload.

mod confirmation;
mod history;

use chrono::{DateTime, Utc};
use evride_core::{Rental, RentalId, RentalStatus, Station, StationId, TimeWindow};
use evride_lifecycle::{LifecycleError, Transition};
use evride_remote::{FailureClass, classify_remote_error};
use rust_decimal::Decimal;

pub use confirmation::{
    CONSUMED_TICKET_MEMORY, ClickDecision, ConfirmationFlow, ConfirmationState,
    ConfirmationSummary, ConfirmationTicket, Notice, TicketIssuer,
};
pub use history::{HistoryEntry, RentalHistory};

/// Remaining time below which an active rental shows an ending-soon alert.
pub const ENDING_SOON_MS: u64 = 30 * 60 * 1_000;

/// Currency suffix for displayed amounts.
pub const CURRENCY: &str = "VND";

/// What the customer should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Pay for the pending rental.
    Pay,
    /// Scan the QR code on the booked vehicle.
    ScanVehicle,
    /// Scan the QR code of a return station.
    ScanStation,
    /// Nothing left to do.
    None,
}

impl NextAction {
    /// Next action for `status`.
    pub fn for_status(status: RentalStatus) -> Self {
        match status {
            RentalStatus::Pending => Self::Pay,
            RentalStatus::Paid => Self::ScanVehicle,
            RentalStatus::Active => Self::ScanStation,
            RentalStatus::Completed | RentalStatus::Cancelled => Self::None,
        }
    }

    /// Transition the action triggers, if any.
    pub fn transition(self) -> Option<Transition> {
        match self {
            Self::Pay => Some(Transition::ConfirmPayment),
            Self::ScanVehicle => Some(Transition::Pickup),
            Self::ScanStation => Some(Transition::Return),
            Self::None => None,
        }
    }

    /// Button text.
    pub fn prompt(self) -> &'static str {
        match self {
            Self::Pay => "Pay now",
            Self::ScanVehicle => "Scan vehicle QR to start",
            Self::ScanStation => "Scan station QR to return",
            Self::None => "",
        }
    }
}

/// Colour band of the usage progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressTone {
    /// Up to 70 percent used.
    Normal,
    /// Over 70 percent used.
    Warning,
    /// Over 90 percent used.
    Critical,
}

impl ProgressTone {
    /// Tone for a completion percentage.
    pub fn for_percent(percent: f64) -> Self {
        if percent > 90.0 {
            Self::Critical
        } else if percent > 70.0 {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}

/// Time-based alert for an active rental.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAlert {
    /// Less than [`ENDING_SOON_MS`] left.
    EndingSoon,
    /// The package duration is used up.
    Overdue,
}

impl TimeAlert {
    /// Alert for `window`, if any.
    pub fn for_window(window: &TimeWindow) -> Option<Self> {
        match window.remaining_ms? {
            0 => Some(Self::Overdue),
            remaining if remaining < ENDING_SOON_MS => Some(Self::EndingSoon),
            _ => None,
        }
    }

    /// Alert text.
    pub fn message(self) -> &'static str {
        match self {
            Self::EndingSoon => "Less than 30 minutes left. Head to a station to return the vehicle.",
            Self::Overdue => "Rental time is up. Return the vehicle to avoid extra charges.",
        }
    }
}

/// Display-ready projection of one rental.
#[derive(Debug, Clone, PartialEq)]
pub struct RentalView {
    /// Rental shown.
    pub rental_id: RentalId,
    /// Canonical status.
    pub status: RentalStatus,
    /// Short status badge.
    pub badge: &'static str,
    /// One-line status explanation.
    pub description: &'static str,
    /// Next customer action.
    pub next_action: NextAction,
    /// Vehicle label.
    pub vehicle: String,
    /// Package label with its duration.
    pub package: String,
    /// Formatted total cost.
    pub total_cost: String,
    /// Start time plus package duration, once started.
    pub expected_end: Option<DateTime<Utc>>,
    /// Formatted elapsed time, once started.
    pub elapsed: Option<String>,
    /// Formatted remaining time, once started.
    pub countdown: Option<String>,
    /// Share of the package used, 0..=100.
    pub percent_complete: f64,
    /// Progress bar band.
    pub progress: ProgressTone,
    /// Time alert, if any.
    pub alert: Option<TimeAlert>,
}

impl RentalView {
    /// Projects `rental` with its current `window`.
    pub fn project(rental: &Rental, window: &TimeWindow) -> Self {
        let started = window.is_started();
        Self {
            rental_id: rental.id,
            status: rental.status,
            badge: status_badge(rental.status),
            description: status_description(rental.status),
            next_action: NextAction::for_status(rental.status),
            vehicle: rental.vehicle.label(),
            package: package_label(rental),
            total_cost: format_amount(rental.total_cost),
            expected_end: started.then(|| rental.expected_end_time()).flatten(),
            elapsed: started.then(|| format_duration(window.elapsed_ms)),
            countdown: window.remaining_ms.map(format_duration),
            percent_complete: window.percent_complete,
            progress: ProgressTone::for_percent(window.percent_complete),
            alert: TimeAlert::for_window(window),
        }
    }
}

/// Short badge text for `status`.
pub fn status_badge(status: RentalStatus) -> &'static str {
    match status {
        RentalStatus::Pending => "Awaiting payment",
        RentalStatus::Paid => "Paid",
        RentalStatus::Active => "In use",
        RentalStatus::Completed => "Completed",
        RentalStatus::Cancelled => "Cancelled",
    }
}

/// One-line explanation of `status`.
pub fn status_description(status: RentalStatus) -> &'static str {
    match status {
        RentalStatus::Pending => "Waiting for payment confirmation.",
        RentalStatus::Paid => "Paid. Scan the QR code on the vehicle to start.",
        RentalStatus::Active => "Rental in progress. The clock is running.",
        RentalStatus::Completed => "Vehicle returned. Thanks for riding.",
        RentalStatus::Cancelled => "This rental was cancelled.",
    }
}

/// Formats milliseconds as `1h 2m 3s`, `2m 3s` or `3s`.
pub fn format_duration(ms: u64) -> String {
    let total_seconds = ms / 1_000;
    let hours = total_seconds / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Formats an amount as whole currency units with thousands separators.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp(0).normalize();
    let digits = rounded.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped} {CURRENCY}")
}

/// Name of station `id` from `stations`, or `Station <id>`.
pub fn station_label(stations: &[Station], id: StationId) -> String {
    stations
        .iter()
        .find(|station| station.id == id && !station.name.trim().is_empty())
        .map(|station| station.name.clone())
        .unwrap_or_else(|| format!("Station {id}"))
}

pub(crate) fn package_label(rental: &Rental) -> String {
    format!(
        "{} ({}h)",
        rental.package.name, rental.package.duration_hours
    )
}

/// How the customer can recover from a failed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryHint {
    /// Scan the code again.
    RescanCode,
    /// Try the same action again.
    RetryManually,
    /// Reload the rental before doing anything else.
    ReloadRental,
    /// Sign in again.
    SignInAgain,
}

impl RecoveryHint {
    /// Hint for a lifecycle failure. `None` when there is nothing to do.
    pub fn for_error(error: &LifecycleError) -> Option<Self> {
        match error {
            LifecycleError::IdentityMismatch { .. }
            | LifecycleError::UnrecognizedCode
            | LifecycleError::WrongCodeKind { .. } => Some(Self::RescanCode),
            LifecycleError::InvalidTransition { .. } | LifecycleError::StaleSnapshot { .. } => {
                Some(Self::ReloadRental)
            }
            LifecycleError::SessionInvalid => Some(Self::SignInAgain),
            LifecycleError::RemoteFailure(remote) => match classify_remote_error(remote) {
                FailureClass::SessionExpired => Some(Self::SignInAgain),
                FailureClass::Transient | FailureClass::Permanent => Some(Self::RetryManually),
            },
            LifecycleError::OperationInProgress { .. } | LifecycleError::Detached => None,
        }
    }

    /// Hint text.
    pub fn message(self) -> &'static str {
        match self {
            Self::RescanCode => "Scan the code again.",
            Self::RetryManually => "Try again.",
            Self::ReloadRental => "Reload the rental to see its latest state.",
            Self::SignInAgain => "Sign in again to continue.",
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for view formatting helpers.

    use super::*;

    #[test]
    fn durations_drop_leading_zero_units() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59_999), "59s");
        assert_eq!(format_duration(61_000), "1m 1s");
        assert_eq!(format_duration(7_200_000), "2h 0m 0s");
        assert_eq!(format_duration(3_723_000), "1h 2m 3s");
    }

    #[test]
    fn amounts_are_grouped_in_thousands() {
        assert_eq!(format_amount(Decimal::new(150_000, 0)), "150,000 VND");
        assert_eq!(format_amount(Decimal::new(999, 0)), "999 VND");
        assert_eq!(format_amount(Decimal::new(1_234_567_80, 2)), "1,234,568 VND");
        assert_eq!(format_amount(Decimal::ZERO), "0 VND");
    }

    #[test]
    fn progress_bands_switch_above_seventy_and_ninety() {
        assert_eq!(ProgressTone::for_percent(70.0), ProgressTone::Normal);
        assert_eq!(ProgressTone::for_percent(70.5), ProgressTone::Warning);
        assert_eq!(ProgressTone::for_percent(90.0), ProgressTone::Warning);
        assert_eq!(ProgressTone::for_percent(100.0), ProgressTone::Critical);
    }

    #[test]
    fn alerts_follow_remaining_time() {
        assert_eq!(TimeAlert::for_window(&TimeWindow::NOT_STARTED), None);

        let window = |remaining_ms| TimeWindow {
            elapsed_ms: 0,
            remaining_ms: Some(remaining_ms),
            percent_complete: 0.0,
        };
        assert_eq!(TimeAlert::for_window(&window(ENDING_SOON_MS)), None);
        assert_eq!(
            TimeAlert::for_window(&window(ENDING_SOON_MS - 1)),
            Some(TimeAlert::EndingSoon)
        );
        assert_eq!(TimeAlert::for_window(&window(0)), Some(TimeAlert::Overdue));
    }
}
