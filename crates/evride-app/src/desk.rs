//! Confirmation desk: review, then submit exactly once per confirmed ticket.

use evride_core::{Rental, Station};
use evride_lifecycle::{LifecycleError, RentalController, Transition};
use evride_qr::{QrReference, ScannedCode};
use evride_remote::ExternalPayment;
use evride_ui::{
    ClickDecision, ConfirmationFlow, ConfirmationState, ConfirmationSummary, ConfirmationTicket,
    TicketIssuer, station_label,
};
use url::Url;

use crate::redact_sensitive;

/// Side-effecting action awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeskAction {
    /// Confirm payment directly.
    ConfirmPayment,
    /// Pay through the external gateway.
    ExternalPayment,
    /// Start the rental with a scanned vehicle code.
    Pickup(ScannedCode),
    /// End the rental with a scanned station code.
    Return(ScannedCode),
}

impl DeskAction {
    /// Transition the action runs.
    pub fn transition(&self) -> Transition {
        match self {
            Self::ConfirmPayment => Transition::ConfirmPayment,
            Self::ExternalPayment => Transition::StartExternalPayment,
            Self::Pickup(_) => Transition::Pickup,
            Self::Return(_) => Transition::Return,
        }
    }

    fn payload(&self) -> &str {
        match self {
            Self::Pickup(code) | Self::Return(code) => code.raw(),
            Self::ConfirmPayment | Self::ExternalPayment => "",
        }
    }
}

/// Result of a submitted action.
#[derive(Debug, Clone, PartialEq)]
pub enum DeskOutcome {
    /// The authority answered with a new snapshot.
    Updated(Rental),
    /// The customer must finish payment at this URL.
    Redirect(Url),
}

/// Runs side-effecting actions only through confirmed tickets.
#[derive(Debug)]
pub struct ConfirmationDesk {
    flow: ConfirmationFlow,
    stations: Vec<Station>,
    pending: Option<(ConfirmationTicket, DeskAction)>,
}

impl ConfirmationDesk {
    /// Creates a desk issuing tickets from `issuer`.
    pub fn new(issuer: TicketIssuer) -> Self {
        Self {
            flow: ConfirmationFlow::new(issuer),
            stations: Vec::new(),
            pending: None,
        }
    }

    /// Station list used to name return destinations.
    pub fn with_stations(mut self, stations: Vec<Station>) -> Self {
        self.stations = stations;
        self
    }

    /// Current confirmation state.
    pub fn state(&self) -> &ConfirmationState {
        self.flow.state()
    }

    /// Opens a confirmation for `action` on `controller`'s rental.
    ///
    /// Returns `None` while a submission is outstanding.
    pub fn review(
        &mut self,
        controller: &RentalController,
        action: DeskAction,
    ) -> Option<(ConfirmationTicket, ConfirmationSummary)> {
        let mut summary = ConfirmationSummary::new(
            action.transition(),
            &controller.snapshot(),
            &controller.time_window(),
        );
        if let DeskAction::Return(code) = &action
            && let QrReference::Station(station_id) = code.reference()
        {
            summary = summary.with_destination(station_label(&self.stations, station_id));
        }

        let ticket = self.flow.open(summary.clone(), action.payload())?;
        self.pending = Some((ticket.clone(), action));
        Some((ticket, summary))
    }

    /// Closes the open confirmation without submitting.
    pub fn dismiss(&mut self) {
        self.flow.dismiss();
        self.pending = None;
    }

    /// Submits the action confirmed by `ticket`.
    ///
    /// Returns `None` when the click does not apply: the ticket is stale,
    /// already consumed, or another submission is outstanding. Failures send
    /// the flow back to idle with the error text for a manual retry.
    pub async fn submit(
        &mut self,
        controller: &RentalController,
        ticket: &ConfirmationTicket,
    ) -> Option<Result<DeskOutcome, LifecycleError>> {
        if !self
            .pending
            .as_ref()
            .is_some_and(|(pending, _)| pending == ticket)
        {
            return None;
        }
        if self.flow.click(ticket) == ClickDecision::Ignored {
            return None;
        }
        let (_, action) = self.pending.take()?;
        let transition = action.transition();

        let result = run(controller, action).await;
        match &result {
            Ok(outcome) => {
                self.flow.succeed(ticket, success_message(transition, outcome));
            }
            Err(error) => {
                tracing::warn!(
                    rental_id = %controller.rental_id(),
                    %transition,
                    error = %redact_sensitive(&error.to_string()),
                    "confirmed action failed"
                );
                self.flow.fail(ticket, error);
            }
        }
        Some(result)
    }
}

async fn run(
    controller: &RentalController,
    action: DeskAction,
) -> Result<DeskOutcome, LifecycleError> {
    match action {
        DeskAction::ConfirmPayment => controller.confirm_payment().await.map(DeskOutcome::Updated),
        DeskAction::ExternalPayment => {
            let description = format!(
                "Rental payment for {}",
                controller.snapshot().vehicle.label()
            );
            match controller.start_external_payment(&description).await? {
                ExternalPayment::Redirect(url) => Ok(DeskOutcome::Redirect(url)),
                ExternalPayment::Settled(rental) => Ok(DeskOutcome::Updated(*rental)),
            }
        }
        DeskAction::Pickup(code) => controller
            .pickup(&code, None)
            .await
            .map(DeskOutcome::Updated),
        DeskAction::Return(code) => controller
            .return_vehicle(&code, None)
            .await
            .map(DeskOutcome::Updated),
    }
}

fn success_message(transition: Transition, outcome: &DeskOutcome) -> String {
    match (transition, outcome) {
        (_, DeskOutcome::Redirect(_)) => {
            "Continue to the payment page to finish paying.".to_string()
        }
        (Transition::Pickup, _) => "Rental started. Enjoy the ride.".to_string(),
        (Transition::Return, _) => "Vehicle returned.".to_string(),
        _ => "Payment confirmed.".to_string(),
    }
}
