//! Confirmation flow for side-effecting transitions.
//!
//! A confirmation is opened with a summary and a fresh [`ConfirmationTicket`].
//! Only a click carrying the ticket of the open confirmation submits, and each
//! ticket submits at most once.

use std::collections::VecDeque;
use std::mem;

use evride_core::{Rental, RentalId, TimeWindow};
use evride_lifecycle::{LifecycleError, Transition};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};

use crate::{RecoveryHint, format_amount, format_duration, package_label};

/// Number of consumed ticket keys a flow remembers.
pub const CONSUMED_TICKET_MEMORY: usize = 16;

/// What the customer is asked to confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationSummary {
    /// Transition to run.
    pub transition: Transition,
    /// Rental it applies to.
    pub rental_id: RentalId,
    /// Vehicle label.
    pub vehicle: String,
    /// Package label.
    pub package: String,
    /// Formatted cost.
    pub cost: String,
    /// Time used so far, for returns.
    pub elapsed: Option<String>,
    /// Return station label, for returns.
    pub destination: Option<String>,
}

impl ConfirmationSummary {
    /// Summarizes `transition` on `rental` as of `window`.
    pub fn new(transition: Transition, rental: &Rental, window: &TimeWindow) -> Self {
        let elapsed = (transition == Transition::Return && window.is_started())
            .then(|| format_duration(window.elapsed_ms));

        Self {
            transition,
            rental_id: rental.id,
            vehicle: rental.vehicle.label(),
            package: package_label(rental),
            cost: format_amount(rental.total_cost),
            elapsed,
            destination: None,
        }
    }

    /// Adds the return station label.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Question shown above the summary.
    pub fn headline(&self) -> String {
        format!("Ready to {}?", self.transition.label())
    }

    /// Summary rows in display order.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Rental: #{}", self.rental_id),
            format!("Vehicle: {}", self.vehicle),
            format!("Package: {}", self.package),
            format!("Cost: {}", self.cost),
        ];
        if let Some(elapsed) = &self.elapsed {
            lines.push(format!("Time used: {elapsed}"));
        }
        if let Some(destination) = &self.destination {
            lines.push(format!("Return to: {destination}"));
        }
        lines
    }
}

/// Single-use token tying a click to one opened confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfirmationTicket {
    key: String,
    rental_id: RentalId,
    transition: Transition,
}

impl ConfirmationTicket {
    /// Hex SHA-256 fingerprint identifying the ticket.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Rental the ticket was issued for.
    pub fn rental_id(&self) -> RentalId {
        self.rental_id
    }

    /// Transition the ticket confirms.
    pub fn transition(&self) -> Transition {
        self.transition
    }
}

/// Issues tickets with nonces from a seeded generator.
#[derive(Debug, Clone)]
pub struct TicketIssuer {
    rng: StdRng,
}

impl TicketIssuer {
    /// Creates an issuer whose nonce sequence is fixed by `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates an issuer seeded from the operating system.
    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Issues a ticket for `transition` on `rental_id` with the scanned
    /// `payload` (empty for payments).
    pub fn issue(
        &mut self,
        rental_id: RentalId,
        transition: Transition,
        payload: &str,
    ) -> ConfirmationTicket {
        let nonce = self.rng.next_u64();
        let mut hasher = Sha256::new();
        hasher.update(rental_id.get().to_be_bytes());
        hasher.update(transition.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(payload.as_bytes());
        hasher.update([0u8]);
        hasher.update(nonce.to_be_bytes());

        ConfirmationTicket {
            key: hex::encode(hasher.finalize()),
            rental_id,
            transition,
        }
    }
}

/// Outcome shown after a submission finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The transition went through.
    Success(String),
    /// The transition failed; the message is shown verbatim.
    Failure {
        /// Error text.
        message: String,
        /// Recovery hint, if any.
        hint: Option<RecoveryHint>,
    },
}

/// Confirmation dialog state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationState {
    /// No dialog open; carries the last outcome.
    Idle {
        /// Outcome of the last submission.
        notice: Option<Notice>,
    },
    /// Summary shown, waiting for the click.
    Reviewing {
        /// Ticket a click must carry.
        ticket: ConfirmationTicket,
        /// What is being confirmed.
        summary: ConfirmationSummary,
    },
    /// Click accepted, remote call outstanding.
    Submitting {
        /// Ticket being submitted.
        ticket: ConfirmationTicket,
        /// What is being confirmed.
        summary: ConfirmationSummary,
    },
}

impl ConfirmationState {
    /// Returns `true` while a submission is outstanding.
    pub fn is_submitting(&self) -> bool {
        matches!(self, Self::Submitting { .. })
    }

    /// Last outcome, when idle.
    pub fn notice(&self) -> Option<&Notice> {
        match self {
            Self::Idle { notice } => notice.as_ref(),
            Self::Reviewing { .. } | Self::Submitting { .. } => None,
        }
    }
}

/// Result of a confirmation click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickDecision {
    /// Run the transition now.
    Submit(Transition),
    /// Stale, repeated or unexpected click; do nothing.
    Ignored,
}

/// Drives [`ConfirmationState`] and remembers the most recent consumed
/// tickets.
#[derive(Debug)]
pub struct ConfirmationFlow {
    state: ConfirmationState,
    issuer: TicketIssuer,
    consumed: VecDeque<String>,
}

impl ConfirmationFlow {
    /// Creates an idle flow.
    pub fn new(issuer: TicketIssuer) -> Self {
        Self {
            state: ConfirmationState::Idle { notice: None },
            issuer,
            consumed: VecDeque::with_capacity(CONSUMED_TICKET_MEMORY),
        }
    }

    /// Current state.
    pub fn state(&self) -> &ConfirmationState {
        &self.state
    }

    /// Opens a confirmation for `summary`.
    ///
    /// Returns `None` while a submission is outstanding. Opening again while
    /// reviewing replaces the ticket.
    pub fn open(
        &mut self,
        summary: ConfirmationSummary,
        payload: &str,
    ) -> Option<ConfirmationTicket> {
        if self.state.is_submitting() {
            return None;
        }

        let ticket = self
            .issuer
            .issue(summary.rental_id, summary.transition, payload);
        self.state = ConfirmationState::Reviewing {
            ticket: ticket.clone(),
            summary,
        };
        Some(ticket)
    }

    /// Closes an open confirmation without submitting.
    pub fn dismiss(&mut self) {
        if matches!(self.state, ConfirmationState::Reviewing { .. }) {
            self.state = ConfirmationState::Idle { notice: None };
        }
    }

    /// Handles a click carrying `ticket`.
    pub fn click(&mut self, ticket: &ConfirmationTicket) -> ClickDecision {
        if self.consumed.iter().any(|key| key == ticket.key()) {
            return ClickDecision::Ignored;
        }

        match mem::replace(&mut self.state, ConfirmationState::Idle { notice: None }) {
            ConfirmationState::Reviewing {
                ticket: open,
                summary,
            } if open == *ticket => {
                if self.consumed.len() == CONSUMED_TICKET_MEMORY {
                    self.consumed.pop_front();
                }
                self.consumed.push_back(open.key.clone());
                let transition = open.transition;
                self.state = ConfirmationState::Submitting {
                    ticket: open,
                    summary,
                };
                ClickDecision::Submit(transition)
            }
            other => {
                self.state = other;
                ClickDecision::Ignored
            }
        }
    }

    /// Records a successful submission of `ticket`.
    ///
    /// Returns `false` if `ticket` is not the one being submitted.
    pub fn succeed(&mut self, ticket: &ConfirmationTicket, message: impl Into<String>) -> bool {
        self.finish(ticket, Notice::Success(message.into()))
    }

    /// Records a failed submission of `ticket` and returns to idle so the
    /// customer can retry by hand.
    pub fn fail(&mut self, ticket: &ConfirmationTicket, error: &LifecycleError) -> bool {
        self.finish(
            ticket,
            Notice::Failure {
                message: error.to_string(),
                hint: RecoveryHint::for_error(error),
            },
        )
    }

    fn finish(&mut self, ticket: &ConfirmationTicket, notice: Notice) -> bool {
        match &self.state {
            ConfirmationState::Submitting { ticket: running, .. } if running == ticket => {
                self.state = ConfirmationState::Idle {
                    notice: Some(notice),
                };
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_yields_same_keys() {
        let mut first = TicketIssuer::seeded(7);
        let mut second = TicketIssuer::seeded(7);

        let a = first.issue(RentalId(42), Transition::Pickup, "VEHICLE_7");
        let b = second.issue(RentalId(42), Transition::Pickup, "VEHICLE_7");
        assert_eq!(a, b);
        assert_eq!(a.key().len(), 64);

        let c = first.issue(RentalId(42), Transition::Pickup, "VEHICLE_7");
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn consumed_keys_stay_bounded() {
        let mut flow = ConfirmationFlow::new(TicketIssuer::seeded(1));
        let summary = ConfirmationSummary {
            transition: Transition::ConfirmPayment,
            rental_id: RentalId(42),
            vehicle: "EB-007".to_string(),
            package: "Two hours (2h)".to_string(),
            cost: "150,000 VND".to_string(),
            elapsed: None,
            destination: None,
        };

        let mut last = None;
        for _ in 0..CONSUMED_TICKET_MEMORY * 3 {
            let ticket = flow
                .open(summary.clone(), "")
                .expect("flow should be idle between submissions");
            assert_eq!(
                flow.click(&ticket),
                ClickDecision::Submit(Transition::ConfirmPayment)
            );
            assert!(flow.succeed(&ticket, "Payment confirmed."));
            last = Some(ticket);
        }

        assert_eq!(flow.consumed.len(), CONSUMED_TICKET_MEMORY);
        let last = last.expect("at least one ticket was issued");
        assert_eq!(flow.click(&last), ClickDecision::Ignored);
    }
}
