#![warn(missing_docs)]
//! # evride-lifecycle
//!
//! ## Purpose
//! Drives one rental through `PENDING -> PAID -> ACTIVE -> COMPLETED` against
//! the remote authority, and keeps its time window fresh while it is active.
//!
//! ## Responsibilities
//! - Guard every transition by source status and, for pickup/return, by the
//!   identity of the scanned code.
//! - Allow at most one side-effecting remote call per rental at a time.
//! - Replace the local snapshot only with the authority's answer.
//! - Publish snapshots and time windows on `tokio::sync::watch` channels.
//! - Stop all work when the owning view is torn down.
//!
//! ## Data flow
//! View trigger -> [`RentalController`] guard checks -> remote call ->
//! snapshot replaced -> subscribers and [`TimeWindowTicker`] observe it.
//!
//! ## Ownership and lifetimes
//! A controller owns its snapshot channel. The remote authority, session and
//! clock are shared `Arc`s bundled in [`LifecycleContext`]. The ticker runs as
//! a spawned task whose handle aborts it on drop.
//!
//! ## Error model
//! Every rejection is a [`LifecycleError`]. Local rejections never reach the
//! network; remote failures keep the server's message.
//!
//! ## Security and privacy notes
//! Logs carry rental ids, transitions and statuses only. Remote error text is
//! left to the caller, which redacts it before logging.

mod controller;
mod ticker;

use std::fmt;
use std::sync::Arc;

use evride_core::{RentalId, RentalStatus, VehicleId};
use evride_qr::CodeKind;
use evride_remote::{RemoteAuthority, RemoteError};
use evride_session::SessionContext;
use thiserror::Error;

pub use controller::{RefreshOutcome, RentalController};
pub use evride_core::{Clock, ManualClock, SystemClock};
pub use ticker::{DEFAULT_TICK_INTERVAL_MS, MIN_TICK_INTERVAL, TickerExit, TimeWindowTicker};

/// Collaborators shared by every controller of a session.
#[derive(Clone)]
pub struct LifecycleContext {
    /// System of record.
    pub remote: Arc<dyn RemoteAuthority>,
    /// Customer session.
    pub session: Arc<SessionContext>,
    /// Time source for windows and credential expiry.
    pub clock: Arc<dyn Clock>,
}

impl LifecycleContext {
    /// Creates a context reading the system clock.
    pub fn new(remote: Arc<dyn RemoteAuthority>, session: Arc<SessionContext>) -> Self {
        Self {
            remote,
            session,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn session_usable(&self) -> bool {
        self.session.is_usable(self.clock.now_ms())
    }
}

/// Side-effecting operation on a rental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// `PENDING -> PAID` via direct confirmation.
    ConfirmPayment,
    /// `PENDING -> PAID` via the external gateway.
    StartExternalPayment,
    /// Gateway callback settlement.
    ApplyPaymentCallback,
    /// `PAID -> ACTIVE`.
    Pickup,
    /// `ACTIVE -> COMPLETED`.
    Return,
}

impl Transition {
    /// Stable name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfirmPayment => "confirm_payment",
            Self::StartExternalPayment => "start_external_payment",
            Self::ApplyPaymentCallback => "apply_payment_callback",
            Self::Pickup => "pickup",
            Self::Return => "return_vehicle",
        }
    }

    /// Human-facing verb phrase.
    pub fn label(self) -> &'static str {
        match self {
            Self::ConfirmPayment => "confirm payment",
            Self::StartExternalPayment => "start payment",
            Self::ApplyPaymentCallback => "apply payment result",
            Self::Pickup => "pick up the vehicle",
            Self::Return => "return the vehicle",
        }
    }

    /// Source statuses from which the transition may start.
    pub fn allowed_from(self) -> &'static [RentalStatus] {
        match self {
            Self::ConfirmPayment | Self::StartExternalPayment => &[RentalStatus::Pending],
            Self::ApplyPaymentCallback => &[RentalStatus::Pending, RentalStatus::Paid],
            Self::Pickup => &[RentalStatus::Paid],
            Self::Return => &[RentalStatus::Active],
        }
    }

    /// Status the authority is expected to answer with, if fixed.
    pub fn expected_outcome(self) -> Option<RentalStatus> {
        match self {
            Self::ConfirmPayment | Self::StartExternalPayment => Some(RentalStatus::Paid),
            Self::ApplyPaymentCallback => None,
            Self::Pickup => Some(RentalStatus::Active),
            Self::Return => Some(RentalStatus::Completed),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle controller errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The rental's status does not allow the transition.
    #[error("cannot {} while the rental is {from}", .transition.label())]
    InvalidTransition {
        /// Requested transition.
        transition: Transition,
        /// Status at the time of the request.
        from: RentalStatus,
    },
    /// A different vehicle was scanned at pickup.
    #[error("scanned vehicle {got} does not match the rented vehicle {expected}")]
    IdentityMismatch {
        /// Vehicle booked on the rental.
        expected: VehicleId,
        /// Vehicle that was scanned.
        got: VehicleId,
    },
    /// The scanned code could not be decoded.
    #[error("code not recognized; scan again")]
    UnrecognizedCode,
    /// A decodable code of the wrong kind was scanned.
    #[error("expected a {expected} but scanned a {got}")]
    WrongCodeKind {
        /// Kind the transition needs.
        expected: CodeKind,
        /// Kind that was scanned.
        got: CodeKind,
    },
    /// Another transition on this rental is still outstanding.
    #[error("{running} is already in progress")]
    OperationInProgress {
        /// Transition that was rejected.
        requested: Transition,
        /// Transition holding the slot.
        running: Transition,
    },
    /// The authority rejected or failed the call.
    #[error(transparent)]
    RemoteFailure(#[from] RemoteError),
    /// The authority answered with a different rental.
    #[error("received rental {got} while showing rental {expected}; reload")]
    StaleSnapshot {
        /// Rental the controller owns.
        expected: RentalId,
        /// Rental id in the answer.
        got: RentalId,
    },
    /// No usable credential; sign in again.
    #[error("sign in to continue")]
    SessionInvalid,
    /// The owning view was torn down.
    #[error("rental view was closed")]
    Detached,
}
