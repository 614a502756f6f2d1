//! Rental lifecycle controller.

use std::sync::{Arc, Mutex, MutexGuard};

use evride_core::{
    GeoPoint, Rental, RentalId, RentalStatus, TimeWindow, compute_time_window,
};
use evride_qr::{CodeKind, PickupVerdict, ReturnVerdict, ScannedCode, verify_pickup, verify_return};
use evride_remote::{
    ExternalPayment, ExternalPaymentRequest, GatewayOutcome, PaymentCallback, PickupRequest,
    PreorderRequest, RemoteError, ReturnRequest, classify_remote_error,
};
use tokio::sync::watch;

use crate::{Clock, LifecycleContext, LifecycleError, Transition};

/// Result of [`RentalController::refresh`].
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The authority's snapshot differed and replaced the local one.
    Applied(Rental),
    /// The authority's snapshot matched the local one.
    Unchanged,
    /// A transition was outstanding or another snapshot landed first; the
    /// answer was dropped.
    Superseded,
}

#[derive(Debug, Default)]
struct ControlState {
    in_flight: Option<Transition>,
    generation: u64,
    detached: bool,
}

/// Releases the in-flight slot on every exit path, including a dropped future.
struct InFlight<'a> {
    state: &'a Mutex<ControlState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.state).in_flight = None;
    }
}

fn lock(state: &Mutex<ControlState>) -> MutexGuard<'_, ControlState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drives one rental through its lifecycle.
///
/// # Notes
/// - One side-effecting call at a time: a second request while one is
///   outstanding fails with [`LifecycleError::OperationInProgress`] and never
///   reaches the network.
/// - The local snapshot is replaced only with the authority's answer.
/// - After [`RentalController::teardown`] no answer is applied.
pub struct RentalController {
    rental_id: RentalId,
    context: LifecycleContext,
    snapshot: watch::Sender<Rental>,
    detached: watch::Sender<bool>,
    state: Mutex<ControlState>,
}

impl RentalController {
    /// Wraps an already-fetched snapshot.
    pub fn from_snapshot(rental: Rental, context: LifecycleContext) -> Self {
        let (snapshot, _) = watch::channel(rental.clone());
        let (detached, _) = watch::channel(false);
        if !rental.start_time_consistent() {
            tracing::warn!(
                rental_id = %rental.id,
                status = %rental.status,
                "start time presence does not match status"
            );
        }

        Self {
            rental_id: rental.id,
            context,
            snapshot,
            detached,
            state: Mutex::new(ControlState::default()),
        }
    }

    /// Fetches rental `rental_id` and wraps it.
    ///
    /// # Errors
    /// [`LifecycleError::SessionInvalid`] without a usable credential,
    /// [`LifecycleError::RemoteFailure`] when the fetch fails, and
    /// [`LifecycleError::StaleSnapshot`] when another rental comes back.
    pub async fn load(rental_id: RentalId, context: LifecycleContext) -> Result<Self, LifecycleError> {
        if !context.session_usable() {
            return Err(LifecycleError::SessionInvalid);
        }

        let rental = context
            .remote
            .get_rental_details(rental_id)
            .await
            .map_err(|error| remote_failure(&context, rental_id, "load", error))?;

        if rental.id != rental_id {
            return Err(LifecycleError::StaleSnapshot {
                expected: rental_id,
                got: rental.id,
            });
        }

        Ok(Self::from_snapshot(rental, context))
    }

    /// Creates a preorder and wraps the resulting `PENDING` rental.
    ///
    /// # Errors
    /// [`LifecycleError::SessionInvalid`] without a usable credential and
    /// [`LifecycleError::RemoteFailure`] when the authority refuses.
    pub async fn preorder(
        request: &PreorderRequest,
        context: LifecycleContext,
    ) -> Result<Self, LifecycleError> {
        if !context.session_usable() {
            return Err(LifecycleError::SessionInvalid);
        }

        let rental = context.remote.create_preorder(request).await.map_err(|error| {
            if error == RemoteError::Unauthorized {
                context.session.invalidate();
            }
            LifecycleError::RemoteFailure(error)
        })?;

        if rental.status != RentalStatus::Pending {
            tracing::warn!(
                rental_id = %rental.id,
                status = %rental.status,
                "preorder answered with unexpected status"
            );
        }
        tracing::info!(rental_id = %rental.id, total_cost = %rental.total_cost, "preorder created");

        Ok(Self::from_snapshot(rental, context))
    }

    /// Rental this controller owns.
    pub fn rental_id(&self) -> RentalId {
        self.rental_id
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Rental {
        self.snapshot.borrow().clone()
    }

    /// Current status.
    pub fn status(&self) -> RentalStatus {
        self.snapshot.borrow().status
    }

    /// Time window at the clock's current instant.
    pub fn time_window(&self) -> TimeWindow {
        compute_time_window(&self.snapshot.borrow(), self.context.clock.now())
    }

    /// Receiver observing every applied snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Rental> {
        self.snapshot.subscribe()
    }

    /// Receiver that flips to `true` on teardown.
    pub fn detach_signal(&self) -> watch::Receiver<bool> {
        self.detached.subscribe()
    }

    /// Clock shared with the ticker.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.context.clock)
    }

    /// Transition currently holding the in-flight slot.
    pub fn in_flight(&self) -> Option<Transition> {
        lock(&self.state).in_flight
    }

    /// Returns `true` after [`RentalController::teardown`].
    pub fn is_detached(&self) -> bool {
        lock(&self.state).detached
    }

    /// Detaches the controller from its view.
    ///
    /// Tickers observing [`RentalController::detach_signal`] stop, and any
    /// answer arriving afterwards is dropped.
    pub fn teardown(&self) {
        let mut state = lock(&self.state);
        if state.detached {
            return;
        }
        state.detached = true;
        drop(state);

        self.detached.send_replace(true);
        tracing::debug!(rental_id = %self.rental_id, "controller detached");
    }

    /// Confirms payment. Valid only from `PENDING`.
    ///
    /// # Errors
    /// See [`LifecycleError`]; on any error the snapshot is unchanged.
    pub async fn confirm_payment(&self) -> Result<Rental, LifecycleError> {
        let transition = Transition::ConfirmPayment;
        self.check_source(transition)?;
        let _slot = self.begin(transition)?;

        tracing::info!(rental_id = %self.rental_id, %transition, "submitting");
        let answer = self.context.remote.confirm_payment(self.rental_id).await;
        self.finish(transition, answer)
    }

    /// Picks up the vehicle named by `code`. Valid only from `PAID`.
    ///
    /// The scan must name the rental's vehicle; otherwise the call is rejected
    /// without contacting the authority. `location` is optional telemetry.
    ///
    /// # Errors
    /// [`LifecycleError::IdentityMismatch`] for another vehicle,
    /// [`LifecycleError::WrongCodeKind`] for a station code,
    /// [`LifecycleError::UnrecognizedCode`] for undecodable input, plus the
    /// common transition errors.
    pub async fn pickup(
        &self,
        code: &ScannedCode,
        location: Option<GeoPoint>,
    ) -> Result<Rental, LifecycleError> {
        let transition = Transition::Pickup;
        self.check_source(transition)?;

        let verdict = verify_pickup(&code.reference(), &self.snapshot.borrow());
        let vehicle_id = match verdict {
            PickupVerdict::Match(vehicle_id) => vehicle_id,
            PickupVerdict::Mismatch { expected, got } => {
                tracing::info!(
                    rental_id = %self.rental_id,
                    %expected,
                    %got,
                    "pickup rejected: vehicle mismatch"
                );
                return Err(LifecycleError::IdentityMismatch { expected, got });
            }
            PickupVerdict::NotAVehicleCode(kind) => {
                return Err(wrong_code(CodeKind::Vehicle, kind));
            }
        };

        let _slot = self.begin(transition)?;
        let request = PickupRequest {
            vehicle_id,
            qr_code: code.raw().to_string(),
            location: location.unwrap_or(GeoPoint::UNKNOWN),
        };

        tracing::info!(rental_id = %self.rental_id, %transition, %vehicle_id, "submitting");
        let answer = self.context.remote.pickup(self.rental_id, &request).await;
        self.finish(transition, answer)
    }

    /// Returns the vehicle at the station named by `code`. Valid only from
    /// `ACTIVE`.
    ///
    /// The scanned station is sent as the destination even when it differs
    /// from the vehicle's origin station.
    ///
    /// # Errors
    /// [`LifecycleError::WrongCodeKind`] for a vehicle code,
    /// [`LifecycleError::UnrecognizedCode`] for undecodable input, plus the
    /// common transition errors.
    pub async fn return_vehicle(
        &self,
        code: &ScannedCode,
        location: Option<GeoPoint>,
    ) -> Result<Rental, LifecycleError> {
        let transition = Transition::Return;
        self.check_source(transition)?;

        let station_id = match verify_return(&code.reference()) {
            ReturnVerdict::Station(station_id) => station_id,
            ReturnVerdict::NotAStationCode(kind) => {
                return Err(wrong_code(CodeKind::Station, kind));
            }
        };

        let _slot = self.begin(transition)?;
        let request = ReturnRequest {
            station_id,
            qr_code: code.raw().to_string(),
            location: location.unwrap_or(GeoPoint::UNKNOWN),
        };

        tracing::info!(rental_id = %self.rental_id, %transition, %station_id, "submitting");
        let answer = self
            .context
            .remote
            .return_vehicle(self.rental_id, &request)
            .await;
        self.finish(transition, answer)
    }

    /// Starts a payment at the external gateway. Valid only from `PENDING`.
    ///
    /// The charged amount is the rental's total cost. A synchronous settlement
    /// is applied like any other answer; a redirect leaves the snapshot as is.
    ///
    /// # Errors
    /// See [`LifecycleError`].
    pub async fn start_external_payment(
        &self,
        description: &str,
    ) -> Result<ExternalPayment, LifecycleError> {
        let transition = Transition::StartExternalPayment;
        self.check_source(transition)?;
        let _slot = self.begin(transition)?;

        let request = ExternalPaymentRequest {
            rental_id: self.rental_id,
            amount: self.snapshot.borrow().total_cost,
            order_info: description.to_string(),
        };

        tracing::info!(rental_id = %self.rental_id, %transition, amount = %request.amount, "submitting");
        let answer = self.context.remote.create_external_payment(&request).await;
        match answer {
            Ok(ExternalPayment::Settled(rental)) => {
                let applied = self.finish(transition, Ok(*rental))?;
                Ok(ExternalPayment::Settled(Box::new(applied)))
            }
            Ok(ExternalPayment::Redirect(url)) => {
                if lock(&self.state).detached {
                    return Err(LifecycleError::Detached);
                }
                tracing::info!(rental_id = %self.rental_id, host = url.host_str().unwrap_or_default(), "payment redirect issued");
                Ok(ExternalPayment::Redirect(url))
            }
            Err(error) => Err(self.fail(transition, error)),
        }
    }

    /// Forwards a gateway callback and applies the resulting snapshot.
    ///
    /// Valid from `PENDING` and `PAID`; a repeated callback on a paid rental is
    /// accepted.
    ///
    /// # Errors
    /// [`LifecycleError::StaleSnapshot`] when the callback names another
    /// rental, plus the common transition errors.
    pub async fn apply_payment_callback(
        &self,
        callback: &PaymentCallback,
    ) -> Result<Rental, LifecycleError> {
        let transition = Transition::ApplyPaymentCallback;
        self.check_source(transition)?;

        if let Some(got) = callback.rental_id()
            && got != self.rental_id
        {
            return Err(LifecycleError::StaleSnapshot {
                expected: self.rental_id,
                got,
            });
        }

        let _slot = self.begin(transition)?;
        let outcome = callback.outcome();
        tracing::info!(rental_id = %self.rental_id, %transition, approved = outcome == GatewayOutcome::Approved, "submitting");

        let answer = self.context.remote.handle_payment_callback(callback).await;
        let expected = match outcome {
            GatewayOutcome::Approved => Some(RentalStatus::Paid),
            _ => None,
        };
        self.finish_expecting(transition, expected, answer)
    }

    /// Re-reads the rental from the authority.
    ///
    /// The answer is applied only if no transition is outstanding and no other
    /// snapshot landed while the read was in flight. An identical answer
    /// leaves the snapshot untouched.
    ///
    /// # Errors
    /// [`LifecycleError::Detached`], [`LifecycleError::SessionInvalid`],
    /// [`LifecycleError::RemoteFailure`] or [`LifecycleError::StaleSnapshot`].
    pub async fn refresh(&self) -> Result<RefreshOutcome, LifecycleError> {
        let generation = {
            let state = lock(&self.state);
            if state.detached {
                return Err(LifecycleError::Detached);
            }
            state.generation
        };
        if !self.context.session_usable() {
            return Err(LifecycleError::SessionInvalid);
        }

        let answer = self.context.remote.get_rental_details(self.rental_id).await;
        let rental =
            answer.map_err(|error| remote_failure(&self.context, self.rental_id, "refresh", error))?;

        let mut state = lock(&self.state);
        if state.detached {
            return Err(LifecycleError::Detached);
        }
        if state.in_flight.is_some() || state.generation != generation {
            tracing::debug!(rental_id = %self.rental_id, "refresh superseded");
            return Ok(RefreshOutcome::Superseded);
        }
        self.ensure_identity(&rental)?;
        if *self.snapshot.borrow() == rental {
            return Ok(RefreshOutcome::Unchanged);
        }

        self.publish(&mut state, rental.clone());
        tracing::info!(rental_id = %self.rental_id, status = %rental.status, "refresh applied");
        Ok(RefreshOutcome::Applied(rental))
    }

    fn check_source(&self, transition: Transition) -> Result<(), LifecycleError> {
        if lock(&self.state).detached {
            return Err(LifecycleError::Detached);
        }

        let from = self.status();
        if !transition.allowed_from().contains(&from) {
            tracing::debug!(rental_id = %self.rental_id, %transition, status = %from, "transition rejected locally");
            return Err(LifecycleError::InvalidTransition { transition, from });
        }

        if !self.context.session_usable() {
            return Err(LifecycleError::SessionInvalid);
        }
        Ok(())
    }

    fn begin(&self, transition: Transition) -> Result<InFlight<'_>, LifecycleError> {
        let mut state = lock(&self.state);
        if state.detached {
            return Err(LifecycleError::Detached);
        }
        if let Some(running) = state.in_flight {
            tracing::debug!(rental_id = %self.rental_id, requested = %transition, %running, "transition already outstanding");
            return Err(LifecycleError::OperationInProgress {
                requested: transition,
                running,
            });
        }

        state.in_flight = Some(transition);
        Ok(InFlight { state: &self.state })
    }

    fn finish(
        &self,
        transition: Transition,
        answer: Result<Rental, RemoteError>,
    ) -> Result<Rental, LifecycleError> {
        self.finish_expecting(transition, transition.expected_outcome(), answer)
    }

    fn finish_expecting(
        &self,
        transition: Transition,
        expected: Option<RentalStatus>,
        answer: Result<Rental, RemoteError>,
    ) -> Result<Rental, LifecycleError> {
        let rental = answer.map_err(|error| self.fail(transition, error))?;

        let mut state = lock(&self.state);
        if state.detached {
            tracing::debug!(rental_id = %self.rental_id, %transition, "answer dropped after teardown");
            return Err(LifecycleError::Detached);
        }
        self.ensure_identity(&rental)?;

        if let Some(expected) = expected
            && rental.status != expected
        {
            tracing::warn!(
                rental_id = %self.rental_id,
                %transition,
                %expected,
                status = %rental.status,
                "authority answered with unexpected status; applying it"
            );
        }
        let previous = self.snapshot.borrow().status;
        if previous != rental.status && !previous.can_advance_to(rental.status) {
            tracing::warn!(
                rental_id = %self.rental_id,
                from = %previous,
                to = %rental.status,
                "status moved against the lifecycle order"
            );
        }

        self.publish(&mut state, rental.clone());
        tracing::info!(rental_id = %self.rental_id, %transition, status = %rental.status, "transition applied");
        Ok(rental)
    }

    fn fail(&self, transition: Transition, error: RemoteError) -> LifecycleError {
        if error == RemoteError::Unauthorized {
            self.context.session.invalidate();
        }
        tracing::warn!(
            rental_id = %self.rental_id,
            %transition,
            failure = ?classify_remote_error(&error),
            "transition failed"
        );
        LifecycleError::RemoteFailure(error)
    }

    fn ensure_identity(&self, rental: &Rental) -> Result<(), LifecycleError> {
        if rental.id == self.rental_id {
            return Ok(());
        }
        tracing::warn!(rental_id = %self.rental_id, got = %rental.id, "authority answered for another rental");
        Err(LifecycleError::StaleSnapshot {
            expected: self.rental_id,
            got: rental.id,
        })
    }

    fn publish(&self, state: &mut ControlState, rental: Rental) {
        state.generation = state.generation.wrapping_add(1);
        self.snapshot.send_replace(rental);
    }
}

impl Drop for RentalController {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn wrong_code(expected: CodeKind, got: CodeKind) -> LifecycleError {
    match got {
        CodeKind::Unrecognized => LifecycleError::UnrecognizedCode,
        got => LifecycleError::WrongCodeKind { expected, got },
    }
}

fn remote_failure(
    context: &LifecycleContext,
    rental_id: RentalId,
    operation: &'static str,
    error: RemoteError,
) -> LifecycleError {
    if error == RemoteError::Unauthorized {
        context.session.invalidate();
    }
    tracing::warn!(
        %rental_id,
        operation,
        failure = ?classify_remote_error(&error),
        "remote read failed"
    );
    LifecycleError::RemoteFailure(error)
}
