//! Deterministic in-memory authority for tests and offline runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evride_core::{Rental, RentalId, RentalPackage, RentalStatus, Station, UserId};
use tokio::sync::Notify;
use url::Url;

use crate::{
    ExternalPayment, ExternalPaymentRequest, GatewayOutcome, PaymentCallback, PickupRequest,
    PreorderRequest, RemoteAuthority, RemoteError, ReturnRequest,
};

/// One call received by [`ScriptedAuthority`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// `createPreorder`.
    CreatePreorder(PreorderRequest),
    /// `confirmPayment`.
    ConfirmPayment(RentalId),
    /// `pickup`.
    Pickup(RentalId, PickupRequest),
    /// `returnVehicle`.
    ReturnVehicle(RentalId, ReturnRequest),
    /// `getRentalDetails`.
    GetRentalDetails(RentalId),
    /// `createExternalPayment`.
    CreateExternalPayment(ExternalPaymentRequest),
    /// `handlePaymentCallback`.
    HandlePaymentCallback(PaymentCallback),
    /// `listStations`.
    ListStations,
    /// `listPackages`.
    ListPackages,
    /// `listUserRentals`.
    ListUserRentals(UserId),
}

impl RemoteCall {
    /// Returns `true` for calls that mutate server state.
    pub fn is_side_effecting(&self) -> bool {
        !matches!(
            self,
            Self::GetRentalDetails(_)
                | Self::ListStations
                | Self::ListPackages
                | Self::ListUserRentals(_)
        )
    }
}

#[derive(Debug)]
struct ScriptState {
    rental: Rental,
    stations: Vec<Station>,
    packages: Vec<RentalPackage>,
    history: Vec<Rental>,
    calls: Vec<RemoteCall>,
    failures: VecDeque<RemoteError>,
    now: DateTime<Utc>,
    payment_redirect: Option<Url>,
    misrouted_reads: Option<RentalId>,
}

/// Authority that keeps one rental in memory and advances it like the backend.
///
/// Every call yields to the scheduler once before answering, so concurrent
/// callers can observe an outstanding request. An optional gate holds each
/// answer until [`Notify::notify_one`] is called.
#[derive(Debug)]
pub struct ScriptedAuthority {
    state: Mutex<ScriptState>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedAuthority {
    /// Creates an authority holding `rental`, stamping times with `now`.
    pub fn new(rental: Rental, now: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                rental,
                stations: Vec::new(),
                packages: Vec::new(),
                history: Vec::new(),
                calls: Vec::new(),
                failures: VecDeque::new(),
                now,
                payment_redirect: None,
                misrouted_reads: None,
            }),
            gate: None,
        }
    }

    /// Holds every answer until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Installs the station list.
    pub fn with_stations(self, stations: Vec<Station>) -> Self {
        self.lock().stations = stations;
        self
    }

    /// Installs the package list.
    pub fn with_packages(self, packages: Vec<RentalPackage>) -> Self {
        self.lock().packages = packages;
        self
    }

    /// Installs earlier rentals returned next to the live one by history reads.
    pub fn with_history(self, history: Vec<Rental>) -> Self {
        self.lock().history = history;
        self
    }

    /// Answers payment creation with a redirect instead of settling.
    pub fn with_payment_redirect(self, url: Url) -> Self {
        self.lock().payment_redirect = Some(url);
        self
    }

    /// Queues a failure for the next call.
    pub fn fail_next(&self, error: RemoteError) {
        self.lock().failures.push_back(error);
    }

    /// Moves the server clock.
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.lock().now = now;
    }

    /// Answers detail reads with another rental's id, as a misrouted backend
    /// would.
    pub fn misroute_reads_to(&self, rental_id: RentalId) {
        self.lock().misrouted_reads = Some(rental_id);
    }

    /// Replaces the server-side rental, as another device would.
    pub fn set_rental(&self, rental: Rental) {
        self.lock().rental = rental;
    }

    /// Current server-side rental.
    pub fn rental(&self) -> Rental {
        self.lock().rental.clone()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Number of side-effecting calls received so far.
    pub fn side_effect_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.is_side_effecting())
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn answer<T: Send>(
        &self,
        call: RemoteCall,
        respond: impl FnOnce(&mut ScriptState) -> Result<T, RemoteError> + Send,
    ) -> Result<T, RemoteError> {
        self.lock().calls.push(call);
        tokio::task::yield_now().await;
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let mut state = self.lock();
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        respond(&mut *state)
    }
}

fn ensure_rental(state: &ScriptState, rental_id: RentalId) -> Result<(), RemoteError> {
    if state.rental.id == rental_id {
        Ok(())
    } else {
        Err(RemoteError::Client(404, format!("Rental {rental_id} not found")))
    }
}

fn ensure_status(state: &ScriptState, status: RentalStatus) -> Result<(), RemoteError> {
    if state.rental.status == status {
        Ok(())
    } else {
        Err(RemoteError::Client(
            400,
            format!("Rental is {}, expected {status}", state.rental.status),
        ))
    }
}

#[async_trait]
impl RemoteAuthority for ScriptedAuthority {
    async fn create_preorder(&self, request: &PreorderRequest) -> Result<Rental, RemoteError> {
        let request = request.clone();
        self.answer(RemoteCall::CreatePreorder(request.clone()), move |state| {
            state.rental.user_id = Some(request.user_id);
            state.rental.vehicle.id = request.vehicle_id;
            state.rental.package.id = request.package_id;
            state.rental.status = RentalStatus::Pending;
            state.rental.start_time = None;
            state.rental.end_time = None;
            Ok(state.rental.clone())
        })
        .await
    }

    async fn confirm_payment(&self, rental_id: RentalId) -> Result<Rental, RemoteError> {
        self.answer(RemoteCall::ConfirmPayment(rental_id), |state| {
            ensure_rental(state, rental_id)?;
            ensure_status(state, RentalStatus::Pending)?;
            state.rental.status = RentalStatus::Paid;
            Ok(state.rental.clone())
        })
        .await
    }

    async fn pickup(
        &self,
        rental_id: RentalId,
        request: &PickupRequest,
    ) -> Result<Rental, RemoteError> {
        let vehicle_id = request.vehicle_id;
        self.answer(RemoteCall::Pickup(rental_id, request.clone()), |state| {
            ensure_rental(state, rental_id)?;
            ensure_status(state, RentalStatus::Paid)?;
            if state.rental.vehicle.id != vehicle_id {
                return Err(RemoteError::Client(
                    400,
                    "QR code does not match the rented vehicle".to_string(),
                ));
            }
            state.rental.status = RentalStatus::Active;
            state.rental.start_time = Some(state.now);
            Ok(state.rental.clone())
        })
        .await
    }

    async fn return_vehicle(
        &self,
        rental_id: RentalId,
        request: &ReturnRequest,
    ) -> Result<Rental, RemoteError> {
        let station_id = request.station_id;
        self.answer(RemoteCall::ReturnVehicle(rental_id, request.clone()), |state| {
            ensure_rental(state, rental_id)?;
            ensure_status(state, RentalStatus::Active)?;
            state.rental.status = RentalStatus::Completed;
            state.rental.end_time = Some(state.now);
            state.rental.vehicle.station = None;
            state.rental.vehicle.station_id = Some(station_id);
            state.rental.vehicle.station_name = state
                .stations
                .iter()
                .find(|station| station.id == station_id)
                .map(|station| station.name.clone());
            Ok(state.rental.clone())
        })
        .await
    }

    async fn get_rental_details(&self, rental_id: RentalId) -> Result<Rental, RemoteError> {
        self.answer(RemoteCall::GetRentalDetails(rental_id), |state| {
            ensure_rental(state, rental_id)?;
            let mut rental = state.rental.clone();
            if let Some(other) = state.misrouted_reads {
                rental.id = other;
            }
            Ok(rental)
        })
        .await
    }

    async fn create_external_payment(
        &self,
        request: &ExternalPaymentRequest,
    ) -> Result<ExternalPayment, RemoteError> {
        let rental_id = request.rental_id;
        self.answer(RemoteCall::CreateExternalPayment(request.clone()), |state| {
            ensure_rental(state, rental_id)?;
            ensure_status(state, RentalStatus::Pending)?;
            if let Some(url) = &state.payment_redirect {
                return Ok(ExternalPayment::Redirect(url.clone()));
            }
            state.rental.status = RentalStatus::Paid;
            Ok(ExternalPayment::Settled(Box::new(state.rental.clone())))
        })
        .await
    }

    async fn handle_payment_callback(
        &self,
        callback: &PaymentCallback,
    ) -> Result<Rental, RemoteError> {
        let approved = callback.outcome() == GatewayOutcome::Approved;
        let rental_id = callback.rental_id();
        self.answer(RemoteCall::HandlePaymentCallback(callback.clone()), |state| {
            if let Some(rental_id) = rental_id {
                ensure_rental(state, rental_id)?;
            }
            if approved && state.rental.status == RentalStatus::Pending {
                state.rental.status = RentalStatus::Paid;
            }
            Ok(state.rental.clone())
        })
        .await
    }

    async fn list_stations(&self) -> Result<Vec<Station>, RemoteError> {
        self.answer(RemoteCall::ListStations, |state| Ok(state.stations.clone()))
            .await
    }

    async fn list_packages(&self) -> Result<Vec<RentalPackage>, RemoteError> {
        self.answer(RemoteCall::ListPackages, |state| Ok(state.packages.clone()))
            .await
    }

    async fn list_user_rentals(&self, user_id: UserId) -> Result<Vec<Rental>, RemoteError> {
        self.answer(RemoteCall::ListUserRentals(user_id), |state| {
            Ok(state
                .history
                .iter()
                .chain(std::iter::once(&state.rental))
                .filter(|rental| rental.user_id == Some(user_id))
                .cloned()
                .collect())
        })
        .await
    }
}
