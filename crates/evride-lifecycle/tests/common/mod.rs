//! Shared fixtures for lifecycle integration tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use evride_core::{
    PackageId, Rental, RentalId, RentalPackage, RentalStatus, Station, StationId, UserId, Vehicle,
    VehicleId,
};
use evride_lifecycle::{Clock, LifecycleContext, ManualClock, RentalController};
use evride_remote::ScriptedAuthority;
use evride_session::{SessionContext, SessionToken};
use rust_decimal::Decimal;

/// Fixed wall-clock instant used as "now" by default.
#[allow(dead_code)]
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
        .single()
        .expect("fixture instant should be valid")
}

/// Rental #42 for vehicle 7 (origin station 3) on a 2 hour package.
#[allow(dead_code)]
pub fn rental(status: RentalStatus) -> Rental {
    let started = matches!(status, RentalStatus::Active | RentalStatus::Completed);
    Rental {
        id: RentalId(42),
        user_id: Some(UserId(3)),
        vehicle: Vehicle {
            id: VehicleId(7),
            code: Some("EB-007".to_string()),
            name: None,
            license_plate: Some("59A-123.45".to_string()),
            battery_level: Some(88),
            status: Some("RENTED".to_string()),
            station: Some(Station {
                id: StationId(3),
                name: "Riverside".to_string(),
                address: None,
                latitude: None,
                longitude: None,
            }),
            station_id: None,
            station_name: None,
        },
        package: RentalPackage {
            id: PackageId(1),
            name: "Two hours".to_string(),
            duration_hours: 2,
            price: Decimal::new(150_000, 0),
        },
        status,
        start_time: started.then(t0),
        end_time: None,
        total_cost: Decimal::new(150_000, 0),
    }
}

/// Session holding a non-expiring credential.
#[allow(dead_code)]
pub fn signed_in() -> Arc<SessionContext> {
    Arc::new(SessionContext::with_token(SessionToken::new(
        "test-token",
        Some(UserId(3)),
    )))
}

/// Controller wired to a scripted authority, a manual clock and a live session.
#[allow(dead_code)]
pub struct Harness {
    pub remote: Arc<ScriptedAuthority>,
    pub clock: Arc<ManualClock>,
    pub session: Arc<SessionContext>,
    pub controller: RentalController,
}

/// Builds a harness whose local and server snapshots are `rental(status)`.
#[allow(dead_code)]
pub fn harness(status: RentalStatus) -> Harness {
    harness_with(ScriptedAuthority::new(rental(status), t0()), rental(status))
}

/// Builds a harness around a custom authority and local snapshot.
#[allow(dead_code)]
pub fn harness_with(remote: ScriptedAuthority, local: Rental) -> Harness {
    let remote = Arc::new(remote);
    let clock = Arc::new(ManualClock::new(t0()));
    let session = signed_in();
    let controller = RentalController::from_snapshot(local, context(&remote, &clock, &session));

    Harness {
        remote,
        clock,
        session,
        controller,
    }
}

/// Lifecycle context over the given collaborators.
#[allow(dead_code)]
pub fn context(
    remote: &Arc<ScriptedAuthority>,
    clock: &Arc<ManualClock>,
    session: &Arc<SessionContext>,
) -> LifecycleContext {
    let remote: Arc<dyn evride_remote::RemoteAuthority> = remote.clone();
    let clock: Arc<dyn Clock> = clock.clone();
    LifecycleContext::new(remote, Arc::clone(session)).with_clock(clock)
}

/// Clock following tokio's (pausable) time, anchored at [`t0`].
#[allow(dead_code)]
pub struct TokioClock {
    started: tokio::time::Instant,
}

#[allow(dead_code)]
impl TokioClock {
    pub fn new() -> Self {
        Self {
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.started.elapsed();
        t0() + chrono::Duration::milliseconds(elapsed.as_millis() as i64)
    }
}
