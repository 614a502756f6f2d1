//! Shared fixtures for app integration tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use evride_core::{
    PackageId, Rental, RentalId, RentalPackage, RentalStatus, Station, StationId, UserId, Vehicle,
    VehicleId,
};
use evride_lifecycle::{Clock, LifecycleContext, ManualClock, RentalController};
use evride_remote::{RemoteAuthority, ScriptedAuthority};
use evride_session::{SessionContext, SessionToken};
use rust_decimal::Decimal;

/// Fixed "now" for app fixtures.
#[allow(dead_code)]
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
        .single()
        .expect("fixture instant should be valid")
}

/// Rental #42 for vehicle 7 (`EB-007`) on a 2 hour package.
#[allow(dead_code)]
pub fn rental(status: RentalStatus) -> Rental {
    Rental {
        id: RentalId(42),
        user_id: Some(UserId(3)),
        vehicle: Vehicle {
            id: VehicleId(7),
            code: Some("EB-007".to_string()),
            name: None,
            license_plate: None,
            battery_level: None,
            status: None,
            station: None,
            station_id: Some(StationId(3)),
            station_name: Some("Riverside".to_string()),
        },
        package: RentalPackage {
            id: PackageId(1),
            name: "Two hours".to_string(),
            duration_hours: 2,
            price: Decimal::new(150_000, 0),
        },
        status,
        start_time: matches!(status, RentalStatus::Active | RentalStatus::Completed).then(t0),
        end_time: None,
        total_cost: Decimal::new(150_000, 0),
    }
}

/// Stations known to the authority.
#[allow(dead_code)]
pub fn stations() -> Vec<Station> {
    vec![Station {
        id: StationId(5),
        name: "Harbor Square".to_string(),
        address: None,
        latitude: None,
        longitude: None,
    }]
}

/// Shared handles of a controller under test.
#[allow(dead_code)]
pub type Fixture = (Arc<ScriptedAuthority>, Arc<ManualClock>, RentalController);

/// Controller over a scripted authority whose rental starts in `status`.
#[allow(dead_code)]
pub fn controller(status: RentalStatus) -> Fixture {
    controller_with(ScriptedAuthority::new(rental(status), t0()), status)
}

/// Controller over `remote`, showing `rental(status)` locally.
#[allow(dead_code)]
pub fn controller_with(remote: ScriptedAuthority, status: RentalStatus) -> Fixture {
    let remote = Arc::new(remote);
    let clock = Arc::new(ManualClock::new(t0()));
    let session = Arc::new(SessionContext::with_token(SessionToken::new(
        "test-token",
        Some(UserId(3)),
    )));

    let authority: Arc<dyn RemoteAuthority> = remote.clone();
    let time: Arc<dyn Clock> = clock.clone();
    let context = LifecycleContext::new(authority, session).with_clock(time);
    let controller = RentalController::from_snapshot(rental(status), context);
    (remote, clock, controller)
}
