//! Shared fixtures for view integration tests.

use chrono::{DateTime, TimeZone, Utc};
use evride_core::{
    PackageId, Rental, RentalId, RentalPackage, RentalStatus, Station, StationId, Vehicle,
    VehicleId,
};
use rust_decimal::Decimal;

/// Start instant of active fixtures.
#[allow(dead_code)]
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
        .single()
        .expect("fixture instant should be valid")
}

/// Rental #42 for vehicle 7 on a 2 hour package.
#[allow(dead_code)]
pub fn rental(status: RentalStatus) -> Rental {
    Rental {
        id: RentalId(42),
        user_id: None,
        vehicle: Vehicle {
            id: VehicleId(7),
            code: Some("EB-007".to_string()),
            name: None,
            license_plate: None,
            battery_level: Some(88),
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

/// Station list served by the authority.
#[allow(dead_code)]
pub fn stations() -> Vec<Station> {
    vec![
        Station {
            id: StationId(3),
            name: "Riverside".to_string(),
            address: None,
            latitude: None,
            longitude: None,
        },
        Station {
            id: StationId(5),
            name: "Harbor Square".to_string(),
            address: Some("1 Harbor Rd".to_string()),
            latitude: Some(10.77),
            longitude: Some(106.70),
        },
    ]
}
