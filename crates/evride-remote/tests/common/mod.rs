//! Shared fixtures for remote integration tests.

use evride_core::{
    PackageId, Rental, RentalId, RentalPackage, RentalStatus, Vehicle, VehicleId,
};
use rust_decimal::Decimal;

/// Creates a pending rental #42 for vehicle 7 with a 2 hour package.
#[allow(dead_code)]
pub fn pending_rental() -> Rental {
    Rental {
        id: RentalId(42),
        user_id: None,
        vehicle: Vehicle {
            id: VehicleId(7),
            code: Some("EB-007".to_string()),
            name: None,
            license_plate: None,
            battery_level: Some(90),
            status: None,
            station: None,
            station_id: None,
            station_name: None,
        },
        package: RentalPackage {
            id: PackageId(1),
            name: "Two hours".to_string(),
            duration_hours: 2,
            price: Decimal::new(150_000, 0),
        },
        status: RentalStatus::Pending,
        start_time: None,
        end_time: None,
        total_cost: Decimal::new(150_000, 0),
    }
}

/// Rental #42 as the authority sends it once active.
#[allow(dead_code)]
pub const ACTIVE_SNAPSHOT: &str = r#"{
    "id": 42,
    "userId": 3,
    "vehicle": { "id": 7, "code": "EB-007", "station": { "id": 3, "name": "Riverside" } },
    "rentalPackage": { "id": 1, "name": "Two hours", "durationHours": 2, "price": 150000 },
    "status": "ACTIVE",
    "startTime": "2025-03-01T09:00:00Z",
    "totalCost": 150000
}"#;

/// Session for customer 3 holding a non-expiring credential.
#[allow(dead_code)]
pub fn signed_in() -> std::sync::Arc<evride_session::SessionContext> {
    std::sync::Arc::new(evride_session::SessionContext::with_token(
        evride_session::SessionToken::new("test-token", Some(evride_core::UserId(3))),
    ))
}
