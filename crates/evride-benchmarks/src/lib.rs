#![warn(missing_docs)]
//! # evride-benchmarks
//!
//! Deterministic inputs for the latency smoke tests under `tests/`.

/// Rental snapshot as the authority sends it for an active two hour rental.
pub const ACTIVE_SNAPSHOT: &[u8] = br#"{
    "id": 42,
    "userId": 3,
    "vehicle": {
        "id": 7,
        "code": "EB-007",
        "batteryLevel": 88,
        "station": { "id": 3, "name": "Riverside" }
    },
    "rentalPackage": { "id": 1, "name": "Two hours", "durationHours": 2, "price": 150000 },
    "status": "ACTIVE",
    "startTime": "2025-03-01T09:00:00Z",
    "totalCost": 150000
}"#;

/// Scanned payloads cycled through by the codec smoke test.
pub const SCANNED_PAYLOADS: [&str; 6] = [
    "VEHICLE_7",
    "STATION_5",
    " vehicle_12 ",
    r#"{"intent":"vehicle_pickup","vehicleId":7}"#,
    "STATION_",
    "hello",
];
