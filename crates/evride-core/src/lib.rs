#![warn(missing_docs)]
//! # evride-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `evride` workspace.
//!
//! ## Responsibilities
//! - Represent rentals, vehicles, stations, and rental packages as read from
//!   the remote authority.
//! - Map every status spelling the backend emits onto one canonical
//!   [`RentalStatus`] set.
//! - Derive the [`TimeWindow`] (elapsed, remaining, completion ratio) of an
//!   active rental.
//! - Provide the injectable [`Clock`] read by the controller, the ticker and
//!   the HTTP client.
//!
//! ## Data flow
//! Remote snapshots decode into [`Rental`]. The lifecycle controller caches the
//! latest snapshot and the ticker derives a [`TimeWindow`] from it on every
//! tick via [`compute_time_window`].
//!
//! ## Ownership and lifetimes
//! Snapshots own all of their strings so they can be published on channels
//! and outlive the response buffer they were decoded from.
//!
//! ## Error model
//! Decode failures and malformed identifiers return [`CoreError`].
//!
//! ## Example
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use evride_core::time_window_for;
//!
//! let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
//! let window = time_window_for(start, 2, start + Duration::hours(1));
//! assert_eq!(window.elapsed_ms, 3_600_000);
//! assert_eq!(window.remaining_ms, Some(3_600_000));
//! assert_eq!(window.percent_complete, 50.0);
//! ```

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Milliseconds in one package hour.
pub const MS_PER_HOUR: u64 = 3_600_000;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Returns the raw numeric identifier.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Server-assigned rental identifier.
    RentalId
);
numeric_id!(
    /// Server-assigned vehicle identifier (the id printed in vehicle QR codes).
    VehicleId
);
numeric_id!(
    /// Server-assigned station identifier (the id printed in station QR codes).
    StationId
);
numeric_id!(
    /// Server-assigned rental package identifier.
    PackageId
);
numeric_id!(
    /// Server-assigned customer identifier.
    UserId
);

/// Canonical rental status set.
///
/// The backend is observed to use `PENDING_PAYMENT` and `PENDING` for the same
/// unpaid preorder state, and both `CANCELLED`/`CANCELED`. Decoding folds those
/// spellings together; encoding always emits the canonical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RentalStatus {
    /// Preorder created, payment not yet confirmed.
    #[serde(rename = "PENDING", alias = "PENDING_PAYMENT")]
    Pending,
    /// Payment confirmed, vehicle not yet picked up.
    #[serde(rename = "PAID")]
    Paid,
    /// Vehicle picked up; the billed window is running.
    #[serde(rename = "ACTIVE")]
    Active,
    /// Vehicle returned.
    #[serde(rename = "COMPLETED")]
    Completed,
    /// Rental abandoned before pickup.
    #[serde(rename = "CANCELLED", alias = "CANCELED")]
    Cancelled,
}

impl RentalStatus {
    /// Canonical wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Returns `true` when `next` is a legal forward move from `self`.
    ///
    /// Forward moves follow `Pending -> Paid -> Active -> Completed`;
    /// `Cancelled` is reachable only from `Pending` or `Paid`. Staying in the
    /// same status is not a move.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid)
                | (Self::Paid, Self::Active)
                | (Self::Active, Self::Completed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Paid, Self::Cancelled)
        )
    }

    /// Returns `true` when a snapshot in this status must carry a start time.
    pub fn requires_start_time(self) -> bool {
        matches!(self, Self::Active | Self::Completed)
    }
}

impl fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
}

impl GeoPoint {
    /// Placeholder sent when the client has no position fix.
    pub const UNKNOWN: GeoPoint = GeoPoint {
        latitude: 0.0,
        longitude: 0.0,
    };
}

/// Rental station (pickup origin or return destination).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// Station id.
    #[serde(alias = "stationId")]
    pub id: StationId,
    /// Display name.
    pub name: String,
    /// Street address.
    #[serde(default, alias = "location")]
    pub address: Option<String>,
    /// Latitude in degrees.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude in degrees.
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Vehicle attached to a rental. Read-only on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    /// Vehicle id, the value encoded in its QR code.
    #[serde(alias = "vehicleId")]
    pub id: VehicleId,
    /// Fleet code painted on the vehicle.
    #[serde(default)]
    pub code: Option<String>,
    /// Optional marketing name.
    #[serde(default)]
    pub name: Option<String>,
    /// License plate.
    #[serde(default)]
    pub license_plate: Option<String>,
    /// Battery level in percent.
    #[serde(default)]
    pub battery_level: Option<u8>,
    /// Fleet status as reported by the backend (free text).
    #[serde(default)]
    pub status: Option<String>,
    /// Origin station, when embedded.
    #[serde(default)]
    pub station: Option<Station>,
    /// Origin station id, when only the reference is sent.
    #[serde(default)]
    pub station_id: Option<StationId>,
    /// Origin station name, when only the name is sent.
    #[serde(default)]
    pub station_name: Option<String>,
}

impl Vehicle {
    /// Human-facing label: name, then code, then `Vehicle <id>`.
    pub fn label(&self) -> String {
        self.name
            .as_deref()
            .or(self.code.as_deref())
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Vehicle {}", self.id))
    }

    /// Station the vehicle was picked up from, if known.
    pub fn origin_station_id(&self) -> Option<StationId> {
        self.station
            .as_ref()
            .map(|station| station.id)
            .or(self.station_id)
    }

    /// Origin station name, if known.
    pub fn origin_station_name(&self) -> Option<&str> {
        self.station
            .as_ref()
            .map(|station| station.name.as_str())
            .or(self.station_name.as_deref())
    }
}

/// Priced, time-boxed rental offer. Immutable once attached to a rental.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalPackage {
    /// Package id.
    #[serde(alias = "packageId")]
    pub id: PackageId,
    /// Display name.
    pub name: String,
    /// Included duration in hours.
    #[serde(alias = "duration")]
    pub duration_hours: u32,
    /// Package price.
    #[serde(default)]
    pub price: Decimal,
}

impl RentalPackage {
    /// Included duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        u64::from(self.duration_hours).saturating_mul(MS_PER_HOUR)
    }
}

/// One customer's time-boxed lease of a single vehicle.
///
/// Owned by the remote authority; the client only ever replaces a whole
/// snapshot with the authority's latest answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rental {
    /// Rental id.
    #[serde(alias = "rentalId")]
    pub id: RentalId,
    /// Customer the rental belongs to.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Leased vehicle.
    pub vehicle: Vehicle,
    /// Attached package.
    #[serde(rename = "rentalPackage", alias = "package")]
    pub package: RentalPackage,
    /// Lifecycle status.
    pub status: RentalStatus,
    /// Pickup instant; set once the rental is active.
    #[serde(default, with = "wire_time")]
    pub start_time: Option<DateTime<Utc>>,
    /// Return instant; set once the rental is completed.
    #[serde(default, with = "wire_time")]
    pub end_time: Option<DateTime<Utc>>,
    /// Total price fixed at preorder (possibly finalized at return).
    #[serde(default)]
    pub total_cost: Decimal,
}

impl Rental {
    /// Returns `true` when the start time presence matches the status.
    ///
    /// The backend has been seen setting a start time on `PAID` rentals; the
    /// time window ignores it, but callers may want to log the drift.
    pub fn start_time_consistent(&self) -> bool {
        self.status.requires_start_time() == self.start_time.is_some()
    }

    /// Expected end of the billed window (`start + package duration`).
    pub fn expected_end_time(&self) -> Option<DateTime<Utc>> {
        let start = self.start_time?;
        let hours = i64::from(self.package.duration_hours);
        start.checked_add_signed(Duration::hours(hours))
    }

    /// Serializes the snapshot to compact JSON bytes.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when JSON serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(CoreError::Codec)
    }

    /// Deserializes a snapshot from JSON bytes.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when JSON decoding fails.
    pub fn from_json_bytes(raw: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(raw).map_err(CoreError::Codec)
    }
}

/// Derived timing of a rental. Never stored, recomputed on every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    /// Time since pickup, clamped at zero.
    pub elapsed_ms: u64,
    /// Time left in the package; `None` until the rental is active.
    pub remaining_ms: Option<u64>,
    /// Completion ratio in `[0, 100]`.
    pub percent_complete: f64,
}

impl TimeWindow {
    /// Sentinel for rentals whose billed window has not started.
    pub const NOT_STARTED: TimeWindow = TimeWindow {
        elapsed_ms: 0,
        remaining_ms: None,
        percent_complete: 0.0,
    };

    /// Returns `true` when the window is running.
    pub fn is_started(&self) -> bool {
        self.remaining_ms.is_some()
    }

    /// Returns `true` when the package duration has been used up.
    pub fn is_exhausted(&self) -> bool {
        self.remaining_ms == Some(0)
    }
}

/// Computes the time window of `rental` at `now`.
///
/// Anything other than an `ACTIVE` rental with a start time yields
/// [`TimeWindow::NOT_STARTED`], even when the backend already stamped a start
/// time on a `PAID` rental.
pub fn compute_time_window(rental: &Rental, now: DateTime<Utc>) -> TimeWindow {
    match (rental.status, rental.start_time) {
        (RentalStatus::Active, Some(start)) => {
            time_window_for(start, rental.package.duration_hours, now)
        }
        _ => TimeWindow::NOT_STARTED,
    }
}

/// Computes a running time window from raw inputs.
///
/// # Semantics
/// - `now < start` (clock skew) clamps elapsed time to zero.
/// - A zero-hour package is complete immediately.
pub fn time_window_for(start: DateTime<Utc>, duration_hours: u32, now: DateTime<Utc>) -> TimeWindow {
    let elapsed_ms = u64::try_from((now - start).num_milliseconds()).unwrap_or(0);
    let duration_ms = u64::from(duration_hours).saturating_mul(MS_PER_HOUR);
    let remaining_ms = duration_ms.saturating_sub(elapsed_ms);

    let percent_complete = if duration_ms == 0 {
        100.0
    } else {
        (elapsed_ms as f64 / duration_ms as f64 * 100.0).min(100.0)
    };

    TimeWindow {
        elapsed_ms,
        remaining_ms: Some(remaining_ms),
        percent_complete,
    }
}

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current instant as epoch milliseconds (0 before the epoch).
    fn now_ms(&self) -> u64 {
        u64::try_from(self.now().timestamp_millis()).unwrap_or(0)
    }
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock fixed at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jumps to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    /// Moves forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Error type for core model decoding and validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON encoding/decoding error.
    #[error("snapshot codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Timestamp codec tolerant of the backend's offset-less local timestamps.
mod wire_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(instant) => serializer.serialize_str(&instant.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Some(instant.with_timezone(&Utc)));
        }

        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(naive.and_utc()))
            .map_err(|error| D::Error::custom(format!("invalid timestamp '{raw}': {error}")))
    }
}
