#![warn(missing_docs)]
//! # evride-qr
//!
//! ## Purpose
//! Turns scanned QR text into a typed identity reference and checks it against
//! the rental it is supposed to unlock.
//!
//! ## Responsibilities
//! - Decode `VEHICLE_<id>` / `STATION_<id>` tokens and structured intent
//!   payloads into a closed [`QrReference`] variant.
//! - Verify a decoded reference for pickup ([`verify_pickup`]) and return
//!   ([`verify_return`]).
//!
//! ## Data flow
//! Scanner text -> [`scan`] -> [`ScannedCode`] -> verifier verdict consumed by
//! the lifecycle controller. Nothing downstream inspects the raw text again; it
//! is only forwarded opaquely to the remote authority.
//!
//! ## Error model
//! Decoding never fails: unknown formats become [`QrReference::Unrecognized`]
//! and the caller decides whether to re-prompt. Verification returns verdict
//! enums that always carry both identifiers on mismatch.
//!
//! ## Security and privacy notes
//! The pickup verdict is the only check that stops a customer from being billed
//! for, or unlocking, the wrong physical vehicle. It never degrades to a bare
//! boolean.
//!
//! ## Example
//! ```rust
//! use evride_core::{StationId, VehicleId};
//! use evride_qr::{QrReference, decode};
//!
//! assert_eq!(decode("VEHICLE_7"), QrReference::Vehicle(VehicleId(7)));
//! assert_eq!(
//!     decode(r#"{"intent":"vehicle_return","stationId":5}"#),
//!     QrReference::Station(StationId(5))
//! );
//! assert_eq!(decode("hello"), QrReference::Unrecognized);
//! ```

use std::fmt;

use evride_core::{Rental, StationId, VehicleId};
use serde::Deserialize;

/// Token prefix printed on vehicle codes.
pub const VEHICLE_PREFIX: &str = "VEHICLE_";
/// Token prefix printed on station codes.
pub const STATION_PREFIX: &str = "STATION_";
/// Structured-payload intent for vehicle codes.
pub const INTENT_PICKUP: &str = "vehicle_pickup";
/// Structured-payload intent for station codes.
pub const INTENT_RETURN: &str = "vehicle_return";

/// Decoded meaning of a scanned code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QrReference {
    /// Code attached to a vehicle.
    Vehicle(VehicleId),
    /// Code posted at a station.
    Station(StationId),
    /// Anything else.
    Unrecognized,
}

impl QrReference {
    /// Kind of code, without the identifier.
    pub fn kind(&self) -> CodeKind {
        match self {
            Self::Vehicle(_) => CodeKind::Vehicle,
            Self::Station(_) => CodeKind::Station,
            Self::Unrecognized => CodeKind::Unrecognized,
        }
    }
}

/// Coarse classification of a scanned code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeKind {
    /// Vehicle code.
    Vehicle,
    /// Station code.
    Station,
    /// Undecodable code.
    Unrecognized,
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vehicle => "vehicle code",
            Self::Station => "station code",
            Self::Unrecognized => "unrecognized code",
        })
    }
}

/// Raw scanner output paired with its decoded reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedCode {
    raw: String,
    reference: QrReference,
}

impl ScannedCode {
    /// Opaque payload forwarded to the remote authority.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Decoded reference.
    pub fn reference(&self) -> QrReference {
        self.reference
    }
}

/// Decodes `raw` once and keeps the payload for forwarding.
pub fn scan(raw: impl Into<String>) -> ScannedCode {
    let raw = raw.into();
    let reference = decode(&raw);
    ScannedCode { raw, reference }
}

/// Decodes scanned text into a [`QrReference`].
///
/// # Semantics
/// - Surrounding whitespace is ignored; token prefixes match ASCII
///   case-insensitively.
/// - Identifiers must be non-zero, all-digit, and fit in `u64`.
/// - A leading `{` switches to the structured intent payload.
pub fn decode(raw: &str) -> QrReference {
    let text = raw.trim();
    if text.starts_with('{') {
        return decode_structured(text);
    }

    if let Some(id) = strip_prefix_ignore_case(text, VEHICLE_PREFIX).and_then(parse_id) {
        return QrReference::Vehicle(VehicleId(id));
    }
    if let Some(id) = strip_prefix_ignore_case(text, STATION_PREFIX).and_then(parse_id) {
        return QrReference::Station(StationId(id));
    }

    QrReference::Unrecognized
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentPayload {
    #[serde(alias = "type", alias = "action")]
    intent: String,
    #[serde(default)]
    vehicle_id: Option<IdField>,
    #[serde(default)]
    station_id: Option<IdField>,
    #[serde(default)]
    id: Option<IdField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdField {
    Number(u64),
    Text(String),
}

impl IdField {
    fn value(&self) -> Option<u64> {
        match self {
            Self::Number(0) => None,
            Self::Number(value) => Some(*value),
            Self::Text(text) => parse_id(text.trim()),
        }
    }
}

fn decode_structured(text: &str) -> QrReference {
    let Ok(payload) = serde_json::from_str::<IntentPayload>(text) else {
        return QrReference::Unrecognized;
    };

    let intent = payload.intent.trim().to_ascii_lowercase();
    let fallback = payload.id.as_ref().and_then(IdField::value);
    match intent.as_str() {
        INTENT_PICKUP => payload
            .vehicle_id
            .as_ref()
            .and_then(IdField::value)
            .or(fallback)
            .map_or(QrReference::Unrecognized, |id| {
                QrReference::Vehicle(VehicleId(id))
            }),
        INTENT_RETURN => payload
            .station_id
            .as_ref()
            .and_then(IdField::value)
            .or(fallback)
            .map_or(QrReference::Unrecognized, |id| {
                QrReference::Station(StationId(id))
            }),
        _ => QrReference::Unrecognized,
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

fn parse_id(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok().filter(|id| *id != 0)
}

/// Outcome of checking a scan against the rental's vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickupVerdict {
    /// The scan names the rental's vehicle.
    Match(VehicleId),
    /// The scan names a different vehicle.
    Mismatch {
        /// Vehicle the rental was booked for.
        expected: VehicleId,
        /// Vehicle that was scanned.
        got: VehicleId,
    },
    /// The scan is not a vehicle code at all.
    NotAVehicleCode(CodeKind),
}

/// Outcome of checking a scan for a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnVerdict {
    /// Destination station taken from the scan.
    Station(StationId),
    /// The scan is not a station code.
    NotAStationCode(CodeKind),
}

/// Checks a decoded reference against the vehicle booked on `rental`.
pub fn verify_pickup(reference: &QrReference, rental: &Rental) -> PickupVerdict {
    let expected = rental.vehicle.id;
    match *reference {
        QrReference::Vehicle(got) if got == expected => PickupVerdict::Match(got),
        QrReference::Vehicle(got) => PickupVerdict::Mismatch { expected, got },
        other => PickupVerdict::NotAVehicleCode(other.kind()),
    }
}

/// Extracts the return destination from a decoded reference.
///
/// The destination may differ from the vehicle's origin station.
pub fn verify_return(reference: &QrReference) -> ReturnVerdict {
    match *reference {
        QrReference::Station(station) => ReturnVerdict::Station(station),
        other => ReturnVerdict::NotAStationCode(other.kind()),
    }
}
