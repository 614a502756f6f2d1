#![warn(missing_docs)]
//! # evride-remote
//!
//! ## Purpose
//! Client side of the remote authority: the system of record for rentals,
//! vehicles, stations and payments.
//!
//! ## Responsibilities
//! - Define the [`RemoteAuthority`] seam the lifecycle controller talks to.
//! - Provide request bodies for the side-effecting calls.
//! - Classify failures ([`classify_remote_error`]) for recovery hints.
//! - Validate the API base URL policy ([`validate_api_base`]).
//! - Parse payment gateway callbacks ([`PaymentCallback`]).
//! - Implement the authority over HTTPS ([`HttpAuthority`]) and in memory
//!   ([`ScriptedAuthority`]) for tests and offline runs.
//!
//! ## Data flow
//! Controller transition -> [`RemoteAuthority`] call -> JSON request with the
//! session's bearer credential -> rental snapshot or [`RemoteError`].
//!
//! ## Ownership and lifetimes
//! Request bodies are borrowed for the duration of a call; snapshots are
//! returned owned so the controller can replace its cache wholesale.
//!
//! ## Error model
//! [`RemoteError`] keeps the server's message verbatim. Classification is a
//! hint for the view, never a reason to retry automatically.
//!
//! ## Security and privacy notes
//! Bearer credentials are read from the session per request and never logged.
//! A 401 answer invalidates the session.
//!
//! ## Example
//! ```rust
//! use evride_remote::{FailureClass, RemoteError, classify_remote_error};
//!
//! let class = classify_remote_error(&RemoteError::Server(503, "busy".to_string()));
//! assert_eq!(class, FailureClass::Transient);
//! ```

mod http;
mod payment;
mod scripted;

use async_trait::async_trait;
use evride_core::{
    GeoPoint, PackageId, Rental, RentalId, RentalPackage, Station, StationId, UserId, VehicleId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub use http::{DEFAULT_REQUEST_TIMEOUT_MS, HttpAuthority, error_message};
pub use payment::{APPROVED_CODE, DeclineReason, GatewayOutcome, PaymentCallback};
pub use scripted::{RemoteCall, ScriptedAuthority};

/// Body of `POST /rentals/preorder/day`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreorderRequest {
    /// Customer placing the order.
    pub user_id: UserId,
    /// Vehicle to reserve.
    pub vehicle_id: VehicleId,
    /// Package to attach.
    pub package_id: PackageId,
}

/// Body of `POST /rentals/{id}/pickup-vehicle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupRequest {
    /// Vehicle the scanned code resolved to.
    pub vehicle_id: VehicleId,
    /// Raw scanned payload, forwarded untouched.
    pub qr_code: String,
    /// Customer position, or [`GeoPoint::UNKNOWN`].
    #[serde(flatten)]
    pub location: GeoPoint,
}

/// Body of `POST /rentals/{id}/return-vehicle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    /// Destination station from the scanned code.
    pub station_id: StationId,
    /// Raw scanned payload, forwarded untouched.
    pub qr_code: String,
    /// Customer position, or [`GeoPoint::UNKNOWN`].
    #[serde(flatten)]
    pub location: GeoPoint,
}

/// Body of `POST /payments/vnpay/create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalPaymentRequest {
    /// Rental being paid.
    pub rental_id: RentalId,
    /// Amount to charge, sent as a JSON number.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Free-text order description shown by the gateway.
    pub order_info: String,
}

/// Gateway answer to a payment creation request, as sent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiation {
    /// Backend's success flag.
    #[serde(default)]
    pub success: bool,
    /// Redirect target (primary spelling).
    #[serde(default)]
    pub payment_url: Option<String>,
    /// Redirect target (alternate spelling).
    #[serde(default)]
    pub url: Option<String>,
    /// Redirect target (alternate spelling).
    #[serde(default)]
    pub redirect_url: Option<String>,
    /// Failure explanation.
    #[serde(default)]
    pub message: Option<String>,
    /// Snapshot when the payment settled synchronously.
    #[serde(default)]
    pub rental: Option<Rental>,
}

impl PaymentInitiation {
    /// Resolves the wire answer into an [`ExternalPayment`].
    ///
    /// # Errors
    /// Returns [`RemoteError::Gateway`] when the backend refused the payment
    /// and [`RemoteError::Decode`] for an unparsable redirect URL.
    pub fn into_outcome(self) -> Result<ExternalPayment, RemoteError> {
        if let Some(rental) = self.rental {
            return Ok(ExternalPayment::Settled(Box::new(rental)));
        }

        let redirect = self
            .payment_url
            .or(self.url)
            .or(self.redirect_url)
            .filter(|value| !value.trim().is_empty());

        match redirect {
            Some(raw) if self.success => Url::parse(raw.trim())
                .map(ExternalPayment::Redirect)
                .map_err(|error| RemoteError::Decode(format!("invalid payment url: {error}"))),
            _ => Err(RemoteError::Gateway(self.message.unwrap_or_else(|| {
                "payment gateway did not return a payment url".to_string()
            }))),
        }
    }
}

/// Result of starting an external payment.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalPayment {
    /// Customer must continue at the gateway.
    Redirect(Url),
    /// Payment settled synchronously; snapshot attached.
    Settled(Box<Rental>),
}

/// Operations the client consumes from the system of record.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Creates a rental in `PENDING` with its total cost fixed.
    async fn create_preorder(&self, request: &PreorderRequest) -> Result<Rental, RemoteError>;

    /// Confirms payment for a pending rental.
    async fn confirm_payment(&self, rental_id: RentalId) -> Result<Rental, RemoteError>;

    /// Registers vehicle pickup; the answer carries the start time.
    async fn pickup(
        &self,
        rental_id: RentalId,
        request: &PickupRequest,
    ) -> Result<Rental, RemoteError>;

    /// Registers vehicle return at the scanned station.
    async fn return_vehicle(
        &self,
        rental_id: RentalId,
        request: &ReturnRequest,
    ) -> Result<Rental, RemoteError>;

    /// Fetches the full rental snapshot.
    async fn get_rental_details(&self, rental_id: RentalId) -> Result<Rental, RemoteError>;

    /// Starts a payment at the external gateway.
    async fn create_external_payment(
        &self,
        request: &ExternalPaymentRequest,
    ) -> Result<ExternalPayment, RemoteError>;

    /// Forwards the gateway's callback parameters and returns the updated rental.
    async fn handle_payment_callback(
        &self,
        callback: &PaymentCallback,
    ) -> Result<Rental, RemoteError>;

    /// Lists stations (return destinations).
    async fn list_stations(&self) -> Result<Vec<Station>, RemoteError>;

    /// Lists rental packages.
    async fn list_packages(&self) -> Result<Vec<RentalPackage>, RemoteError>;

    /// Lists every rental placed by `user_id`, ongoing and past.
    async fn list_user_rentals(&self, user_id: UserId) -> Result<Vec<Rental>, RemoteError>;
}

/// High-level failure class used for recovery hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth a manual retry (network, timeout, 5xx).
    Transient,
    /// Retrying the same request will fail again.
    Permanent,
    /// The credential was rejected; sign in again.
    SessionExpired,
}

/// Maps a remote error to its failure class.
pub fn classify_remote_error(error: &RemoteError) -> FailureClass {
    match error {
        RemoteError::Unauthorized => FailureClass::SessionExpired,
        RemoteError::Timeout | RemoteError::Network(_) | RemoteError::Server(_, _) => {
            FailureClass::Transient
        }
        RemoteError::Client(408 | 429, _) => FailureClass::Transient,
        RemoteError::Client(_, _)
        | RemoteError::Decode(_)
        | RemoteError::Gateway(_)
        | RemoteError::InvalidEndpoint(_) => FailureClass::Permanent,
    }
}

/// Validates the API base URL.
///
/// `https` is required; `http` is accepted only for loopback hosts.
///
/// # Errors
/// Returns [`RemoteError::InvalidEndpoint`] for unparsable URLs, other
/// schemes, or plain `http` to a non-loopback host.
pub fn validate_api_base(raw: &str) -> Result<Url, RemoteError> {
    let parsed = Url::parse(raw.trim())
        .map_err(|error| RemoteError::InvalidEndpoint(format!("invalid api url: {error}")))?;

    match parsed.scheme() {
        "https" => Ok(parsed),
        "http" if is_loopback(&parsed) => Ok(parsed),
        "http" => Err(RemoteError::InvalidEndpoint(
            "api endpoint must use https".to_string(),
        )),
        other => Err(RemoteError::InvalidEndpoint(format!(
            "unsupported scheme {other}"
        ))),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(address)) => address.is_loopback(),
        Some(url::Host::Ipv6(address)) => address.is_loopback(),
        None => false,
    }
}

/// Remote call failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The server rejected the credential (401).
    #[error("session expired or rejected; sign in again")]
    Unauthorized,
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,
    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),
    /// 5xx answer with the server's message.
    #[error("{1}")]
    Server(u16, String),
    /// Non-401 4xx answer with the server's message.
    #[error("{1}")]
    Client(u16, String),
    /// Answer body did not match the expected shape.
    #[error("unexpected response from server: {0}")]
    Decode(String),
    /// Payment gateway refused to start a payment.
    #[error("{0}")]
    Gateway(String),
    /// Base URL violates endpoint policy.
    #[error("invalid api endpoint: {0}")]
    InvalidEndpoint(String),
}
