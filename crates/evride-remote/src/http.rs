//! HTTPS implementation of [`RemoteAuthority`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use evride_core::{Clock, Rental, RentalId, RentalPackage, Station, SystemClock, UserId};
use evride_session::SessionContext;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{
    ExternalPayment, ExternalPaymentRequest, PaymentCallback, PaymentInitiation, PickupRequest,
    PreorderRequest, RemoteAuthority, RemoteError, ReturnRequest, validate_api_base,
};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Remote authority backed by the rental REST API.
#[derive(Clone)]
pub struct HttpAuthority {
    client: Client,
    base: String,
    session: Arc<SessionContext>,
    clock: Arc<dyn Clock>,
}

impl HttpAuthority {
    /// Creates a client for `api_base` with the given request timeout.
    ///
    /// # Errors
    /// Returns [`RemoteError::InvalidEndpoint`] when the base URL violates
    /// endpoint policy and [`RemoteError::Network`] when the HTTP client cannot
    /// be built.
    pub fn new(
        api_base: &str,
        timeout: Duration,
        session: Arc<SessionContext>,
    ) -> Result<Self, RemoteError> {
        let parsed = validate_api_base(api_base)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| RemoteError::Network(error.to_string()))?;

        Ok(Self {
            client,
            base: parsed.as_str().trim_end_matches('/').to_string(),
            session,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the time source used for credential expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Normalized API base without trailing slash.
    pub fn base(&self) -> &str {
        &self.base
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, RemoteError> {
        let bearer = self
            .session
            .bearer(self.clock.now_ms())
            .map_err(|_| RemoteError::Unauthorized)?;

        Ok(self
            .client
            .request(method, format!("{}{path}", self.base))
            .bearer_auth(bearer))
    }

    async fn send<T: DeserializeOwned + Send>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if status == StatusCode::UNAUTHORIZED {
            self.session.invalidate();
            tracing::warn!(operation, "remote rejected session credential");
            return Err(RemoteError::Unauthorized);
        }

        if !status.is_success() {
            let message = error_message(status.as_u16(), &body);
            tracing::warn!(operation, status = status.as_u16(), "remote call failed");
            return Err(if status.is_server_error() {
                RemoteError::Server(status.as_u16(), message)
            } else {
                RemoteError::Client(status.as_u16(), message)
            });
        }

        if body.trim().is_empty() {
            return Err(RemoteError::Decode(format!("{operation}: empty response body")));
        }

        serde_json::from_str(&body)
            .map_err(|error| RemoteError::Decode(format!("{operation}: {error}")))
    }

    async fn send_json<B: Serialize + ?Sized + Sync, T: DeserializeOwned + Send>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let request = self.request(method, path)?.json(body);
        self.send(operation, request).await
    }
}

#[async_trait]
impl RemoteAuthority for HttpAuthority {
    async fn create_preorder(&self, request: &PreorderRequest) -> Result<Rental, RemoteError> {
        self.send_json("create_preorder", Method::POST, "/rentals/preorder/day", request)
            .await
    }

    async fn confirm_payment(&self, rental_id: RentalId) -> Result<Rental, RemoteError> {
        let request = self.request(
            Method::POST,
            &format!("/rentals/confirm/day?rentalId={rental_id}"),
        )?;
        self.send("confirm_payment", request).await
    }

    async fn pickup(
        &self,
        rental_id: RentalId,
        request: &PickupRequest,
    ) -> Result<Rental, RemoteError> {
        self.send_json(
            "pickup",
            Method::POST,
            &format!("/rentals/{rental_id}/pickup-vehicle"),
            request,
        )
        .await
    }

    async fn return_vehicle(
        &self,
        rental_id: RentalId,
        request: &ReturnRequest,
    ) -> Result<Rental, RemoteError> {
        self.send_json(
            "return_vehicle",
            Method::POST,
            &format!("/rentals/{rental_id}/return-vehicle"),
            request,
        )
        .await
    }

    async fn get_rental_details(&self, rental_id: RentalId) -> Result<Rental, RemoteError> {
        let request = self.request(Method::GET, &format!("/rentals/{rental_id}"))?;
        self.send("get_rental_details", request).await
    }

    async fn create_external_payment(
        &self,
        request: &ExternalPaymentRequest,
    ) -> Result<ExternalPayment, RemoteError> {
        let initiation: PaymentInitiation = self
            .send_json(
                "create_external_payment",
                Method::POST,
                "/payments/vnpay/create",
                request,
            )
            .await?;
        initiation.into_outcome()
    }

    async fn handle_payment_callback(
        &self,
        callback: &PaymentCallback,
    ) -> Result<Rental, RemoteError> {
        self.send_json(
            "handle_payment_callback",
            Method::POST,
            "/payments/vnpay/return-callback",
            callback.params(),
        )
        .await
    }

    async fn list_stations(&self) -> Result<Vec<Station>, RemoteError> {
        let request = self.request(Method::GET, "/stations")?;
        self.send("list_stations", request).await
    }

    async fn list_packages(&self) -> Result<Vec<RentalPackage>, RemoteError> {
        let request = self.request(Method::GET, "/packages")?;
        self.send("list_packages", request).await
    }

    async fn list_user_rentals(&self, user_id: UserId) -> Result<Vec<Rental>, RemoteError> {
        let request = self.request(Method::GET, &format!("/rentals/user/{user_id}"))?;
        self.send("list_user_rentals", request).await
    }
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout
    } else if error.is_decode() {
        RemoteError::Decode(error.to_string())
    } else {
        RemoteError::Network(error.to_string())
    }
}

/// Extracts the user-facing message from an error answer.
///
/// Prefers JSON `message`, then JSON `error`, then the trimmed text body, and
/// falls back to `HTTP <status>`.
pub fn error_message(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("HTTP {status}");
    }

    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(trimmed) {
        return ["message", "error"]
            .iter()
            .filter_map(|key| fields.get(*key))
            .filter_map(serde_json::Value::as_str)
            .map(str::trim)
            .find(|text| !text.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}"));
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use evride_session::SessionContext;

    use super::*;

    #[test]
    fn json_message_wins_over_error_field() {
        assert_eq!(
            error_message(409, r#"{"message":"Vehicle already rented","error":"Conflict"}"#),
            "Vehicle already rented"
        );
        assert_eq!(error_message(400, r#"{"error":"Bad Request"}"#), "Bad Request");
    }

    #[test]
    fn text_body_and_empty_body_fallbacks() {
        assert_eq!(error_message(500, "  boom \n"), "boom");
        assert_eq!(error_message(502, ""), "HTTP 502");
        assert_eq!(error_message(404, "{}"), "HTTP 404");
    }

    #[test]
    fn base_url_is_normalized() {
        let authority = HttpAuthority::new(
            "https://api.example.test/api/",
            Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            Arc::new(SessionContext::new()),
        )
        .expect("authority should build");

        assert_eq!(authority.base(), "https://api.example.test/api");
    }

    #[test]
    fn requests_require_a_session() {
        let authority = HttpAuthority::new(
            "http://localhost:8080/api",
            Duration::from_secs(1),
            Arc::new(SessionContext::new()),
        )
        .expect("authority should build");

        assert!(matches!(
            authority.request(Method::GET, "/stations"),
            Err(RemoteError::Unauthorized)
        ));
    }
}
