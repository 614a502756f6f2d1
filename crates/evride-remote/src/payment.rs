//! Payment gateway callback parsing.
//!
//! The gateway redirects the customer back with a query string. The client
//! only reads it to tell the customer what happened and forwards the full
//! parameter set to the backend, which verifies the signature.

use std::collections::BTreeMap;
use std::fmt;

use evride_core::RentalId;
use rust_decimal::Decimal;

const RESPONSE_CODE: &str = "vnp_ResponseCode";
const TXN_REF: &str = "vnp_TxnRef";
const AMOUNT: &str = "vnp_Amount";
const SECURE_HASH: &str = "vnp_SecureHash";
const RENTAL_ID: &str = "rentalId";
const PLAIN_AMOUNT: &str = "amount";

/// Gateway response code for an approved payment.
pub const APPROVED_CODE: &str = "00";

/// Why the gateway declined a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclineReason {
    /// `07`: flagged as suspected fraud.
    SuspectedFraud,
    /// `09`: rejected by the card issuer.
    CardRejected,
    /// `10`: card authentication failed.
    AuthenticationFailed,
    /// `11`: transaction was already processed.
    AlreadyProcessed,
    /// `12`: transaction data was invalid.
    InvalidTransaction,
    /// `24`: the customer cancelled at the gateway.
    CancelledByCustomer,
    /// `51`: insufficient funds.
    InsufficientFunds,
    /// `65`: daily limit exceeded.
    DailyLimitExceeded,
    /// `75`: the bank is under maintenance.
    BankMaintenance,
    /// Any other code.
    Other(String),
}

impl DeclineReason {
    /// Maps a gateway response code to a reason.
    pub fn from_code(code: &str) -> Self {
        match code {
            "07" => Self::SuspectedFraud,
            "09" => Self::CardRejected,
            "10" => Self::AuthenticationFailed,
            "11" => Self::AlreadyProcessed,
            "12" => Self::InvalidTransaction,
            "24" => Self::CancelledByCustomer,
            "51" => Self::InsufficientFunds,
            "65" => Self::DailyLimitExceeded,
            "75" => Self::BankMaintenance,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns `true` when trying again later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CancelledByCustomer | Self::InsufficientFunds | Self::BankMaintenance
        )
    }
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SuspectedFraud => f.write_str("transaction flagged as suspected fraud; contact your bank"),
            Self::CardRejected => f.write_str("transaction rejected; check your card details"),
            Self::AuthenticationFailed => f.write_str("card authentication failed"),
            Self::AlreadyProcessed => f.write_str("transaction was already processed"),
            Self::InvalidTransaction => f.write_str("transaction data was invalid"),
            Self::CancelledByCustomer => f.write_str("payment was cancelled"),
            Self::InsufficientFunds => f.write_str("insufficient funds"),
            Self::DailyLimitExceeded => f.write_str("daily transaction limit exceeded"),
            Self::BankMaintenance => f.write_str("bank is under maintenance; try again later"),
            Self::Other(code) => write!(f, "payment failed (code {code})"),
        }
    }
}

/// Outcome reported by the gateway in the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// Response code `00`.
    Approved,
    /// Any other response code.
    Declined(DeclineReason),
    /// No response code in the callback.
    Missing,
}

/// Parsed gateway callback.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentCallback {
    params: BTreeMap<String, String>,
}

impl PaymentCallback {
    /// Parses a callback query string.
    ///
    /// Accepts a bare query (`a=1&b=2`), one with a leading `?`, or a full
    /// URL, in which case only its query part is read.
    pub fn from_query(raw: &str) -> Self {
        let raw = raw.trim();
        let query = match raw.split_once('?') {
            Some((_, query)) => query,
            None => raw,
        };
        let query = query.split('#').next().unwrap_or_default();

        let params = url::form_urlencoded::parse(query.as_bytes())
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        Self { params }
    }

    /// Builds a callback from already-split parameters.
    pub fn from_params(params: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            params: params.into_iter().collect(),
        }
    }

    /// Every parameter, forwarded verbatim to the backend.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Rental the callback refers to.
    pub fn rental_id(&self) -> Option<RentalId> {
        self.param(RENTAL_ID)?.parse::<u64>().ok().map(RentalId)
    }

    /// Gateway response code.
    pub fn response_code(&self) -> Option<&str> {
        self.param(RESPONSE_CODE)
    }

    /// Gateway transaction reference.
    pub fn txn_ref(&self) -> Option<&str> {
        self.param(TXN_REF)
    }

    /// Gateway signature; verified by the backend only.
    pub fn secure_hash(&self) -> Option<&str> {
        self.param(SECURE_HASH)
    }

    /// Charged amount in currency units.
    ///
    /// The gateway reports minor units (x100); a plain `amount` parameter is
    /// already in currency units.
    pub fn amount(&self) -> Option<Decimal> {
        if let Some(raw) = self.param(AMOUNT) {
            let minor = raw.parse::<Decimal>().ok()?;
            return Some(minor / Decimal::ONE_HUNDRED);
        }
        self.param(PLAIN_AMOUNT)?.parse::<Decimal>().ok()
    }

    /// Outcome derived from the response code.
    pub fn outcome(&self) -> GatewayOutcome {
        match self.response_code() {
            None => GatewayOutcome::Missing,
            Some(APPROVED_CODE) => GatewayOutcome::Approved,
            Some(code) => GatewayOutcome::Declined(DeclineReason::from_code(code)),
        }
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}
