//! Environment-driven configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use evride_core::UserId;
use evride_lifecycle::DEFAULT_TICK_INTERVAL_MS;
use evride_remote::{DEFAULT_REQUEST_TIMEOUT_MS, validate_api_base};
use evride_session::{SessionContext, SessionToken};
use tracing::Level;

use crate::AppError;

const API_BASE_URL: &str = "EVRIDE_API_BASE_URL";
const REQUEST_TIMEOUT_MS: &str = "EVRIDE_REQUEST_TIMEOUT_MS";
const TICK_INTERVAL_MS: &str = "EVRIDE_TICK_INTERVAL_MS";
const LOG_LEVEL: &str = "EVRIDE_LOG_LEVEL";
const ACCESS_TOKEN: &str = "EVRIDE_ACCESS_TOKEN";
const USER_ID: &str = "EVRIDE_USER_ID";

/// Runtime configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Validated API base URL.
    pub api_base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Time window recomputation cadence.
    pub tick_interval: Duration,
    /// Maximum log level.
    pub log_level: Level,
    /// Bearer credential for the session, if provided.
    pub access_token: Option<String>,
    /// Signed-in customer, if provided.
    pub user_id: Option<UserId>,
}

impl AppConfig {
    /// Loads `.env` when present, then reads the process environment.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for a missing base URL or an invalid value.
    pub fn from_env() -> Result<Self, AppError> {
        if let Err(error) = dotenvy::dotenv()
            && !error.not_found()
        {
            return Err(AppError::Config(format!(".env: {error}")));
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Blank values count as unset.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for a missing base URL or an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_base_url = read(API_BASE_URL)
            .ok_or_else(|| AppError::Config(format!("{API_BASE_URL} must be set")))?;
        validate_api_base(&api_base_url)
            .map_err(|error| AppError::Config(format!("{API_BASE_URL}: {error}")))?;

        let request_timeout = millis(
            read(REQUEST_TIMEOUT_MS),
            REQUEST_TIMEOUT_MS,
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?;
        let tick_interval = millis(
            read(TICK_INTERVAL_MS),
            TICK_INTERVAL_MS,
            DEFAULT_TICK_INTERVAL_MS,
        )?;

        let log_level = match read(LOG_LEVEL) {
            Some(raw) => Level::from_str(&raw)
                .map_err(|_| AppError::Config(format!("{LOG_LEVEL}: unknown level `{raw}`")))?,
            None => Level::INFO,
        };

        let user_id = read(USER_ID)
            .map(|raw| {
                raw.parse::<u64>()
                    .map(UserId)
                    .map_err(|_| AppError::Config(format!("{USER_ID}: `{raw}` is not a user id")))
            })
            .transpose()?;

        Ok(Self {
            api_base_url,
            request_timeout,
            tick_interval,
            log_level,
            access_token: read(ACCESS_TOKEN),
            user_id,
        })
    }

    /// Session seeded with the configured credential, or signed out.
    pub fn session(&self) -> SessionContext {
        match &self.access_token {
            Some(token) => {
                SessionContext::with_token(SessionToken::new(token.clone(), self.user_id))
            }
            None => SessionContext::new(),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout", &self.request_timeout)
            .field("tick_interval", &self.tick_interval)
            .field("log_level", &self.log_level)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("user_id", &self.user_id)
            .finish()
    }
}

fn millis(raw: Option<String>, key: &str, default: u64) -> Result<Duration, AppError> {
    let Some(raw) = raw else {
        return Ok(Duration::from_millis(default));
    };
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(Duration::from_millis(value)),
        _ => Err(AppError::Config(format!(
            "{key}: expected a positive number of milliseconds, got `{raw}`"
        ))),
    }
}
