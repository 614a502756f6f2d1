#![warn(missing_docs)]
//! # evride-session
//!
//! ## Purpose
//! Holds the customer's session (bearer credential and user id) as an explicit
//! context object instead of ambient global state.
//!
//! ## Responsibilities
//! - Hold the bearer credential as a [`SessionToken`] with an optional
//!   absolute expiry.
//! - Model legal session transitions ([`SessionState`]).
//! - Hand out the bearer credential for remote calls and invalidate it when the
//!   authority rejects it.
//!
//! ## Data flow
//! Session start -> [`SessionContext::refresh`] installs a token -> the remote
//! client reads [`SessionContext::bearer`] per request -> a 401-class answer
//! calls [`SessionContext::invalidate`] -> controllers refuse further remote
//! work until the session is refreshed.
//!
//! ## Ownership and lifetimes
//! The context is shared behind `Arc` by the controller and the remote client;
//! token values are owned `String`s cloned out per request.
//!
//! ## Error model
//! [`SessionError`] tells the caller whether to sign in for the first time or
//! again after expiry/invalidation.
//!
//! ## Security and privacy notes
//! This crate never logs token values; `Debug` for [`SessionToken`] redacts the
//! access token.
//!
//! ## Example
//! ```rust
//! use evride_session::{SessionContext, SessionState};
//!
//! let session = SessionContext::new();
//! assert!(matches!(session.state(), SessionState::Unauthenticated));
//! ```

use std::fmt;
use std::sync::RwLock;

use evride_core::UserId;
use thiserror::Error;

/// Bearer credential with optional absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// Bearer token used by downstream APIs.
    pub access_token: String,
    /// Customer the token was issued to.
    pub user_id: Option<UserId>,
    /// Absolute epoch milliseconds when the token expires.
    pub expires_at_ms: Option<u64>,
}

impl SessionToken {
    /// Creates a token without expiry.
    pub fn new(access_token: impl Into<String>, user_id: Option<UserId>) -> Self {
        Self {
            access_token: access_token.into(),
            user_id,
            expires_at_ms: None,
        }
    }

    /// Returns `true` when the token has expired at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms
            .is_some_and(|expires_at_ms| now_ms >= expires_at_ms)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("access_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No session was ever started.
    Unauthenticated,
    /// A usable credential is installed.
    Authenticated(SessionToken),
    /// The credential expired or was rejected; sign in again.
    ReauthRequired,
}

/// Explicit session context shared by controllers and the remote client.
#[derive(Debug)]
pub struct SessionContext {
    state: RwLock<SessionState>,
}

impl SessionContext {
    /// Creates an unauthenticated context.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::Unauthenticated),
        }
    }

    /// Creates a context that starts authenticated with `token`.
    pub fn with_token(token: SessionToken) -> Self {
        Self {
            state: RwLock::new(SessionState::Authenticated(token)),
        }
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.read().clone()
    }

    /// Installs a fresh credential (session start or token refresh).
    pub fn refresh(&self, token: SessionToken) {
        *self.write() = SessionState::Authenticated(token);
        tracing::info!("session credential refreshed");
    }

    /// Drops the credential after the authority rejected it.
    pub fn invalidate(&self) {
        let mut state = self.write();
        if matches!(*state, SessionState::Authenticated(_)) {
            *state = SessionState::ReauthRequired;
            tracing::warn!("session invalidated; sign-in required");
        }
    }

    /// Customer id of the current session, if any.
    pub fn user_id(&self) -> Option<UserId> {
        match &*self.read() {
            SessionState::Authenticated(token) => token.user_id,
            _ => None,
        }
    }

    /// Returns `true` when a non-expired credential is installed.
    pub fn is_usable(&self, now_ms: u64) -> bool {
        matches!(
            &*self.read(),
            SessionState::Authenticated(token) if !token.is_expired(now_ms)
        )
    }

    /// Returns the bearer credential for a request issued at `now_ms`.
    ///
    /// An expired credential moves the context to
    /// [`SessionState::ReauthRequired`].
    ///
    /// # Errors
    /// Returns [`SessionError::NotSignedIn`] before session start and
    /// [`SessionError::Expired`] after expiry or invalidation.
    pub fn bearer(&self, now_ms: u64) -> Result<String, SessionError> {
        {
            let state = self.read();
            match &*state {
                SessionState::Authenticated(token) if !token.is_expired(now_ms) => {
                    return Ok(token.access_token.clone());
                }
                SessionState::Unauthenticated => return Err(SessionError::NotSignedIn),
                SessionState::ReauthRequired => return Err(SessionError::Expired),
                SessionState::Authenticated(_) => {}
            }
        }

        self.invalidate();
        Err(SessionError::Expired)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors produced by session handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No session was started.
    #[error("not signed in")]
    NotSignedIn,
    /// Credential expired or was rejected by the authority.
    #[error("session expired; sign in again")]
    Expired,
}
