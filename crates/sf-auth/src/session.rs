//! Session lifecycle: init-on-first-use, invalidate-on-auth-failure.
//!
//! The session slot is guarded by an async mutex held across the token
//! exchange. That makes refresh single-flight: after an invalidation,
//! concurrent `acquire()` callers queue on the lock, the first performs the
//! exchange, and the rest observe the stored session. There is no
//! timer-based expiry; invalidation happens only on a confirmed
//! `AuthExpired` classification downstream.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::credentials::Credentials;
use crate::token::TokenClient;
use crate::{token_url_for_domain, Error, ErrorKind, Result};

/// An authenticated session against one CRM instance.
///
/// Owned by [`SessionManager`]; callers receive a clone valid for the
/// current call only and must re-acquire before each remote call.
#[derive(Clone)]
pub struct Session {
    /// Bearer token for the Authorization header.
    pub access_token: String,
    /// Base URL of the org instance.
    pub instance_url: String,
    /// When this session was obtained.
    pub obtained_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("instance_url", &self.instance_url)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Owns the current session and the refresh protocol.
#[derive(Debug, Clone)]
pub struct SessionManager {
    credentials: Credentials,
    token: TokenClient,
    slot: Arc<Mutex<Option<Session>>>,
}

impl SessionManager {
    /// Create a manager for the given credentials, deriving the token
    /// endpoint from the credential domain.
    pub fn new(credentials: Credentials) -> Result<Self> {
        let token_url = token_url_for_domain(credentials.domain());
        Ok(Self::with_token_url(credentials, token_url))
    }

    /// Create a manager against an explicit token endpoint URL.
    pub fn with_token_url(credentials: Credentials, token_url: impl Into<String>) -> Self {
        Self {
            credentials,
            token: TokenClient::new(token_url),
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Return a valid session, performing a token exchange only when none
    /// is held. Never returns a session already marked invalid.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<Session> {
        let mut slot = self.slot.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }

        debug!("no session held, exchanging credentials for access token");
        let token = self.token.exchange(&self.credentials).await?;
        let instance_url = token
            .instance_url
            .or_else(|| self.credentials.instance_url().map(String::from))
            .ok_or_else(|| {
                Error::new(ErrorKind::Config(
                    "token response carried no instance_url and SF_INSTANCE_URL is unset"
                        .to_string(),
                ))
            })?;

        let session = Session {
            access_token: token.access_token,
            instance_url: instance_url.trim_end_matches('/').to_string(),
            obtained_at: Utc::now(),
        };
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Discard the held session so the next `acquire()` refreshes.
    ///
    /// Called by the gateway only on a confirmed `AuthExpired` response;
    /// a cancelled in-flight call never reaches this.
    pub async fn invalidate(&self) {
        debug!("invalidating held session");
        *self.slot.lock().await = None;
    }
}
