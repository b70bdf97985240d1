//! Credential variants and environment loading.
//!
//! Exactly one variant is populated per process. The refresh-token variant
//! is preferred and selected first whenever its three keys are present; the
//! password-grant variant is a fallback and is flagged as insecure when
//! selected. An environment satisfying neither variant is a fatal
//! configuration error.

use tracing::warn;

use crate::{Error, ErrorKind, Result};

const DEFAULT_DOMAIN: &str = "login";

/// Credentials for one of the two supported grants.
#[derive(Clone)]
pub enum Credentials {
    /// OAuth 2.0 refresh-token grant (preferred).
    OAuthRefresh {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        /// Fallback instance URL when the token response omits one.
        instance_url: Option<String>,
        domain: String,
    },
    /// Username/password grant (fallback, discouraged).
    PasswordGrant {
        username: String,
        password: String,
        security_token: String,
        domain: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::OAuthRefresh {
                client_id,
                instance_url,
                domain,
                ..
            } => f
                .debug_struct("OAuthRefresh")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .field("refresh_token", &"[REDACTED]")
                .field("instance_url", instance_url)
                .field("domain", domain)
                .finish(),
            Credentials::PasswordGrant {
                username, domain, ..
            } => f
                .debug_struct("PasswordGrant")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .field("security_token", &"[REDACTED]")
                .field("domain", domain)
                .finish(),
        }
    }
}

impl Credentials {
    /// Load credentials from environment variables.
    ///
    /// Recognized keys: `SF_CLIENT_ID`, `SF_CLIENT_SECRET`,
    /// `SF_REFRESH_TOKEN`, `SF_INSTANCE_URL`, `SF_DOMAIN` (default
    /// `"login"`), `SF_USERNAME`, `SF_PASSWORD`, `SF_SECURITY_TOKEN`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load credentials through an arbitrary key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let domain = get("SF_DOMAIN").unwrap_or_else(|| DEFAULT_DOMAIN.to_string());

        if let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
            get("SF_CLIENT_ID"),
            get("SF_CLIENT_SECRET"),
            get("SF_REFRESH_TOKEN"),
        ) {
            return Ok(Credentials::OAuthRefresh {
                client_id,
                client_secret,
                refresh_token,
                instance_url: get("SF_INSTANCE_URL"),
                domain,
            });
        }

        if let (Some(username), Some(password), Some(security_token)) = (
            get("SF_USERNAME"),
            get("SF_PASSWORD"),
            get("SF_SECURITY_TOKEN"),
        ) {
            warn!(
                %username,
                "using password-grant credentials; prefer SF_CLIENT_ID/SF_CLIENT_SECRET/SF_REFRESH_TOKEN"
            );
            return Ok(Credentials::PasswordGrant {
                username,
                password,
                security_token,
                domain,
            });
        }

        Err(Error::new(ErrorKind::Config(
            "incomplete credentials: set SF_CLIENT_ID/SF_CLIENT_SECRET/SF_REFRESH_TOKEN \
             or SF_USERNAME/SF_PASSWORD/SF_SECURITY_TOKEN"
                .to_string(),
        )))
    }

    /// The CRM login domain for this credential set.
    pub fn domain(&self) -> &str {
        match self {
            Credentials::OAuthRefresh { domain, .. } => domain,
            Credentials::PasswordGrant { domain, .. } => domain,
        }
    }

    /// Instance URL configured alongside the credentials, if any.
    pub fn instance_url(&self) -> Option<&str> {
        match self {
            Credentials::OAuthRefresh { instance_url, .. } => instance_url.as_deref(),
            Credentials::PasswordGrant { .. } => None,
        }
    }
}
