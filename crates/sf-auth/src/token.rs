//! OAuth token exchange.
//!
//! One POST against the token endpoint per exchange. Grant parameters are
//! form-encoded; the refresh-token grant and the password grant share the
//! same endpoint and response shape.

use serde::Deserialize;
use tracing::instrument;

use crate::credentials::Credentials;
use crate::{Error, ErrorKind, Result};

/// Client for the OAuth token endpoint.
#[derive(Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    token_url: String,
}

impl std::fmt::Debug for TokenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenClient")
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

impl TokenClient {
    /// Create a token client against the given endpoint URL.
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: token_url.into(),
        }
    }

    /// Exchange the held credentials for an access token.
    ///
    /// Credential values are sent in the request body only; nothing secret
    /// is logged or embedded in URLs.
    #[instrument(skip(self, credentials))]
    pub async fn exchange(&self, credentials: &Credentials) -> Result<TokenResponse> {
        let body = match credentials {
            Credentials::OAuthRefresh {
                client_id,
                client_secret,
                refresh_token,
                ..
            } => serde_urlencoded::to_string([
                ("grant_type", "refresh_token"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ]),
            Credentials::PasswordGrant {
                username,
                password,
                security_token,
                ..
            } => {
                // The security token is appended to the password, per the
                // CRM's password-grant contract.
                let secret = format!("{}{}", password, security_token);
                serde_urlencoded::to_string([
                    ("grant_type", "password"),
                    ("username", username.as_str()),
                    ("password", secret.as_str()),
                ])
            }
        }
        .map_err(|e| {
            Error::with_source(
                ErrorKind::Unknown {
                    status: None,
                    message: format!("failed to encode token request: {}", e),
                },
                e,
            )
        })?;

        let response = self
            .http
            .post(&self.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(Error::from)?;

        self.handle_token_response(response).await
    }

    async fn handle_token_response(&self, response: reqwest::Response) -> Result<TokenResponse> {
        let status = response.status().as_u16();
        if response.status().is_success() {
            return response.json().await.map_err(Into::into);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(std::time::Duration::from_secs);

        let body = response.text().await.unwrap_or_default();
        let oauth_err: Option<OAuthErrorResponse> = serde_json::from_str(&body).ok();

        Err(match (status, oauth_err) {
            // An expired or revoked grant is the auth-expired condition for
            // the token endpoint.
            (400 | 401, Some(err)) if err.error == "invalid_grant" => {
                Error::new(ErrorKind::AuthExpired {
                    status,
                    error_code: err.error,
                    message: err.error_description,
                })
            }
            (429, _) => Error::new(ErrorKind::RateLimited {
                status,
                error_code: "REQUEST_LIMIT_EXCEEDED".into(),
                retry_after,
            }),
            (s, _) if (500..600).contains(&s) => Error::new(ErrorKind::Transient {
                status: Some(s),
                message: "token endpoint unavailable".into(),
            }),
            (s, Some(err)) => Error::new(ErrorKind::Unknown {
                status: Some(s),
                message: format!("OAuth error: {} - {}", err.error, err.error_description),
            }),
            (s, None) => Error::new(ErrorKind::Unknown {
                status: Some(s),
                message: "token exchange failed".into(),
            }),
        })
    }
}

/// Response from the token endpoint.
///
/// The access token is redacted in Debug output.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Instance URL (present on every grant the CRM issues, but kept
    /// optional so a missing value becomes a classified error, not a
    /// deserialization failure).
    #[serde(default)]
    pub instance_url: Option<String>,
    /// Token type (usually "Bearer").
    #[serde(default)]
    pub token_type: Option<String>,
    /// Issued-at timestamp, as reported by the endpoint.
    #[serde(default)]
    pub issued_at: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("instance_url", &self.instance_url)
            .field("token_type", &self.token_type)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// OAuth error response body.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}
