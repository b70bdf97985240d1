//! HTTP execution and response classification.
//!
//! Every non-2xx response from the CRM is converted into the [`ErrorKind`]
//! taxonomy here, using the HTTP status together with the remote error code
//! from the Salesforce error body (a JSON array of
//! `{errorCode, message, fields}` objects).

use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::{Error, ErrorKind, Result};

/// Bearer-authenticated HTTP client for the CRM REST endpoints.
#[derive(Debug, Clone)]
pub struct SfHttpClient {
    inner: reqwest::Client,
}

impl SfHttpClient {
    /// Create a new HTTP client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::with_source(ErrorKind::Config(e.to_string()), e))?;

        Ok(Self { inner })
    }

    /// Create a new HTTP client with default configuration.
    pub fn default_client() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// GET with JSON response deserialization.
    #[instrument(skip(self, token), fields(url = %url))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T> {
        let response = self.inner.get(url).bearer_auth(token).send().await?;
        Self::into_json(response).await
    }

    /// POST with JSON body and JSON response.
    #[instrument(skip(self, token, body), fields(url = %url))]
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        token: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .inner
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        Self::into_json(response).await
    }

    /// PATCH with JSON body, expecting 204 No Content on success.
    #[instrument(skip(self, token, body), fields(url = %url))]
    pub async fn patch_no_content<B: Serialize>(
        &self,
        url: &str,
        token: &str,
        body: &B,
    ) -> Result<()> {
        let response = self
            .inner
            .patch(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::classify_response(status, response).await)
    }

    async fn into_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(Self::classify_response(status, response).await);
        }
        debug!(status, "CRM response received");
        response.json().await.map_err(Into::into)
    }

    async fn classify_response(status: u16, response: reqwest::Response) -> Error {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response.text().await.unwrap_or_default();
        classify(status, retry_after, &body)
    }
}

/// Classify a non-2xx CRM response into the error taxonomy.
///
/// The remote error code takes precedence over the bare status where the two
/// disagree (Salesforce reports REQUEST_LIMIT_EXCEEDED with a 403, for
/// example).
pub fn classify(status: u16, retry_after: Option<Duration>, body: &str) -> Error {
    let remote = parse_error_body(body);
    let error_code = remote.as_ref().map(|e| e.error_code.clone());
    let message = remote
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| truncate(body));
    let fields = remote.and_then(|e| e.fields).unwrap_or_default();

    let code = error_code.as_deref().unwrap_or_default();

    if status == 401 || code == "INVALID_SESSION_ID" {
        return Error::new(ErrorKind::AuthExpired {
            status,
            error_code: error_code.unwrap_or_else(|| "INVALID_SESSION_ID".into()),
            message,
        });
    }

    if status == 429 || code == "REQUEST_LIMIT_EXCEEDED" {
        return Error::new(ErrorKind::RateLimited {
            status,
            error_code: error_code.unwrap_or_else(|| "REQUEST_LIMIT_EXCEEDED".into()),
            retry_after,
        });
    }

    if status == 404 {
        return Error::new(ErrorKind::NotFound { status, message });
    }

    if (500..600).contains(&status) {
        return Error::new(ErrorKind::Transient {
            status: Some(status),
            message,
        });
    }

    if status == 400 {
        return Error::new(ErrorKind::ValidationFailed {
            status: Some(status),
            error_code,
            message,
            fields,
        });
    }

    Error::new(ErrorKind::Unknown {
        status: Some(status),
        message,
    })
}

fn truncate(body: &str) -> String {
    const MAX_LENGTH: usize = 500;
    let mut message = body.to_string();
    if message.len() > MAX_LENGTH {
        message.truncate(MAX_LENGTH);
        message.push_str("...[truncated]");
    }
    message
}

fn parse_error_body(body: &str) -> Option<RemoteErrorBody> {
    // Array format first (the usual shape), then a single object.
    if let Ok(errors) = serde_json::from_str::<Vec<RemoteErrorBody>>(body) {
        return errors.into_iter().next();
    }
    serde_json::from_str::<RemoteErrorBody>(body).ok()
}

/// CRM error response format.
#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    #[serde(alias = "errorCode")]
    error_code: String,
    message: String,
    fields: Option<Vec<String>>,
}

/// Result of a SOQL query.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryResult<T> {
    /// Total number of records matching the query.
    #[serde(rename = "totalSize")]
    pub total_size: u64,

    /// Whether all records are returned (no more pages).
    pub done: bool,

    /// URL to fetch the next batch of results.
    #[serde(rename = "nextRecordsUrl", skip_serializing_if = "Option::is_none")]
    pub next_records_url: Option<String>,

    /// The records.
    pub records: Vec<T>,
}

/// Result of an sObject create operation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateResult {
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_classify_auth_expired() {
        let body = r#"[{"errorCode":"INVALID_SESSION_ID","message":"Session expired or invalid"}]"#;
        let err = classify(401, None, body);
        assert!(err.is_auth_expired());
        match err.kind {
            ErrorKind::AuthExpired {
                status, error_code, ..
            } => {
                assert_eq!(status, 401);
                assert_eq!(error_code, "INVALID_SESSION_ID");
            }
            other => panic!("expected AuthExpired, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_rate_limited_by_status_and_by_code() {
        let err = classify(429, Some(Duration::from_secs(30)), "");
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));

        // Salesforce reports request limits with a 403 and an error code.
        let body = r#"[{"errorCode":"REQUEST_LIMIT_EXCEEDED","message":"TotalRequests Limit exceeded."}]"#;
        let err = classify(403, None, body);
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_classify_validation_failed_with_fields() {
        let body = r#"[{"errorCode":"REQUIRED_FIELD_MISSING","message":"Required fields are missing: [LastName]","fields":["LastName"]}]"#;
        let err = classify(400, None, body);
        match err.kind {
            ErrorKind::ValidationFailed {
                error_code, fields, ..
            } => {
                assert_eq!(error_code.as_deref(), Some("REQUIRED_FIELD_MISSING"));
                assert_eq!(fields, vec!["LastName".to_string()]);
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_not_found_transient_unknown() {
        assert!(classify(404, None, "").is_not_found());

        let err = classify(503, None, "upstream unavailable");
        assert!(matches!(
            err.kind,
            ErrorKind::Transient {
                status: Some(503),
                ..
            }
        ));

        let err = classify(405, None, "method not allowed");
        assert!(matches!(err.kind, ErrorKind::Unknown { .. }));
    }

    #[test]
    fn test_classify_malformed_query() {
        let body = r#"[{"errorCode":"MALFORMED_QUERY","message":"unexpected token: LIMIT"}]"#;
        let err = classify(400, None, body);
        assert!(matches!(err.kind, ErrorKind::ValidationFailed { .. }));
        assert!(err.to_string().contains("unexpected token"));
    }

    #[test]
    fn test_truncates_oversized_error_bodies() {
        let body = "x".repeat(800);
        let err = classify(418, None, &body);
        let message = err.to_string();
        assert!(message.len() < 800);
        assert!(message.contains("...[truncated]"));
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/services/data/v62.0/query"))
            .and(header("Authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalSize": 1,
                "done": true,
                "records": [{"Id": "003000000000001AAA", "Name": "Ada Lovelace"}]
            })))
            .mount(&server)
            .await;

        let client = SfHttpClient::default_client().unwrap();
        let result: QueryResult<serde_json::Value> = client
            .get_json(
                &format!("{}/services/data/v62.0/query", server.uri()),
                "token-123",
            )
            .await
            .unwrap();

        assert_eq!(result.total_size, 1);
        assert!(result.done);
        assert_eq!(result.records[0]["Name"], "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_non_2xx_is_classified() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "30")
                    .set_body_json(serde_json::json!([{
                        "errorCode": "REQUEST_LIMIT_EXCEEDED",
                        "message": "TotalRequests Limit exceeded."
                    }])),
            )
            .mount(&server)
            .await;

        let client = SfHttpClient::default_client().unwrap();
        let err = client
            .get_json::<serde_json::Value>(&format!("{}/limited", server.uri()), "token")
            .await
            .unwrap_err();

        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_patch_no_content() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/services/data/v62.0/sobjects/Contact/003000000000001AAA"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = SfHttpClient::default_client().unwrap();
        client
            .patch_no_content(
                &format!(
                    "{}/services/data/v62.0/sobjects/Contact/003000000000001AAA",
                    server.uri()
                ),
                "token",
                &serde_json::json!({"Email": "new@example.org"}),
            )
            .await
            .unwrap();
    }
}
