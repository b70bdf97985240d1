//! CRM gateway: query and mutation execution.
//!
//! A session is acquired immediately before every remote call and never
//! reused across calls. An `AuthExpired` classification triggers exactly one
//! invalidate-and-retry with a fresh session; every other error kind is
//! surfaced unchanged. Reads are served through the response cache; any
//! successful mutation clears it.

use serde_json::Value;
use tracing::{debug, instrument, warn};

use fundwise_sf_auth::{Session, SessionManager};
use fundwise_sf_client::security::{id, soql};
use fundwise_sf_client::{
    ClientConfig, CreateResult, Error, QueryResult, Result, SfHttpClient, DEFAULT_API_VERSION,
};

use crate::cache::ResponseCache;
use crate::segment::Query;

/// Executes SOQL queries and record mutations against the CRM.
#[derive(Debug, Clone)]
pub struct CrmGateway {
    http: SfHttpClient,
    sessions: SessionManager,
    cache: ResponseCache,
    api_version: String,
}

impl CrmGateway {
    /// Create a gateway with default HTTP configuration and cache.
    pub fn new(sessions: SessionManager) -> Result<Self> {
        Self::with_parts(sessions, ClientConfig::default(), ResponseCache::new())
    }

    /// Create a gateway with explicit HTTP configuration and cache.
    pub fn with_parts(
        sessions: SessionManager,
        config: ClientConfig,
        cache: ResponseCache,
    ) -> Result<Self> {
        Ok(Self {
            http: SfHttpClient::new(config)?,
            sessions,
            cache,
            api_version: DEFAULT_API_VERSION.to_string(),
        })
    }

    /// Set the API version (e.g., "62.0").
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// The response cache backing read operations.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Execute a built segment query, read-through cached by fingerprint.
    pub async fn execute_query(&self, query: &Query) -> Result<QueryResult<Value>> {
        self.execute_keyed_query(&query.fingerprint, &query.soql)
            .await
    }

    /// Execute a SOQL read cached under an explicit key (query fingerprint
    /// or profile identifier).
    #[instrument(skip(self, soql), fields(cache_key = %cache_key))]
    pub async fn execute_keyed_query(
        &self,
        cache_key: &str,
        soql: &str,
    ) -> Result<QueryResult<Value>> {
        if let Some(hit) = self.cache.get(cache_key) {
            debug!("cache hit");
            return serde_json::from_value(hit).map_err(Into::into);
        }

        let result = self.query_remote(soql).await?;
        self.cache.put(cache_key, serde_json::to_value(&result)?);
        Ok(result)
    }

    /// Create a record, returning its new ID. Invalidates the cache on
    /// success.
    #[instrument(skip(self, fields), fields(sobject = %sobject))]
    pub async fn create(&self, sobject: &str, fields: &Value) -> Result<String> {
        check_sobject(sobject)?;

        let session = self.sessions.acquire().await?;
        let result = match self.send_create(&session, sobject, fields).await {
            Err(err) if err.is_auth_expired() => {
                warn!("session rejected by CRM, refreshing and retrying once");
                self.sessions.invalidate().await;
                let session = self.sessions.acquire().await?;
                self.send_create(&session, sobject, fields).await
            }
            other => other,
        }?;

        self.cache.invalidate_all();
        Ok(result.id)
    }

    /// Update a record by ID. Invalidates the cache on success.
    #[instrument(skip(self, fields), fields(sobject = %sobject, record_id = %record_id))]
    pub async fn update(&self, sobject: &str, record_id: &str, fields: &Value) -> Result<()> {
        check_sobject(sobject)?;
        if !id::is_valid_record_id(record_id) {
            return Err(Error::validation(format!(
                "'{record_id}' is not a valid record ID"
            )));
        }

        let session = self.sessions.acquire().await?;
        match self.send_update(&session, sobject, record_id, fields).await {
            Err(err) if err.is_auth_expired() => {
                warn!("session rejected by CRM, refreshing and retrying once");
                self.sessions.invalidate().await;
                let session = self.sessions.acquire().await?;
                self.send_update(&session, sobject, record_id, fields).await
            }
            other => other,
        }?;

        self.cache.invalidate_all();
        Ok(())
    }

    async fn query_remote(&self, soql: &str) -> Result<QueryResult<Value>> {
        let session = self.sessions.acquire().await?;
        match self.send_query(&session, soql).await {
            Err(err) if err.is_auth_expired() => {
                warn!("session rejected by CRM, refreshing and retrying once");
                self.sessions.invalidate().await;
                let session = self.sessions.acquire().await?;
                self.send_query(&session, soql).await
            }
            other => other,
        }
    }

    async fn send_query(&self, session: &Session, soql: &str) -> Result<QueryResult<Value>> {
        let url = format!(
            "{}/services/data/v{}/query?q={}",
            session.instance_url,
            self.api_version,
            urlencoding::encode(soql)
        );
        self.http.get_json(&url, &session.access_token).await
    }

    async fn send_create(
        &self,
        session: &Session,
        sobject: &str,
        fields: &Value,
    ) -> Result<CreateResult> {
        let url = format!(
            "{}/services/data/v{}/sobjects/{}",
            session.instance_url, self.api_version, sobject
        );
        self.http
            .post_json(&url, &session.access_token, fields)
            .await
    }

    async fn send_update(
        &self,
        session: &Session,
        sobject: &str,
        record_id: &str,
        fields: &Value,
    ) -> Result<()> {
        let url = format!(
            "{}/services/data/v{}/sobjects/{}/{}",
            session.instance_url, self.api_version, sobject, record_id
        );
        self.http
            .patch_no_content(&url, &session.access_token, fields)
            .await
    }
}

fn check_sobject(sobject: &str) -> Result<()> {
    if !soql::is_safe_sobject_name(sobject) {
        return Err(Error::validation(format!(
            "'{sobject}' is not a valid sObject name"
        )));
    }
    Ok(())
}
