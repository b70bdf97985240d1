//! The narrow tool-operation surface.
//!
//! Each inbound call is `{operation, parameters}`; the response is
//! `{ok: true, data}` or `{ok: false, error_kind, message}`. Parameter
//! shapes are validated here, before any network access; unknown operation
//! names are a validation failure, never a panic.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use fundwise_sf_client::security::{id, soql};
use fundwise_sf_client::{Error, Result};

use crate::format;
use crate::gateway::CrmGateway;
use crate::segment::{self, fingerprint_of, SegmentCriteria, MAX_LOOKBACK_MONTHS};

/// Default lookback for prospect search, in months.
const PROSPECT_LOOKBACK_MONTHS: u32 = 12;

/// Default window for giving-pattern analysis, in months.
const DEFAULT_PATTERN_MONTHS: u32 = 12;

/// Cap on the number of monthly buckets a pattern query can return.
const MAX_PATTERN_BUCKETS: u32 = 120;

/// One inbound tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Operation name, 1:1 with the documented tool list.
    pub operation: String,
    /// Structured parameters; shape depends on the operation.
    #[serde(default)]
    pub parameters: Value,
}

/// Structured result of a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ToolResponse {
    /// A successful response carrying the operation's payload.
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error_kind: None,
            message: None,
            retry_after_secs: None,
        }
    }

    /// A structured failure derived from the error taxonomy.
    pub fn failure(err: &Error) -> Self {
        Self {
            ok: false,
            data: None,
            error_kind: Some(err.kind_label().to_string()),
            message: Some(err.to_string()),
            retry_after_secs: err.retry_after().map(|d| d.as_secs()),
        }
    }
}

/// Routes tool calls into the gateway.
#[derive(Debug, Clone)]
pub struct ToolRouter {
    gateway: CrmGateway,
}

impl ToolRouter {
    pub fn new(gateway: CrmGateway) -> Self {
        Self { gateway }
    }

    /// The gateway behind this router.
    pub fn gateway(&self) -> &CrmGateway {
        &self.gateway
    }

    /// Dispatch one tool call, always returning a structured response.
    #[instrument(skip(self, request), fields(operation = %request.operation))]
    pub async fn dispatch(&self, request: &ToolRequest) -> ToolResponse {
        match self.run(request).await {
            Ok(data) => ToolResponse::success(data),
            Err(err) => {
                debug!(error = %err, "tool call failed");
                ToolResponse::failure(&err)
            }
        }
    }

    async fn run(&self, request: &ToolRequest) -> Result<Value> {
        let params = &request.parameters;
        match request.operation.as_str() {
            "query_donors" => self.query_donors(params).await,
            "get_donor_profile" => self.get_donor_profile(params).await,
            "find_prospects" => self.find_prospects(params).await,
            "analyze_giving_patterns" => self.analyze_giving_patterns(params).await,
            "get_portfolio_metrics" => self.get_portfolio_metrics(params).await,
            "create_contact" => self.create_contact(params).await,
            "create_opportunity" => self.create_opportunity(params).await,
            "log_interaction" => self.log_interaction(params).await,
            "create_task" => self.create_task(params).await,
            "update_contact_stage" => self.update_contact_stage(params).await,
            "bulk_update_records" => self.bulk_update_records(params).await,
            other => Err(Error::validation(format!("unknown operation '{other}'"))),
        }
    }

    // ------------------------- read operations -------------------------

    async fn query_donors(&self, params: &Value) -> Result<Value> {
        let mut map = params_object(params)?;
        let segment_name = map
            .remove("segment")
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| Error::validation("missing parameter 'segment'"))?;

        let criteria = SegmentCriteria::parse(&segment_name, &Value::Object(map))?;
        let query = segment::build(&criteria, today())?;
        let result = self.gateway.execute_query(&query).await?;

        let records = annotate_giving(result.records, query.limit);
        Ok(json!({
            "segment": criteria.name(),
            "fingerprint": query.fingerprint,
            "total_size": result.total_size,
            "count": records.len(),
            "records": records,
        }))
    }

    async fn get_donor_profile(&self, params: &Value) -> Result<Value> {
        let map = params_object(params)?;
        let identifier = require_str(&map, "identifier")?;

        let cache_key = format!("profile:{identifier}");
        let result = match self
            .gateway
            .execute_keyed_query(&cache_key, &profile_soql(identifier))
            .await
        {
            Ok(result) => result,
            // Absent reads are an empty result, not an error path.
            Err(err) if err.is_not_found() => return Ok(Value::Null),
            Err(err) => return Err(err),
        };

        match result.records.into_iter().next() {
            None => Ok(Value::Null),
            Some(record) => {
                let mut records = annotate_giving(vec![record], 1);
                Ok(json!({"profile": records.remove(0)}))
            }
        }
    }

    async fn find_prospects(&self, params: &Value) -> Result<Value> {
        let map = params_object(params)?;
        reject_unknown_keys(&map, &["limit"])?;

        let mut seg_params = Map::new();
        seg_params.insert(
            "lookback_months".into(),
            json!(PROSPECT_LOOKBACK_MONTHS),
        );
        if let Some(limit) = map.get("limit") {
            seg_params.insert("limit".into(), limit.clone());
        }

        let criteria = SegmentCriteria::parse("lapsed", &Value::Object(seg_params))?;
        let query = segment::build(&criteria, today())?;
        let result = self.gateway.execute_query(&query).await?;

        // Lifetime giving is the upgrade-likelihood proxy: one point per
        // thousand given.
        let mut scored: Vec<Value> = result
            .records
            .into_iter()
            .take(query.limit as usize)
            .map(|mut record| {
                let lifetime = record
                    .get("npo02__TotalOppAmount__c")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                let score = (lifetime / 1000.0 * 100.0).round() / 100.0;
                if let Some(fields) = record.as_object_mut() {
                    fields.insert("ProspectScore".into(), json!(score));
                    fields.insert(
                        "LifetimeGivingDisplay".into(),
                        json!(format::currency(lifetime)),
                    );
                }
                record
            })
            .collect();
        scored.sort_by(|a, b| {
            let score = |v: &Value| v.get("ProspectScore").and_then(Value::as_f64).unwrap_or(0.0);
            score(b)
                .partial_cmp(&score(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(json!({"count": scored.len(), "records": scored}))
    }

    async fn analyze_giving_patterns(&self, params: &Value) -> Result<Value> {
        let map = params_object(params)?;
        reject_unknown_keys(&map, &["months"])?;
        let months = optional_months(&map, "months")?.unwrap_or(DEFAULT_PATTERN_MONTHS);

        let as_of = today();
        let start = segment::window_start(as_of, months)?;
        let soql = format!(
            "SELECT CALENDAR_YEAR(CloseDate) gift_year, CALENDAR_MONTH(CloseDate) gift_month, \
             SUM(Amount) total_amount, COUNT(Id) gift_count \
             FROM Opportunity WHERE IsWon = true AND CloseDate >= {} \
             GROUP BY CALENDAR_YEAR(CloseDate), CALENDAR_MONTH(CloseDate) \
             ORDER BY CALENDAR_YEAR(CloseDate) DESC, CALENDAR_MONTH(CloseDate) DESC LIMIT {}",
            format::date(start),
            MAX_PATTERN_BUCKETS
        );

        let fingerprint = fingerprint_of(
            "giving_patterns",
            &[
                ("months", months.to_string()),
                ("as_of", format::date(as_of)),
            ],
        );
        let result = self.gateway.execute_keyed_query(&fingerprint, &soql).await?;

        Ok(json!({
            "months": months,
            "window_start": format::date(start),
            "buckets": result.records,
        }))
    }

    async fn get_portfolio_metrics(&self, params: &Value) -> Result<Value> {
        let map = params_object(params)?;
        reject_unknown_keys(&map, &[])?;

        let as_of = today();
        let soql = "SELECT COUNT(Id) gift_count, SUM(Amount) total_raised, \
                    AVG(Amount) average_gift \
                    FROM Opportunity WHERE IsWon = true AND CloseDate = THIS_YEAR LIMIT 1";
        let fingerprint =
            fingerprint_of("portfolio_metrics", &[("year", as_of.year().to_string())]);
        let result = self.gateway.execute_keyed_query(&fingerprint, soql).await?;

        let metrics = result.records.into_iter().next().unwrap_or_else(|| json!({}));
        let total_display = metrics
            .get("total_raised")
            .and_then(Value::as_f64)
            .map(format::currency);

        Ok(json!({
            "year": as_of.year(),
            "metrics": metrics,
            "total_display": total_display,
        }))
    }

    // ------------------------ write operations ------------------------

    async fn create_contact(&self, params: &Value) -> Result<Value> {
        let map = params_object(params)?;
        require_str(&map, "LastName")?;

        let id = self
            .gateway
            .create("Contact", &Value::Object(map))
            .await?;
        Ok(json!({"id": id, "sobject": "Contact"}))
    }

    async fn create_opportunity(&self, params: &Value) -> Result<Value> {
        let map = params_object(params)?;
        require_str(&map, "Name")?;
        require_str(&map, "StageName")?;
        let close_date = require_str(&map, "CloseDate")?;
        NaiveDate::parse_from_str(close_date, "%Y-%m-%d").map_err(|_| {
            Error::validation(format!(
                "'CloseDate' must be a YYYY-MM-DD date, got '{close_date}'"
            ))
        })?;
        let amount = map
            .get("Amount")
            .and_then(Value::as_f64)
            .filter(|a| a.is_finite())
            .ok_or_else(|| Error::validation("'Amount' must be a number"))?;

        let id = self
            .gateway
            .create("Opportunity", &Value::Object(map))
            .await?;
        Ok(json!({
            "id": id,
            "sobject": "Opportunity",
            "amount_display": format::currency(amount),
        }))
    }

    async fn log_interaction(&self, params: &Value) -> Result<Value> {
        let map = params_object(params)?;
        reject_unknown_keys(&map, &["contact_id", "subject", "description"])?;
        let contact_id = require_contact_id(&map, "contact_id")?;

        let mut fields = Map::new();
        fields.insert(
            "Subject".into(),
            json!(optional_str(&map, "subject")?.unwrap_or("Donor Outreach")),
        );
        fields.insert("WhoId".into(), json!(contact_id));
        if let Some(description) = optional_str(&map, "description")? {
            fields.insert("Description".into(), json!(description));
        }

        let id = self.gateway.create("Task", &Value::Object(fields)).await?;
        Ok(json!({"id": id, "sobject": "Task", "contact_id": contact_id}))
    }

    async fn create_task(&self, params: &Value) -> Result<Value> {
        let map = params_object(params)?;
        require_str(&map, "Subject")?;
        let who_id = require_str(&map, "WhoId")?;
        if !id::is_valid_record_id(who_id) {
            return Err(Error::validation(format!(
                "'WhoId' is not a valid record ID: '{who_id}'"
            )));
        }

        let id = self.gateway.create("Task", &Value::Object(map)).await?;
        Ok(json!({"id": id, "sobject": "Task"}))
    }

    async fn update_contact_stage(&self, params: &Value) -> Result<Value> {
        let map = params_object(params)?;
        reject_unknown_keys(&map, &["contact_id", "stage"])?;
        let contact_id = require_contact_id(&map, "contact_id")?;
        let stage = require_str(&map, "stage")?;

        self.gateway
            .update(
                "Contact",
                contact_id,
                &json!({"LifecycleStage__c": stage}),
            )
            .await?;
        Ok(json!({"id": contact_id, "stage": stage}))
    }

    async fn bulk_update_records(&self, params: &Value) -> Result<Value> {
        let map = params_object(params)?;
        reject_unknown_keys(&map, &["records"])?;
        let entries = map
            .get("records")
            .and_then(Value::as_array)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| Error::validation("'records' must be a non-empty array"))?;

        let mut updated = 0u32;
        let mut errors: Vec<String> = Vec::new();

        // Records run sequentially; a failure is reported for its record
        // and the batch continues.
        for (index, entry) in entries.iter().enumerate() {
            let (sobject, record_id, fields) = match parse_bulk_entry(entry) {
                Ok(parts) => parts,
                Err(err) => {
                    errors.push(format!("record {index}: {err}"));
                    continue;
                }
            };
            match self.gateway.update(sobject, record_id, fields).await {
                Ok(()) => updated += 1,
                Err(err) => errors.push(format!("{sobject}:{record_id} -> {err}")),
            }
        }

        Ok(json!({"updated": updated, "errors": errors}))
    }
}

// ------------------------- helpers -------------------------

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn params_object(params: &Value) -> Result<Map<String, Value>> {
    match params {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        _ => Err(Error::validation("parameters must be an object")),
    }
}

fn reject_unknown_keys(map: &Map<String, Value>, allowed: &[&str]) -> Result<()> {
    if let Some(unknown) = map.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(Error::validation(format!("unknown parameter '{unknown}'")));
    }
    Ok(())
}

fn require_str<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    optional_str(map, key)?
        .ok_or_else(|| Error::validation(format!("missing parameter '{key}'")))
}

fn optional_str<'a>(map: &'a Map<String, Value>, key: &str) -> Result<Option<&'a str>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(s)),
        Some(_) => Err(Error::validation(format!(
            "'{key}' must be a non-empty string"
        ))),
    }
}

fn require_contact_id<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    let value = require_str(map, key)?;
    if !id::is_contact_id(value) {
        return Err(Error::validation(format!(
            "'{key}' is not a valid Contact ID: '{value}'"
        )));
    }
    Ok(value)
}

fn optional_months(map: &Map<String, Value>, key: &str) -> Result<Option<u32>> {
    match map.get(key) {
        None => Ok(None),
        Some(value) => {
            let months = value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| (1..=MAX_LOOKBACK_MONTHS).contains(n))
                .ok_or_else(|| {
                    Error::validation(format!(
                        "'{key}' must be an integer between 1 and {MAX_LOOKBACK_MONTHS}"
                    ))
                })?;
            Ok(Some(months))
        }
    }
}

fn parse_bulk_entry(entry: &Value) -> Result<(&str, &str, &Value)> {
    let map = entry
        .as_object()
        .ok_or_else(|| Error::validation("entry must be an object"))?;
    let sobject = map
        .get("sobject")
        .and_then(Value::as_str)
        .filter(|s| soql::is_safe_sobject_name(s))
        .ok_or_else(|| Error::validation("missing or invalid 'sobject'"))?;
    let record_id = map
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| id::is_valid_record_id(s))
        .ok_or_else(|| Error::validation("missing or invalid 'id'"))?;
    let fields = map
        .get("fields")
        .filter(|f| f.as_object().is_some_and(|m| !m.is_empty()))
        .ok_or_else(|| Error::validation("missing or empty 'fields'"))?;
    Ok((sobject, record_id, fields))
}

fn profile_soql(identifier: &str) -> String {
    let filter = if id::is_contact_id(identifier) {
        format!("Id = '{}'", identifier)
    } else {
        format!("Name LIKE '%{}%'", soql::escape_like(identifier))
    };
    format!(
        "SELECT Id, Name, Email, Phone, MailingCity, MailingState, \
         npo02__TotalOppAmount__c, npo02__LastCloseDate__c, \
         (SELECT Amount, CloseDate, StageName FROM Opportunities \
         WHERE IsWon = true ORDER BY CloseDate DESC LIMIT 5) \
         FROM Contact WHERE {filter} LIMIT 1"
    )
}

fn annotate_giving(records: Vec<Value>, limit: u32) -> Vec<Value> {
    records
        .into_iter()
        .take(limit as usize)
        .map(|mut record| {
            let lifetime = record
                .get("npo02__TotalOppAmount__c")
                .and_then(Value::as_f64);
            if let (Some(lifetime), Some(fields)) = (lifetime, record.as_object_mut()) {
                fields.insert(
                    "LifetimeGivingDisplay".into(),
                    json!(format::currency(lifetime)),
                );
            }
            record
        })
        .collect()
}
