//! Donor segment criteria and SOQL generation.
//!
//! The segment set is closed and every parameter is validated against the
//! segment's schema before any query text exists. Query generation is pure:
//! the same criteria and as-of date always produce the same SOQL text and
//! the same fingerprint.
//!
//! Segments target the NPSP contact rollup fields
//! (`npo02__LastCloseDate__c`, `npo02__FirstCloseDate__c`,
//! `npo02__TotalOppAmount__c`, `npo02__NumberOfClosedOpps__c`) so each
//! segment is a single-object query with a deterministic sort.

use chrono::{Months, NaiveDate};
use serde_json::Value;
use sha2::{Digest, Sha256};

use fundwise_sf_client::{Error, Result};

/// Default result cap applied when the caller does not override it.
pub const DEFAULT_LIMIT: u32 = 25;

/// Upper bound on a caller-supplied result cap.
pub const MAX_LIMIT: u32 = 200;

/// Upper bound on a lookback window, in months.
pub const MAX_LOOKBACK_MONTHS: u32 = 120;

/// Field projection shared by `lapsed`, `recent`, and `major`.
pub const SEGMENT_FIELDS: &[&str] = &[
    "Id",
    "Name",
    "Email",
    "npo02__TotalOppAmount__c",
    "npo02__LastCloseDate__c",
];

/// Field projection for `first_time` (adds the first-gift date).
pub const FIRST_TIME_FIELDS: &[&str] = &[
    "Id",
    "Name",
    "Email",
    "npo02__TotalOppAmount__c",
    "npo02__FirstCloseDate__c",
    "npo02__LastCloseDate__c",
];

/// A validated donor segment with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentCriteria {
    /// Donors whose most recent gift closed strictly before the lookback
    /// cutoff.
    Lapsed { lookback_months: u32, limit: u32 },
    /// Donors with a gift inside the lookback window.
    Recent { lookback_months: u32, limit: u32 },
    /// Donors whose earliest gift falls inside the lookback window (so no
    /// gift precedes it).
    FirstTime { lookback_months: u32, limit: u32 },
    /// Donors whose cumulative giving meets the threshold.
    Major { min_amount: f64, limit: u32 },
}

impl SegmentCriteria {
    /// Validate a segment name and parameter map into criteria.
    ///
    /// Rejects unknown segment names, unknown keys, missing keys, wrong
    /// types, and out-of-range values, all before any query is built.
    pub fn parse(name: &str, params: &Value) -> Result<Self> {
        let map = match params {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            _ => return Err(Error::validation("parameters must be an object")),
        };

        let allowed: &[&str] = match name {
            "lapsed" | "recent" | "first_time" => &["lookback_months", "limit"],
            "major" => &["min_amount", "limit"],
            other => {
                return Err(Error::validation(format!(
                    "unknown segment '{other}'; expected one of lapsed, recent, first_time, major"
                )))
            }
        };
        if let Some(unknown) = map.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(Error::validation(format!(
                "unknown parameter '{unknown}' for segment '{name}'"
            )));
        }

        let limit = optional_u32(&map, "limit", 1, MAX_LIMIT)?.unwrap_or(DEFAULT_LIMIT);

        Ok(match name {
            "lapsed" => SegmentCriteria::Lapsed {
                lookback_months: required_u32(&map, "lookback_months", 1, MAX_LOOKBACK_MONTHS)?,
                limit,
            },
            "recent" => SegmentCriteria::Recent {
                lookback_months: required_u32(&map, "lookback_months", 1, MAX_LOOKBACK_MONTHS)?,
                limit,
            },
            "first_time" => SegmentCriteria::FirstTime {
                lookback_months: required_u32(&map, "lookback_months", 1, MAX_LOOKBACK_MONTHS)?,
                limit,
            },
            "major" => SegmentCriteria::Major {
                min_amount: required_amount(&map, "min_amount")?,
                limit,
            },
            _ => unreachable!("segment name validated above"),
        })
    }

    /// The segment's canonical name.
    pub fn name(&self) -> &'static str {
        match self {
            SegmentCriteria::Lapsed { .. } => "lapsed",
            SegmentCriteria::Recent { .. } => "recent",
            SegmentCriteria::FirstTime { .. } => "first_time",
            SegmentCriteria::Major { .. } => "major",
        }
    }

    /// The result cap this criteria will emit.
    pub fn limit(&self) -> u32 {
        match self {
            SegmentCriteria::Lapsed { limit, .. }
            | SegmentCriteria::Recent { limit, .. }
            | SegmentCriteria::FirstTime { limit, .. }
            | SegmentCriteria::Major { limit, .. } => *limit,
        }
    }
}

/// A built, immutable query: SOQL text, its result cap, and the cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub soql: String,
    pub limit: u32,
    pub fingerprint: String,
}

impl Query {
    pub fn new(soql: impl Into<String>, limit: u32, fingerprint: impl Into<String>) -> Self {
        Self {
            soql: soql.into(),
            limit,
            fingerprint: fingerprint.into(),
        }
    }
}

/// Build the SOQL query for validated criteria against an as-of date.
///
/// Pure: identical inputs produce identical SOQL text and fingerprint.
pub fn build(criteria: &SegmentCriteria, as_of: NaiveDate) -> Result<Query> {
    let limit = criteria.limit();
    let as_of_text = soql_date(as_of);

    let (soql, params) = match criteria {
        SegmentCriteria::Lapsed {
            lookback_months,
            limit,
        } => {
            let cutoff = soql_date(window_start(as_of, *lookback_months)?);
            (
                format!(
                    "SELECT {} FROM Contact \
                     WHERE npo02__NumberOfClosedOpps__c > 0 AND npo02__LastCloseDate__c < {} \
                     ORDER BY npo02__LastCloseDate__c DESC NULLS LAST LIMIT {}",
                    SEGMENT_FIELDS.join(", "),
                    cutoff,
                    limit
                ),
                vec![
                    ("lookback_months", lookback_months.to_string()),
                    ("limit", limit.to_string()),
                    ("as_of", as_of_text),
                ],
            )
        }
        SegmentCriteria::Recent {
            lookback_months,
            limit,
        } => {
            let cutoff = soql_date(window_start(as_of, *lookback_months)?);
            (
                format!(
                    "SELECT {} FROM Contact \
                     WHERE npo02__LastCloseDate__c >= {} \
                     ORDER BY npo02__LastCloseDate__c DESC NULLS LAST LIMIT {}",
                    SEGMENT_FIELDS.join(", "),
                    cutoff,
                    limit
                ),
                vec![
                    ("lookback_months", lookback_months.to_string()),
                    ("limit", limit.to_string()),
                    ("as_of", as_of_text),
                ],
            )
        }
        SegmentCriteria::FirstTime {
            lookback_months,
            limit,
        } => {
            let cutoff = soql_date(window_start(as_of, *lookback_months)?);
            (
                format!(
                    "SELECT {} FROM Contact \
                     WHERE npo02__FirstCloseDate__c >= {} \
                     ORDER BY npo02__LastCloseDate__c DESC NULLS LAST LIMIT {}",
                    FIRST_TIME_FIELDS.join(", "),
                    cutoff,
                    limit
                ),
                vec![
                    ("lookback_months", lookback_months.to_string()),
                    ("limit", limit.to_string()),
                    ("as_of", as_of_text),
                ],
            )
        }
        SegmentCriteria::Major { min_amount, limit } => (
            format!(
                "SELECT {} FROM Contact \
                 WHERE npo02__TotalOppAmount__c >= {:.2} \
                 ORDER BY npo02__LastCloseDate__c DESC NULLS LAST LIMIT {}",
                SEGMENT_FIELDS.join(", "),
                min_amount,
                limit
            ),
            vec![
                ("min_amount", format!("{:.2}", min_amount)),
                ("limit", limit.to_string()),
            ],
        ),
    };

    Ok(Query::new(
        soql,
        limit,
        fingerprint_of(criteria.name(), &params),
    ))
}

/// Deterministic cache key for a label plus normalized parameters.
///
/// Parameters are sorted by key before hashing so insertion order cannot
/// change the fingerprint.
pub fn fingerprint_of(label: &str, params: &[(&str, String)]) -> String {
    let mut sorted: Vec<_> = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut canonical = String::from(label);
    for (key, value) in &sorted {
        canonical.push('|');
        canonical.push_str(key);
        canonical.push('=');
        canonical.push_str(value);
    }

    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(32);
    for byte in digest.iter().take(16) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

pub(crate) fn window_start(as_of: NaiveDate, months: u32) -> Result<NaiveDate> {
    as_of
        .checked_sub_months(Months::new(months))
        .ok_or_else(|| Error::validation("lookback window precedes the supported date range"))
}

fn soql_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn required_u32(
    map: &serde_json::Map<String, Value>,
    key: &str,
    min: u32,
    max: u32,
) -> Result<u32> {
    match map.get(key) {
        Some(value) => parse_u32(value, key, min, max),
        None => Err(Error::validation(format!("missing parameter '{key}'"))),
    }
}

fn optional_u32(
    map: &serde_json::Map<String, Value>,
    key: &str,
    min: u32,
    max: u32,
) -> Result<Option<u32>> {
    match map.get(key) {
        Some(value) => parse_u32(value, key, min, max).map(Some),
        None => Ok(None),
    }
}

fn parse_u32(value: &Value, key: &str, min: u32, max: u32) -> Result<u32> {
    let n = value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| Error::validation(format!("'{key}' must be an integer")))?;
    if n < min || n > max {
        return Err(Error::validation(format!(
            "'{key}' must be between {min} and {max}, got {n}"
        )));
    }
    Ok(n)
}

fn required_amount(map: &serde_json::Map<String, Value>, key: &str) -> Result<f64> {
    let amount = map
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::validation(format!("missing or non-numeric parameter '{key}'")))?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::validation(format!("'{key}' must be positive")));
    }
    Ok(amount)
}
