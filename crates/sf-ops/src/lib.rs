//! # fundwise-sf-ops
//!
//! Donor-facing operations for the fundraising CRM core:
//!
//! - **segment** - the closed donor-segment set (`lapsed`, `recent`,
//!   `first_time`, `major`) with schema validation, deterministic SOQL
//!   generation, and query fingerprints
//! - **cache** - TTL response cache keyed by query fingerprint
//! - **gateway** - query/mutation execution with a single bounded
//!   auth-refresh retry and read-through caching
//! - **ops** - the narrow `{operation, parameters}` → `{ok, ...}` tool
//!   dispatch surface
//!
//! ## Example
//!
//! ```rust,ignore
//! use fundwise_sf_auth::{Credentials, SessionManager};
//! use fundwise_sf_ops::{CrmGateway, ToolRequest, ToolRouter};
//!
//! let sessions = SessionManager::new(Credentials::from_env()?)?;
//! let router = ToolRouter::new(CrmGateway::new(sessions)?);
//! let response = router.dispatch(&ToolRequest {
//!     operation: "query_donors".into(),
//!     parameters: serde_json::json!({"segment": "major", "min_amount": 10000}),
//! }).await;
//! ```

mod cache;
pub mod format;
mod gateway;
mod ops;
mod segment;

pub use cache::{ResponseCache, DEFAULT_TTL};
pub use fundwise_sf_client::{Error, ErrorKind, Result};
pub use gateway::CrmGateway;
pub use ops::{ToolRequest, ToolResponse, ToolRouter};
pub use segment::{Query, SegmentCriteria, DEFAULT_LIMIT, MAX_LIMIT, MAX_LOOKBACK_MONTHS};
