//! # fundwise-sf-api
//!
//! Fundraising intelligence core for Salesforce/NPSP.
//!
//! This workspace translates a fixed set of fundraising operations (donor
//! segment queries, donor profile lookup, prospect search, record mutations)
//! into Salesforce SOQL queries and REST calls, behind a narrow
//! request/response interface suitable for an AI-assistant tool dispatcher.
//!
//! ## Security
//!
//! - Sensitive data (tokens, secrets) are redacted in Debug output
//! - Tracing/logging skips credential parameters
//! - All user-provided values are escaped before reaching SOQL text
//!
//! ## Crates
//!
//! - **fundwise-sf-client** - HTTP infrastructure and the typed CRM error taxonomy
//! - **fundwise-sf-auth** - Credentials, OAuth token exchange, single-flight session manager
//! - **fundwise-sf-ops** - Donor segment query builder, response cache, CRM gateway, tool dispatch
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fundwise_sf_auth::{Credentials, SessionManager};
//! use fundwise_sf_ops::{CrmGateway, ToolRequest, ToolRouter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Credentials::from_env()?;
//!     let sessions = SessionManager::new(credentials)?;
//!     let router = ToolRouter::new(CrmGateway::new(sessions)?);
//!
//!     let response = router
//!         .dispatch(&ToolRequest {
//!             operation: "query_donors".into(),
//!             parameters: serde_json::json!({"segment": "lapsed", "lookback_months": 12}),
//!         })
//!         .await;
//!
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```

// Re-export all crates for convenient access
pub use fundwise_sf_auth as auth;
pub use fundwise_sf_client as client;
pub use fundwise_sf_ops as ops;
