//! # fundwise-sf-client
//!
//! HTTP client infrastructure for the fundraising CRM core.
//!
//! This crate provides the transport layer shared by the auth and ops crates:
//! - a thin typed-JSON client over the Salesforce REST endpoints
//! - classification of every non-2xx response into the [`ErrorKind`]
//!   taxonomy (`AuthExpired`, `RateLimited`, `ValidationFailed`, `NotFound`,
//!   `Transient`, `Unknown`); callers never see a raw transport error
//! - SOQL escaping and identifier-safety utilities
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │              fundwise-sf-ops                   │
//! │  (segment queries, cache, gateway, dispatch)   │
//! └────────────────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌────────────────────────────────────────────────┐
//! │                SfHttpClient                    │
//! │  - bearer-authenticated GET/POST/PATCH         │
//! │  - non-2xx → typed CrmError classification     │
//! └────────────────────────────────────────────────┘
//! ```

mod client;
mod config;
mod error;
pub mod security;

pub use client::{classify, CreateResult, QueryResult, SfHttpClient};
pub use config::ClientConfig;
pub use error::{Error, ErrorKind, Result};

/// Default Salesforce API version
pub const DEFAULT_API_VERSION: &str = "62.0";

/// User-Agent string for the client
pub const USER_AGENT: &str = concat!("fundwise-sf-api/", env!("CARGO_PKG_VERSION"));
