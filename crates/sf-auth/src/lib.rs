//! # fundwise-sf-auth
//!
//! Credential loading and OAuth session management for the fundraising core.
//!
//! ## Security
//!
//! - Sensitive data (tokens, secrets) are redacted in Debug output
//! - Tracing spans skip credential parameters
//! - Error messages never carry credential values
//!
//! ## Supported authentication
//!
//! - **OAuth 2.0 Refresh Token** - the preferred grant; used exclusively
//!   whenever the refresh-token credentials are complete
//! - **Password grant** - fallback only, flagged with a warning when
//!   selected (username/password/security-token credentials are easy to
//!   leak and grant broad access)
//!
//! Sessions carry no server-declared lifetime. Expiry is detected
//! reactively: a downstream `AuthExpired` classification invalidates the
//! held session, and the next `acquire()` performs a single-flight refresh.

mod credentials;
mod session;
mod token;

pub use credentials::Credentials;
pub use fundwise_sf_client::{Error, ErrorKind, Result};
pub use session::{Session, SessionManager};
pub use token::{TokenClient, TokenResponse};

/// Token endpoint for a CRM login domain (`login` for production,
/// `test` for sandbox orgs).
pub fn token_url_for_domain(domain: &str) -> String {
    format!("https://{}.salesforce.com/services/oauth2/token", domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_url_for_domain() {
        assert_eq!(
            token_url_for_domain("login"),
            "https://login.salesforce.com/services/oauth2/token"
        );
        assert_eq!(
            token_url_for_domain("test"),
            "https://test.salesforce.com/services/oauth2/token"
        );
    }
}
