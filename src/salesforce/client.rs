//! Credentials, HTTP client construction and log-safe URL handling.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all Salesforce API requests.
const CLIENT_USER_AGENT: &str = "StampedeBulk/0.1.0";

// ─────────────────────────────────────────────────────────────────────────────
// OrgCredentials
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque credentials handed over by whatever performed the login.
///
/// The access token is wrapped in `SecretString` so it cannot leak through
/// `Debug` or logging.
#[derive(Clone)]
pub struct OrgCredentials {
    /// Instance URL (e.g., "https://na1.salesforce.com")
    pub instance_url: String,
    /// Session id / OAuth access token.
    pub access_token: SecretString,
}

impl std::fmt::Debug for OrgCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrgCredentials")
            .field("instance_url", &self.instance_url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl OrgCredentials {
    pub fn new(instance_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            instance_url: instance_url.into(),
            access_token: SecretString::from(access_token.into()),
        }
    }

    /// Parses the instance URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotAuthenticated` if no instance URL or token is set,
    /// `AppError::Config` if the URL cannot be parsed.
    pub fn base_url(&self) -> Result<Url, AppError> {
        if self.instance_url.is_empty() || self.access_token.expose_secret().is_empty() {
            return Err(AppError::NotAuthenticated);
        }

        Url::parse(&self.instance_url)
            .map_err(|_| AppError::Config("Invalid instance URL".to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// URL Sanitization
// ─────────────────────────────────────────────────────────────────────────────

/// Reduces a URL to its path for logging.
///
/// The result never contains the scheme, host, query or fragment.
pub fn sanitize_url_for_logs(url: &Url) -> String {
    url.path().to_string()
}

/// Redacts a job or batch ID for logging (shows first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((cut, _)) => format!("{}...", &id[..cut]),
        None => id.to_string(),
    }
}

/// Builds the HTTP client used for all bulk calls.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_scheme_and_host() {
        let url = Url::parse("https://na1.salesforce.com/services/async/60.0/job").unwrap();

        let result = sanitize_url_for_logs(&url);

        assert_eq!(result, "/services/async/60.0/job");
        assert!(!result.contains("na1.salesforce.com"));
    }

    #[test]
    fn sanitize_excludes_query_string() {
        let url = Url::parse("https://example.com/services/async/60.0/job?sid=secret&x=1").unwrap();

        let result = sanitize_url_for_logs(&url);

        assert_eq!(result, "/services/async/60.0/job");
        assert!(!result.contains("secret"));
    }

    #[test]
    fn credentials_debug_redacts_token() {
        let creds = OrgCredentials::new("https://na1.salesforce.com", "00Dxx!AQ0secret");

        let debug = format!("{:?}", creds);

        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("00Dxx!AQ0secret"));
    }

    #[test]
    fn base_url_requires_instance_and_token() {
        let missing_url = OrgCredentials::new("", "token");
        assert!(matches!(missing_url.base_url(), Err(AppError::NotAuthenticated)));

        let missing_token = OrgCredentials::new("https://na1.salesforce.com", "");
        assert!(matches!(missing_token.base_url(), Err(AppError::NotAuthenticated)));

        let bad_url = OrgCredentials::new("not a url", "token");
        assert!(matches!(bad_url.base_url(), Err(AppError::Config(_))));

        let ok = OrgCredentials::new("https://na1.salesforce.com", "token");
        assert_eq!(ok.base_url().unwrap().host_str(), Some("na1.salesforce.com"));
    }

    #[test]
    fn test_redact_id_long() {
        assert_eq!(redact_id("750xx000000001ABC"), "750xx000...");
    }

    #[test]
    fn test_redact_id_short() {
        assert_eq!(redact_id("short"), "short");
        assert_eq!(redact_id("12345678"), "12345678");
    }
}
