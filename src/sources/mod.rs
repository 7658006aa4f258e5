//! Digital library adapters.
//!
//! Each supported library implements the [`Provider`] trait: it knows how to turn a
//! cursor position plus a set of query options into an HTTP request, and how to classify
//! and parse the JSON that comes back. Pagination state, exhaustion and error tracking
//! live in [`Library`], which wraps a provider and is shared by all of them.
//!
//! Providers are registered by name (with aliases) in a [`LibraryRegistry`] that is built
//! once at start-up and passed by reference to whoever needs to construct libraries.
//!
//! # Supported libraries
//!
//! | Library | Aliases | Key variable |
//! |---------|---------|--------------|
//! | IEEE Xplore | `ieee`, `ieeexplore`, `ieee_xplore`, `ieee-xplore`, `xplore` | `IEEE_XPLORE_API_KEY` |
//! | Springer Nature | `springer`, `springer_link`, `springer-link`, `springer_nature`, `springer-nature` | `SPRINGER_LINK_API_KEY` |
//! | Science Direct | `science_direct`, `science-direct`, `sciencedirect`, `elsevier` | `SCIENCE_DIRECT_API_KEY` |
//!
//! `LIBRARY_API_KEY` is used when neither the plan nor the library-specific variable
//! provides a key.

mod ieee_xplore;
mod library;
mod registry;
mod science_direct;
mod springer;
mod venue;

pub mod mock;

pub use ieee_xplore::IeeeXploreProvider;
pub use library::{Library, LibraryState, UNKNOWN_BATCHES, UNKNOWN_TOTAL};
pub use mock::MockTransport;
pub use registry::{LibraryKind, LibraryRegistry, RegisteredLibrary, FALLBACK_KEY_VAR};
pub use science_direct::ScienceDirectProvider;
pub use springer::SpringerProvider;
pub use venue::{clean_ieee_venue, clean_springer_venue};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::models::Publication;

/// A symbolic query option understood by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOption {
    /// Symbolic name used in plans (`query_text`, `year`, ...)
    pub name: &'static str,
    /// One-line description for `describe`
    pub description: &'static str,
    /// Provider-native parameter name
    pub parameter: &'static str,
}

/// Everything a provider needs to build the request for one page
#[derive(Debug, Clone, Copy)]
pub struct PageParams<'a> {
    pub api_key: &'a str,
    /// Number of results already retrieved (0-based)
    pub start: u64,
    pub page_size: u64,
    /// Native parameter name -> value, from the symbolic query options
    pub query: &'a BTreeMap<String, String>,
    /// Non-query options, passed through untouched
    pub options: &'a BTreeMap<String, String>,
}

/// A fully formed HTTP request for one page of results
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: reqwest::Method::GET,
            url: url.into(),
            headers: Vec::new(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Classification of a provider response, decided before any field extraction
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// A page of results. `returned` counts every entry the provider sent, including
    /// ones that could not be mapped to a publication.
    Page {
        total: u64,
        returned: u64,
        records: Vec<Publication>,
    },
    /// The provider asked us to slow down; nothing was consumed
    RateLimited { retry_after: Option<Duration> },
    /// The response cannot be used and retrying will not help
    Failed(String),
}

/// A digital library's request/response mapping.
///
/// Implementations are stateless; cursor and error state belong to [`Library`].
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Canonical identifier (e.g., "ieee_xplore")
    fn id(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Page size used when neither plan nor caller sets one
    fn default_page_size(&self) -> u64 {
        25
    }

    /// Symbolic query options this provider accepts
    fn query_options(&self) -> &'static [QueryOption];

    /// Build the request for one page
    fn build_request(&self, page: &PageParams<'_>) -> PageRequest;

    /// Classify and parse a response body
    fn parse_response(&self, body: Value) -> PageOutcome;

    fn query_option(&self, name: &str) -> Option<&'static QueryOption> {
        self.query_options().iter().find(|option| option.name == name)
    }

    /// Render the known query options, one per line
    fn describe_options(&self) -> String {
        let mut out = String::from("Known Query Options:\n");
        for option in self.query_options() {
            out.push_str(&format!(" - {} - {}\n", option.name, option.description));
        }
        out
    }
}

/// Errors that can occur when interacting with a digital library
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A plan or command line used a query option the library does not know
    #[error("Digital library {library} does not support query option {name}")]
    UnknownQueryParameter { library: String, name: String },

    /// No library is registered under this name
    #[error("Unknown digital library: {0}")]
    UnknownLibrary(String),

    /// No API key in the plan, the library variable, or the fallback variable
    #[error("No API key for {library}: set one in the plan, {env_var}, or {fallback}")]
    MissingCredential {
        library: String,
        env_var: String,
        fallback: String,
    },

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Server-side failure (5xx)
    #[error("Server error: HTTP {0}")]
    Server(u16),

    /// Rate limit signalled at the transport level
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Body could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// API error from the library
    #[error("API error: {0}")]
    Api(String),
}

impl SourceError {
    /// Configuration problems are detected before any request is sent
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SourceError::UnknownQueryParameter { .. }
                | SourceError::UnknownLibrary(_)
                | SourceError::MissingCredential { .. }
        )
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.is_server_error() => SourceError::Server(status.as_u16()),
            _ => SourceError::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

/// Deserialize a field that providers send either as a string or a number
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| value_to_string(&v)))
}

/// Deserialize a count that may arrive as `"12"` or `12`
pub(crate) fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Case-insensitive scan of an error payload for rate-limit wording
pub(crate) fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["rate limit", "rate_limit", "over rate", "over qps", "quota exceeded", "too many requests"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Lenient {
        #[serde(default, deserialize_with = "lenient_string")]
        year: Option<String>,
        #[serde(default, deserialize_with = "lenient_count")]
        total: Option<u64>,
    }

    #[test]
    fn test_lenient_fields() {
        let parsed: Lenient = serde_json::from_value(json!({"year": 2021, "total": "42"})).unwrap();
        assert_eq!(parsed.year.as_deref(), Some("2021"));
        assert_eq!(parsed.total, Some(42));

        let parsed: Lenient = serde_json::from_value(json!({"year": " ", "total": null})).unwrap();
        assert_eq!(parsed.year, None);
        assert_eq!(parsed.total, None);

        let parsed: Lenient = serde_json::from_value(json!({})).unwrap();
        assert_eq!(parsed.year, None);
    }

    #[test]
    fn test_rate_limit_wording() {
        assert!(mentions_rate_limit("Developer Over Qps"));
        assert!(mentions_rate_limit("RATE_LIMIT_EXCEEDED"));
        assert!(!mentions_rate_limit("Invalid API key"));
    }

    #[test]
    fn test_configuration_errors() {
        let err = SourceError::UnknownQueryParameter {
            library: "springer_nature".into(),
            name: "isbn".into(),
        };
        assert!(err.is_configuration());
        assert!(err.to_string().contains("isbn"));
        assert!(!SourceError::Server(503).is_configuration());
    }

    #[test]
    fn test_page_request_lookup() {
        let mut request = PageRequest::get("http://example.com");
        request.params.push(("q".into(), "rust".into()));
        request.headers.push(("X-ELS-APIKey".into(), "k".into()));
        assert_eq!(request.param("q"), Some("rust"));
        assert_eq!(request.header("x-els-apikey"), Some("k"));
        assert_eq!(request.param("missing"), None);
    }
}
