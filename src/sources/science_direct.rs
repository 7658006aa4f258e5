//! Elsevier Science Direct provider.
//!
//! Uses the Science Direct search API (PUT with a JSON body).
//! API documentation: <https://dev.elsevier.com/documentation/ScienceDirectSearchAPI.wadl>

use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use super::{
    lenient_count, lenient_string, mentions_rate_limit, PageOutcome, PageParams, PageRequest,
    Provider, QueryOption,
};
use crate::models::{Publication, PublicationBuilder, PublicationKind};

const SCIENCE_DIRECT_API_BASE: &str = "https://api.elsevier.com/content/search/sciencedirect";

const QUERY_OPTIONS: &[QueryOption] = &[
    QueryOption { name: "query_text", description: "Boolean match expression.", parameter: "qs" },
    QueryOption { name: "year", description: "Match year.", parameter: "date" },
    QueryOption { name: "issue", description: "Match issue.", parameter: "issue" },
    QueryOption { name: "publication_title", description: "Match parent title.", parameter: "pub" },
    QueryOption { name: "title", description: "Match title.", parameter: "title" },
    QueryOption { name: "volume", description: "Match volume.", parameter: "volume" },
    QueryOption { name: "author", description: "Match author.", parameter: "authors" },
    QueryOption { name: "affiliation", description: "Match affiliation.", parameter: "affiliations" },
];

/// Science Direct provider
///
/// `offset` is 0-based, so the cursor is sent unchanged.
#[derive(Debug, Clone)]
pub struct ScienceDirectProvider {
    endpoint: String,
}

impl ScienceDirectProvider {
    pub fn new() -> Self {
        Self::with_endpoint(SCIENCE_DIRECT_API_BASE)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for ScienceDirectProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for ScienceDirectProvider {
    fn id(&self) -> &str {
        "science_direct"
    }

    fn description(&self) -> &str {
        "Elsevier Science Direct"
    }

    fn query_options(&self) -> &'static [QueryOption] {
        QUERY_OPTIONS
    }

    fn build_request(&self, page: &PageParams<'_>) -> PageRequest {
        let mut body = Map::new();
        body.insert("offset".to_string(), Value::from(page.start));
        body.insert("show".to_string(), Value::from(page.page_size));
        for (key, value) in page.options.iter().chain(page.query.iter()) {
            body.insert(key.clone(), Value::String(value.clone()));
        }

        PageRequest {
            method: reqwest::Method::PUT,
            url: self.endpoint.clone(),
            headers: vec![
                ("Accept".to_string(), "application/json".to_string()),
                ("X-ELS-APIKey".to_string(), page.api_key.to_string()),
            ],
            params: Vec::new(),
            body: Some(Value::Object(body)),
        }
    }

    fn parse_response(&self, body: Value) -> PageOutcome {
        if let Some(error) = body.get("error-response") {
            let code = error
                .get("error-code")
                .or_else(|| error.get("error_code"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if code == "RATE_LIMIT_EXCEEDED" || mentions_rate_limit(code) {
                return PageOutcome::RateLimited { retry_after: None };
            }
            return PageOutcome::Failed(format!("Science Direct error: {}", error));
        }
        if let Some(error) = body.get("service-error") {
            if mentions_rate_limit(&error.to_string()) {
                return PageOutcome::RateLimited {
                    retry_after: Some(Duration::from_secs(60)),
                };
            }
            return PageOutcome::Failed(format!("Science Direct service error: {}", error));
        }

        let response: ScienceDirectResponse = match serde_json::from_value(body) {
            Ok(response) => response,
            Err(e) => {
                return PageOutcome::Failed(format!(
                    "Failed to parse Science Direct response: {}",
                    e
                ))
            }
        };

        let total = match response.results_found {
            Some(total) => total,
            None => return PageOutcome::Failed("Science Direct response has no resultsFound".into()),
        };
        let returned = response.results.len() as u64;
        let records = response
            .results
            .into_iter()
            .filter_map(|result| self.parse_result(result))
            .collect();

        PageOutcome::Page {
            total,
            returned,
            records,
        }
    }
}

impl ScienceDirectProvider {
    /// Entries without an author list are skipped, as are entries without any identifier
    fn parse_result(&self, result: ScienceDirectResult) -> Option<Publication> {
        let identifier = result.doi.or(result.pii)?;
        let authors: Vec<String> = result
            .authors?
            .into_iter()
            .filter_map(|a| a.name)
            .collect();
        let year = result
            .publication_date
            .as_deref()
            .map(|date| date.chars().take(4).collect::<String>());
        let pages = result.pages.and_then(|p| match (p.first, p.last) {
            (Some(first), Some(last)) => Some(format!("{}-{}", first, last)),
            (Some(first), None) => Some(first),
            _ => None,
        });

        Some(
            PublicationBuilder::new(
                identifier,
                result.title.unwrap_or_default(),
                PublicationKind::article(result.source_title, None, None),
            )
            .authors(authors)
            .year(year)
            .pages(pages)
            .build(),
        )
    }
}

/// Science Direct search response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScienceDirectResponse {
    #[serde(default, deserialize_with = "lenient_count")]
    results_found: Option<u64>,
    #[serde(default)]
    results: Vec<ScienceDirectResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScienceDirectResult {
    #[serde(default, deserialize_with = "lenient_string")]
    doi: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pii: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default)]
    authors: Option<Vec<ScienceDirectAuthor>>,
    #[serde(default, deserialize_with = "lenient_string")]
    publication_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    source_title: Option<String>,
    #[serde(default)]
    pages: Option<ScienceDirectPages>,
}

#[derive(Debug, Deserialize)]
struct ScienceDirectAuthor {
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScienceDirectPages {
    #[serde(default, deserialize_with = "lenient_string")]
    first: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    last: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_build_request_uses_put_body() {
        let provider = ScienceDirectProvider::new();
        let mut query = BTreeMap::new();
        query.insert("qs".to_string(), "\"software testing\"".to_string());
        query.insert("date".to_string(), "2020".to_string());

        let request = provider.build_request(&PageParams {
            api_key: "els-key",
            start: 25,
            page_size: 25,
            query: &query,
            options: &BTreeMap::new(),
        });

        assert_eq!(request.method, reqwest::Method::PUT);
        assert_eq!(request.header("X-ELS-APIKey"), Some("els-key"));
        assert_eq!(request.header("accept"), Some("application/json"));
        let body = request.body.unwrap();
        assert_eq!(body["offset"], 25);
        assert_eq!(body["show"], 25);
        assert_eq!(body["qs"], "\"software testing\"");
        assert_eq!(body["date"], "2020");
    }

    #[test]
    fn test_parse_skips_entries_without_authors() {
        let provider = ScienceDirectProvider::new();
        let outcome = provider.parse_response(json!({
            "resultsFound": 40,
            "results": [
                {
                    "doi": "10.1016/j.a",
                    "pii": "S1",
                    "title": "Fuzzing",
                    "authors": [{"order": 1, "name": "Kim Lee"}],
                    "publicationDate": "2022-05-01",
                    "sourceTitle": "Journal of Systems and Software",
                    "pages": {"first": "5", "last": "9"}
                },
                {
                    "pii": "S2",
                    "title": "Editorial",
                    "authors": null,
                    "sourceTitle": "Journal of Systems and Software"
                }
            ]
        }));

        let (total, returned, records) = match outcome {
            PageOutcome::Page { total, returned, records } => (total, returned, records),
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(total, 40);
        assert_eq!(returned, 2);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier(), "10.1016/j.a");
        assert_eq!(records[0].venue(), Some("Journal of Systems and Software"));
        assert_eq!(records[0].year.as_deref(), Some("2022"));
    }

    #[test]
    fn test_error_envelopes() {
        let provider = ScienceDirectProvider::new();
        assert_eq!(
            provider.parse_response(json!({"error-response": {"error_code": "RATE_LIMIT_EXCEEDED"}})),
            PageOutcome::RateLimited { retry_after: None }
        );
        assert!(matches!(
            provider.parse_response(json!({"error-response": {"error-code": "INVALID_INPUT"}})),
            PageOutcome::Failed(_)
        ));
        assert!(matches!(
            provider.parse_response(json!({"service-error": {"status": {"statusCode": "AUTHENTICATION_ERROR"}}})),
            PageOutcome::Failed(_)
        ));
        assert!(matches!(
            provider.parse_response(json!({"results": []})),
            PageOutcome::Failed(_)
        ));
    }
}
