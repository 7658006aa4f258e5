//! Springer Nature provider.
//!
//! Uses the Springer Nature metadata API.
//! API documentation: <https://dev.springernature.com>
//!
//! Requires a free API key from developer.springernature.com

use serde::Deserialize;
use serde_json::Value;

use super::{
    clean_springer_venue, lenient_count, lenient_string, mentions_rate_limit, PageOutcome,
    PageParams, PageRequest, Provider, QueryOption,
};
use crate::models::{Publication, PublicationBuilder, PublicationKind};

const SPRINGER_API_BASE: &str = "https://api.springernature.com/meta/v2/json";

const QUERY_OPTIONS: &[QueryOption] = &[QueryOption {
    name: "query_text",
    description: "Boolean match expression.",
    parameter: "q",
}];

/// Springer Nature provider
///
/// The `s` parameter is 1-based; the cursor is translated on every request.
#[derive(Debug, Clone)]
pub struct SpringerProvider {
    endpoint: String,
}

impl SpringerProvider {
    pub fn new() -> Self {
        Self::with_endpoint(SPRINGER_API_BASE)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for SpringerProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for SpringerProvider {
    fn id(&self) -> &str {
        "springer_nature"
    }

    fn description(&self) -> &str {
        "Springer Link"
    }

    fn default_page_size(&self) -> u64 {
        50
    }

    fn query_options(&self) -> &'static [QueryOption] {
        QUERY_OPTIONS
    }

    fn build_request(&self, page: &PageParams<'_>) -> PageRequest {
        let mut request = PageRequest::get(&self.endpoint);
        request.params = vec![
            ("s".to_string(), (page.start + 1).to_string()),
            ("p".to_string(), page.page_size.to_string()),
            ("api_key".to_string(), page.api_key.to_string()),
        ];
        request
            .params
            .extend(page.options.iter().map(|(k, v)| (k.clone(), v.clone())));
        request
            .params
            .extend(page.query.iter().map(|(k, v)| (k.clone(), v.clone())));
        request
    }

    fn parse_response(&self, body: Value) -> PageOutcome {
        if body.get("result").is_none() {
            let message = body
                .get("error")
                .or_else(|| body.get("message"))
                .map(|e| e.to_string())
                .unwrap_or_else(|| body.to_string());
            if mentions_rate_limit(&message) {
                return PageOutcome::RateLimited { retry_after: None };
            }
            return PageOutcome::Failed(format!("Springer error: {}", message));
        }

        let response: SpringerResponse = match serde_json::from_value(body) {
            Ok(response) => response,
            Err(e) => {
                return PageOutcome::Failed(format!("Failed to parse Springer response: {}", e))
            }
        };

        let summary = match response.result.into_iter().next() {
            Some(summary) => summary,
            None => return PageOutcome::Failed("Springer response has an empty result summary".into()),
        };

        let returned = summary
            .records_displayed
            .unwrap_or(response.records.len() as u64);
        let records = response
            .records
            .into_iter()
            .filter_map(|record| self.parse_result(record))
            .collect();

        PageOutcome::Page {
            total: summary.total.unwrap_or(0),
            returned,
            records,
        }
    }
}

impl SpringerProvider {
    fn parse_result(&self, record: SpringerRecord) -> Option<Publication> {
        let identifier = record.doi.clone().or_else(|| {
            record
                .identifier
                .as_deref()
                .map(|id| id.trim_start_matches("doi:").to_string())
        })?;
        let title = record.title.unwrap_or_default();
        let authors = record
            .creators
            .into_iter()
            .filter_map(|c| c.creator)
            .collect();
        let year = record
            .publication_date
            .as_deref()
            .map(|date| date.chars().take(4).collect::<String>());
        let pages = match (&record.starting_page, &record.ending_page) {
            (Some(start), Some(end)) => Some(format!("{}-{}", start, end)),
            (Some(start), None) => Some(start.clone()),
            _ => None,
        };

        let kind = match record.content_type.as_deref() {
            Some("Article") => {
                PublicationKind::article(record.publication_name, record.volume, record.number)
            }
            Some("Chapter ConferencePaper") | Some("ConferencePaper") => PublicationKind::conference(
                record.publication_name.clone(),
                record.publication_name.as_deref().map(clean_springer_venue),
            ),
            Some("Chapter") => PublicationKind::book_chapter(record.publication_name),
            Some("Book") => PublicationKind::book(),
            other => {
                tracing::debug!("Skipping Springer record {} of type {:?}", identifier, other);
                return None;
            }
        };

        Some(
            PublicationBuilder::new(identifier, title, kind)
                .authors(authors)
                .year(year)
                .abstract_text(record.abstract_text)
                .pages(pages)
                .build(),
        )
    }
}

/// Springer API response
#[derive(Debug, Deserialize)]
struct SpringerResponse {
    #[serde(default)]
    result: Vec<SpringerSummary>,
    #[serde(default)]
    records: Vec<SpringerRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpringerSummary {
    #[serde(default, deserialize_with = "lenient_count")]
    total: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    records_displayed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpringerRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    content_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    identifier: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    doi: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default)]
    creators: Vec<SpringerCreator>,
    #[serde(default, deserialize_with = "lenient_string")]
    publication_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    publication_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    volume: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    starting_page: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    ending_page: Option<String>,
    #[serde(rename = "abstract", default, deserialize_with = "lenient_string")]
    abstract_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpringerCreator {
    #[serde(default, deserialize_with = "lenient_string")]
    creator: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_build_request() {
        let provider = SpringerProvider::with_endpoint("http://localhost/meta");
        let mut query = BTreeMap::new();
        query.insert("q".to_string(), "keyword:rust".to_string());
        let request = provider.build_request(&PageParams {
            api_key: "k",
            start: 0,
            page_size: 10,
            query: &query,
            options: &BTreeMap::new(),
        });

        assert_eq!(request.url, "http://localhost/meta");
        assert_eq!(request.param("s"), Some("1"));
        assert_eq!(request.param("p"), Some("10"));
        assert_eq!(request.param("api_key"), Some("k"));
        assert_eq!(request.param("q"), Some("keyword:rust"));
    }

    #[test]
    fn test_parse_records() {
        let provider = SpringerProvider::new();
        let outcome = provider.parse_response(json!({
            "apiMessage": "This JSON was provided by Springer Nature",
            "result": [{"total": "3", "start": "1", "pageLength": "3", "recordsDisplayed": "3"}],
            "records": [
                {
                    "contentType": "Article",
                    "identifier": "doi:10.1007/a",
                    "doi": "10.1007/a",
                    "title": "Borrow Checking",
                    "creators": [{"creator": "Doe, Jane"}, {"creator": "Roe, Rick"}],
                    "publicationName": "Empirical Software Engineering",
                    "publicationDate": "2021-03-01",
                    "volume": "26",
                    "number": "2",
                    "startingPage": "10",
                    "endingPage": "20",
                    "abstract": "Abstract text"
                },
                {
                    "contentType": "Chapter ConferencePaper",
                    "identifier": "doi:10.1007/b",
                    "title": "Model Checking",
                    "creators": [],
                    "publicationName": "Computer Aided Verification",
                    "publicationDate": "2019-07-12"
                },
                {
                    "contentType": "Video",
                    "doi": "10.1007/c",
                    "title": "A Talk"
                }
            ]
        }));

        let (total, returned, records) = match outcome {
            PageOutcome::Page { total, returned, records } => (total, returned, records),
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(total, 3);
        assert_eq!(returned, 3);
        assert_eq!(records.len(), 2);

        let article = &records[0];
        assert_eq!(article.identifier(), "10.1007/a");
        assert_eq!(article.year.as_deref(), Some("2021"));
        assert_eq!(article.authors, vec!["Doe, Jane", "Roe, Rick"]);
        match &article.kind {
            PublicationKind::Article { volume, issue, pages, .. } => {
                assert_eq!(volume.as_deref(), Some("26"));
                assert_eq!(issue.as_deref(), Some("2"));
                assert_eq!(pages.as_deref(), Some("10-20"));
            }
            other => panic!("unexpected kind {:?}", other),
        }

        let paper = &records[1];
        assert_eq!(paper.identifier(), "10.1007/b");
        assert_eq!(paper.kind.label(), "conference");
        assert_eq!(paper.year.as_deref(), Some("2019"));
    }

    #[test]
    fn test_error_envelopes() {
        let provider = SpringerProvider::new();
        assert_eq!(
            provider.parse_response(json!({"error": {"error": "Over Rate", "error_description": "Developer Over Rate"}})),
            PageOutcome::RateLimited { retry_after: None }
        );
        assert!(matches!(
            provider.parse_response(json!({"status": "Fail", "message": "Authentication failed"})),
            PageOutcome::Failed(_)
        ));
        assert!(matches!(
            provider.parse_response(json!({"result": []})),
            PageOutcome::Failed(_)
        ));
    }
}
