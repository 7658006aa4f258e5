//! IEEE Xplore provider.
//!
//! Uses the IEEE Xplore metadata search API.
//! API documentation: <https://developer.ieee.org/>

use serde::Deserialize;
use serde_json::Value;

use super::{
    clean_ieee_venue, lenient_count, lenient_string, mentions_rate_limit, PageOutcome, PageParams,
    PageRequest, Provider, QueryOption,
};
use crate::models::{Publication, PublicationBuilder, PublicationKind};

const IEEE_XPLORE_API_BASE: &str = "https://ieeexploreapi.ieee.org/api/v1/search/articles";

const QUERY_OPTIONS: &[QueryOption] = &[
    QueryOption { name: "query_text", description: "Boolean match expression.", parameter: "querytext" },
    QueryOption { name: "abstract", description: "Match in abstract.", parameter: "abstract" },
    QueryOption { name: "affiliation", description: "Match affiliation.", parameter: "affiliation" },
    QueryOption { name: "title", description: "Match item title.", parameter: "article_title" },
    QueryOption { name: "author", description: "Match author.", parameter: "author" },
    QueryOption { name: "doi", description: "Match DOI.", parameter: "doi" },
    QueryOption { name: "index_terms", description: "Match index terms.", parameter: "index_terms" },
    QueryOption { name: "isbn", description: "Match ISBN.", parameter: "isbn" },
    QueryOption { name: "issn", description: "Match ISSN.", parameter: "issn" },
    QueryOption { name: "issue", description: "Match issue.", parameter: "is_number" },
    QueryOption { name: "publication_title", description: "Match parent title.", parameter: "publication_title" },
    QueryOption { name: "year", description: "Match publication year.", parameter: "publication_year" },
];

/// IEEE Xplore provider
///
/// `start_record` is 1-based on the wire; the cursor is translated on every request.
#[derive(Debug, Clone)]
pub struct IeeeXploreProvider {
    endpoint: String,
}

impl IeeeXploreProvider {
    pub fn new() -> Self {
        Self::with_endpoint(IEEE_XPLORE_API_BASE)
    }

    /// Point the provider at a different endpoint (mirrors, tests)
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for IeeeXploreProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for IeeeXploreProvider {
    fn id(&self) -> &str {
        "ieee_xplore"
    }

    fn description(&self) -> &str {
        "IEEE Xplore Library"
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
            ("start_record".to_string(), (page.start + 1).to_string()),
            ("max_records".to_string(), page.page_size.to_string()),
            ("format".to_string(), "json".to_string()),
            ("apikey".to_string(), page.api_key.to_string()),
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
        if body.get("total_records").is_none() {
            let message = body
                .get("error")
                .or_else(|| body.get("message"))
                .map(|e| e.to_string())
                .unwrap_or_else(|| body.to_string());
            if mentions_rate_limit(&message) {
                return PageOutcome::RateLimited { retry_after: None };
            }
            return PageOutcome::Failed(format!("IEEE Xplore error: {}", message));
        }

        let response: IeeeXploreResponse = match serde_json::from_value(body) {
            Ok(response) => response,
            Err(e) => {
                return PageOutcome::Failed(format!("Failed to parse IEEE Xplore response: {}", e))
            }
        };

        let returned = response.articles.len() as u64;
        let records = response
            .articles
            .into_iter()
            .filter_map(|article| self.parse_result(article))
            .collect();

        PageOutcome::Page {
            total: response.total_records.unwrap_or(0),
            returned,
            records,
        }
    }
}

impl IeeeXploreProvider {
    /// Map one article; content types other than journals and conferences are skipped
    fn parse_result(&self, item: IeeeXploreArticle) -> Option<Publication> {
        let identifier = item.doi.clone().or(item.article_number.clone())?;
        let title = item.title.unwrap_or_default();

        let authors = item
            .authors
            .map(|a| a.authors)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| a.full_name)
            .collect();

        let pages = match (&item.start_page, &item.end_page) {
            (Some(start), Some(end)) => Some(format!("{}-{}", start, end)),
            (Some(start), None) => Some(start.clone()),
            _ => None,
        };

        let kind = match item.content_type.as_deref() {
            Some("Conferences") => PublicationKind::conference(
                item.publication_title.clone(),
                item.publication_title.as_deref().map(clean_ieee_venue),
            ),
            Some("Journals") | Some("Early Access Articles") | Some("Magazines") => {
                PublicationKind::article(item.publication_title, item.volume, item.issue)
            }
            other => {
                tracing::debug!("Skipping IEEE Xplore item {} of type {:?}", identifier, other);
                return None;
            }
        };

        Some(
            PublicationBuilder::new(identifier, title, kind)
                .authors(authors)
                .year(item.publication_year)
                .abstract_text(item.abstract_text)
                .pages(pages)
                .build(),
        )
    }
}

/// IEEE Xplore API response
#[derive(Debug, Deserialize)]
struct IeeeXploreResponse {
    #[serde(default, deserialize_with = "lenient_count")]
    total_records: Option<u64>,
    #[serde(default)]
    articles: Vec<IeeeXploreArticle>,
}

#[derive(Debug, Deserialize)]
struct IeeeXploreArticle {
    #[serde(default, deserialize_with = "lenient_string")]
    article_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    doi: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(rename = "abstract", default, deserialize_with = "lenient_string")]
    abstract_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    content_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    publication_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    publication_year: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    volume: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    issue: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    start_page: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    end_page: Option<String>,
    #[serde(default)]
    authors: Option<IeeeXploreAuthors>,
}

#[derive(Debug, Deserialize)]
struct IeeeXploreAuthors {
    #[serde(default)]
    authors: Vec<IeeeXploreAuthor>,
}

#[derive(Debug, Deserialize)]
struct IeeeXploreAuthor {
    #[serde(default, deserialize_with = "lenient_string")]
    full_name: Option<String>,
}
