//! Paging state machine shared by every provider.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{PageOutcome, PageParams, PageRequest, Provider, SourceError};
use crate::models::{Publication, QueryOptions};
use crate::utils::Transport;

/// `total` before the provider has reported one
pub const UNKNOWN_TOTAL: i64 = -1;

/// Remaining-batch estimate used while the total is unknown
pub const UNKNOWN_BATCHES: u64 = 1000;

/// Default pause after a rate-limit response
const DEFAULT_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(60);

/// Lifecycle of a [`Library`]; `Exhausted` and `Errored` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryState {
    Active,
    Exhausted,
    Errored,
}

/// One query against one digital library, fetched a page at a time.
///
/// `start` counts results already retrieved and only moves forward, by the number of
/// entries the provider actually returned. State transitions happen only inside
/// [`Library::fetch_page`].
#[derive(Debug, Clone)]
pub struct Library {
    name: String,
    provider: Arc<dyn Provider>,
    api_key: String,
    start: u64,
    page_size: u64,
    total: i64,
    error: Option<String>,
    query: BTreeMap<String, String>,
    options: BTreeMap<String, String>,
    rate_limit_pause: Duration,
}

impl Library {
    pub fn new(provider: Arc<dyn Provider>, api_key: impl Into<String>) -> Self {
        Self {
            name: provider.id().to_string(),
            page_size: provider.default_page_size(),
            provider,
            api_key: api_key.into(),
            start: 0,
            total: UNKNOWN_TOTAL,
            error: None,
            query: BTreeMap::new(),
            options: BTreeMap::new(),
            rate_limit_pause: DEFAULT_RATE_LIMIT_PAUSE,
        }
    }

    /// Name used in logs and provenance; defaults to the provider id
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    /// Why the library stopped, if it errored
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_start(&mut self, start: u64) {
        self.start = start;
    }

    pub fn set_page_size(&mut self, page_size: u64) {
        self.page_size = page_size.max(1);
    }

    pub fn set_rate_limit_pause(&mut self, pause: Duration) {
        self.rate_limit_pause = pause;
    }

    /// Resume from a previously saved cursor
    pub fn restore_cursor(&mut self, start: u64, page_size: u64, total: i64) {
        self.start = start;
        self.set_page_size(page_size);
        self.total = total.max(UNKNOWN_TOTAL);
    }

    /// Set a non-query option, sent to the provider as-is
    pub fn set_option(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.options.insert(name.into(), value.into());
    }

    pub fn set_options(&mut self, options: &BTreeMap<String, String>) {
        for (name, value) in options {
            self.set_option(name.clone(), value.clone());
        }
    }

    /// Set a symbolic query option, failing if the provider does not know it
    pub fn set_query_option(&mut self, name: &str, value: impl Into<String>) -> Result<(), SourceError> {
        match self.provider.query_option(name) {
            Some(option) => {
                tracing::debug!("{}: {} -> {}", self.name, name, option.parameter);
                self.query.insert(option.parameter.to_string(), value.into());
                Ok(())
            }
            None => {
                tracing::warn!("{}: query option {} is unknown", self.name, name);
                Err(SourceError::UnknownQueryParameter {
                    library: self.provider.id().to_string(),
                    name: name.to_string(),
                })
            }
        }
    }

    pub fn set_query_options(&mut self, query: &QueryOptions) -> Result<(), SourceError> {
        for (name, value) in query {
            self.set_query_option(name, value.clone())?;
        }
        Ok(())
    }

    /// Native query parameters accumulated so far
    pub fn query_data(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    pub fn build_request(&self) -> PageRequest {
        self.provider.build_request(&PageParams {
            api_key: &self.api_key,
            start: self.start,
            page_size: self.page_size,
            query: &self.query,
            options: &self.options,
        })
    }

    pub fn state(&self) -> LibraryState {
        if self.error.is_some() {
            LibraryState::Errored
        } else if self.total > UNKNOWN_TOTAL && self.start >= self.total as u64 {
            LibraryState::Exhausted
        } else {
            LibraryState::Active
        }
    }

    /// Whether more results are expected
    pub fn has_results(&self) -> bool {
        self.state() == LibraryState::Active
    }

    /// Estimated number of pages for the whole query
    pub fn estimate_batches(&self) -> u64 {
        if self.total > UNKNOWN_TOTAL {
            (self.total as u64).div_ceil(self.page_size)
        } else {
            UNKNOWN_BATCHES
        }
    }

    /// Estimated number of pages still to fetch; only meant to size a progress bar
    pub fn estimate_batches_left(&self) -> u64 {
        if self.total > UNKNOWN_TOTAL {
            self.estimate_batches()
                .saturating_sub(self.start.div_ceil(self.page_size))
        } else {
            UNKNOWN_BATCHES
        }
    }

    /// Fetch exactly one page.
    ///
    /// Returns the publications in the page, or nothing when the library is no longer
    /// active, the provider is rate limiting (after pausing), or the request failed for
    /// good, in which case the library becomes `Errored`.
    pub async fn fetch_page(&mut self, transport: &dyn Transport) -> Vec<Publication> {
        if !self.has_results() {
            return Vec::new();
        }

        let request = self.build_request();
        tracing::debug!(
            "{}: requesting results {}..{}",
            self.name,
            self.start,
            self.start + self.page_size
        );

        let body = match transport.send(&request).await {
            Ok(body) => body,
            Err(SourceError::RateLimit) => {
                self.pause(None).await;
                return Vec::new();
            }
            Err(err) => {
                self.fail(err.to_string());
                return Vec::new();
            }
        };

        match self.provider.parse_response(body) {
            PageOutcome::Page {
                total,
                returned,
                records,
            } => {
                tracing::debug!(
                    "{}: {} results for the query, {} in the batch",
                    self.name,
                    total,
                    returned
                );
                self.total = total as i64;
                if returned == 0 && self.start < total {
                    self.fail(format!(
                        "empty page at {} although {} results were reported",
                        self.start, total
                    ));
                    return Vec::new();
                }
                self.start += returned;
                records
            }
            PageOutcome::RateLimited { retry_after } => {
                self.pause(retry_after).await;
                Vec::new()
            }
            PageOutcome::Failed(reason) => {
                self.fail(reason);
                Vec::new()
            }
        }
    }

    async fn pause(&self, retry_after: Option<Duration>) {
        let delay = retry_after.unwrap_or(self.rate_limit_pause);
        tracing::warn!("{}: rate limit exceeded, pausing for {:?}", self.name, delay);
        tokio::time::sleep(delay).await;
    }

    fn fail(&mut self, reason: String) {
        tracing::error!("{}: giving up on query: {}", self.name, reason);
        self.error = Some(reason);
    }
}
