//! HTTP client utilities.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::retry::{with_retry, RetryConfig};
use crate::sources::{mentions_rate_limit, PageRequest, SourceError};

/// Sends one page request and hands back the decoded JSON body.
///
/// Implementations decide what counts as a transport failure; everything that parses as
/// JSON is returned so the provider can classify it.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn send(&self, request: &PageRequest) -> Result<Value, SourceError>;
}

/// Shared HTTP client with sensible defaults and transparent retry
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
    retry: RetryConfig,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, SourceError> {
        Self::with_user_agent(
            concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
            Duration::from_secs(30),
        )
    }

    /// Create a new HTTP client with a custom user agent and request timeout
    pub fn with_user_agent(user_agent: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry
    }

    /// One attempt, no retry
    async fn send_once(&self, request: &PageRequest) -> Result<Value, SourceError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(SourceError::Server(status.as_u16()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimit);
        }

        let text = response.text().await?;
        match serde_json::from_str::<Value>(&text) {
            Ok(body) => {
                if !status.is_success() {
                    tracing::debug!("HTTP {} with a JSON body, passing it on", status);
                }
                Ok(body)
            }
            Err(_) if mentions_rate_limit(&text) => Err(SourceError::RateLimit),
            Err(_) if !status.is_success() => Err(SourceError::Api(format!(
                "HTTP {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: &PageRequest) -> Result<Value, SourceError> {
        tracing::debug!("{} {}", request.method, request.url);
        with_retry(self.retry, || self.send_once(request)).await
    }
}
