//! Scripted transport for testing purposes.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::sources::{PageRequest, SourceError};
use crate::utils::Transport;

/// A transport that replays queued responses in order and records every request.
///
/// When the queue runs dry, `send` fails with an API error so that an unexpected
/// extra request shows up as an errored library instead of a hang.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<Value, SourceError>>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl MockTransport {
    /// Create a new mock transport with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON body.
    pub fn push_response(&self, body: Value) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(body));
    }

    /// Queue a transport-level failure.
    pub fn push_error(&self, error: SourceError) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
    }

    /// Number of requests sent so far.
    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Every request sent so far, oldest first.
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Responses still waiting to be consumed.
    pub fn pending(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &PageRequest) -> Result<Value, SourceError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(SourceError::Api("no scripted response left".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_in_order() {
        let transport = MockTransport::new();
        transport.push_response(json!({"n": 1}));
        transport.push_error(SourceError::RateLimit);

        let request = PageRequest::get("http://localhost/");
        assert_eq!(transport.send(&request).await.unwrap(), json!({"n": 1}));
        assert!(matches!(
            transport.send(&request).await,
            Err(SourceError::RateLimit)
        ));
        assert!(matches!(
            transport.send(&request).await,
            Err(SourceError::Api(_))
        ));
        assert_eq!(transport.request_count(), 3);
        assert_eq!(transport.pending(), 0);
        assert_eq!(transport.requests()[0].url, "http://localhost/");
    }
}
