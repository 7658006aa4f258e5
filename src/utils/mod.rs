//! Utility modules supporting harvesting runs.
//!
//! - [`Transport`]: sends one page request and returns the decoded JSON body
//! - [`HttpClient`]: reqwest-backed [`Transport`] with transparent retry
//! - [`RetryConfig`]: configuration for retry logic with exponential backoff
//! - [`with_retry`]: execute an operation with automatic retry on transient errors
//! - [`write_with_backup`] / [`read_with_fallback`]: crash-safe JSON files
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use scholar_harvest::sources::SourceError;
//! use scholar_harvest::utils::{with_retry, RetryConfig};
//!
//! # async fn fetch_data() -> Result<String, SourceError> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), SourceError> {
//! let result = with_retry(RetryConfig::default(), || fetch_data()).await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod persist;
mod retry;

pub use http::{HttpClient, Transport};
pub use persist::{backup_path, read_with_fallback, write_with_backup};
pub use retry::{with_retry, RetryConfig, TransientError};
