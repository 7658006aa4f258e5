//! # Scholar Harvest
//!
//! Resumable batch querying of academic digital libraries (IEEE Xplore, Springer
//! Nature, Elsevier Science Direct) into a deduplicated, persistent set of publications.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Publications and harvest plans
//! - [`sources`]: Per-library request/response adapters and the shared paging state machine
//! - [`store`]: Identifier-keyed results store with crash-safe saves
//! - [`harvest`]: Run state tracking and the sweeping orchestrator
//! - [`utils`]: HTTP transport, retry, and file persistence helpers
//! - [`config`]: Configuration management

pub mod config;
pub mod harvest;
pub mod models;
pub mod sources;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use harvest::{Orchestrator, RunMode, RunState};
pub use models::{Plan, Publication};
pub use sources::{Library, LibraryRegistry};
pub use store::ResultsStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
