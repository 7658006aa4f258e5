//! Resumable batch harvesting.
//!
//! A [`Plan`](crate::models::Plan) names sites and queries; every (site, query) pair is a
//! cell with its own cursor in the [`RunState`]. The [`Orchestrator`] sweeps the cells in
//! plan order, fetching one page per active cell, merging the records into the
//! [`ResultsStore`](crate::store::ResultsStore) and then persisting the run state. A run
//! killed at any point resumes from the last persisted state and re-fetches at most one
//! page per cell.

mod orchestrator;
mod status;

pub use orchestrator::{build_single, run_single, Orchestrator, RunMode, RunSummary, SweepReport};
pub use status::{CellId, CellStatus, RunState, SiteStatus};

use crate::models::PlanError;
use crate::sources::SourceError;
use crate::store::StoreError;

/// Errors that stop a harvest
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    /// The status file was seeded from a different plan
    #[error("Status file does not match the plan: {0}")]
    PlanMismatch(String),

    #[error("No cell for site {site}, query {query}")]
    UnknownCell { site: usize, query: usize },
}
