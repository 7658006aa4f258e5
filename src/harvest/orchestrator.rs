//! Sweeps a plan's cells a page at a time.

use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{CellId, HarvestError, RunState};
use crate::models::{Plan, QueryOptions};
use crate::sources::{Library, LibraryRegistry, SourceError};
use crate::store::ResultsStore;
use crate::utils::Transport;

/// How long a run goes on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Exactly this many sweeps, finished or not
    Rounds(usize),
    /// Sweep until every cell is complete
    UntilComplete,
}

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Cells visited (one page request each, unless abandoned)
    pub cells: usize,
    /// Cells abandoned because of a configuration error
    pub abandoned: usize,
    /// Cells that finished during this sweep
    pub completed: usize,
    /// Records not previously in the store
    pub new_records: usize,
}

/// What a whole run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds: usize,
    pub pages: usize,
    pub new_records: usize,
    pub total_records: usize,
    pub incomplete: usize,
}

/// Drives a plan to completion, one page per active cell per sweep.
///
/// Execution is sequential. After each page the store is flushed before the run
/// state is persisted, so an interrupted run repeats at most that page.
pub struct Orchestrator<'a> {
    plan: Plan,
    state: RunState,
    store: ResultsStore,
    status_path: PathBuf,
    registry: &'a LibraryRegistry,
    transport: &'a dyn Transport,
    rate_limit_pause: Option<Duration>,
    progress: ProgressBar,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        plan: Plan,
        state: RunState,
        store: ResultsStore,
        status_path: impl Into<PathBuf>,
        registry: &'a LibraryRegistry,
        transport: &'a dyn Transport,
    ) -> Self {
        Self {
            plan,
            state,
            store,
            status_path: status_path.into(),
            registry,
            transport,
            rate_limit_pause: None,
            progress: ProgressBar::hidden(),
        }
    }

    /// Load the plan, resume or seed the run state, and open the results store
    pub fn open(
        plan_path: &Path,
        status_path: &Path,
        results_path: &Path,
        save_every: usize,
        registry: &'a LibraryRegistry,
        transport: &'a dyn Transport,
    ) -> Result<Self, HarvestError> {
        let plan = Plan::load(plan_path)?;
        let state = RunState::load_or_seed(status_path, &plan, registry)?;
        let store = ResultsStore::open(results_path, save_every)?;
        Ok(Self::new(plan, state, store, status_path, registry, transport))
    }

    /// Override the pause applied after a rate-limit response
    pub fn with_rate_limit_pause(mut self, pause: Duration) -> Self {
        self.rate_limit_pause = Some(pause);
        self
    }

    /// Report progress on `bar`; its length follows the remaining-page estimate
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn store(&self) -> &ResultsStore {
        &self.store
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn into_parts(self) -> (RunState, ResultsStore) {
        (self.state, self.store)
    }

    pub async fn run(&mut self, mode: RunMode) -> Result<RunSummary, HarvestError> {
        let mut summary = RunSummary::default();
        self.progress.set_length(self.state.max_batches);

        loop {
            match mode {
                RunMode::Rounds(rounds) if summary.rounds >= rounds => break,
                RunMode::UntilComplete if self.state.incomplete == 0 => break,
                _ => {}
            }

            let report = self.sweep().await?;
            summary.rounds += 1;
            summary.pages += report.cells - report.abandoned;
            summary.new_records += report.new_records;
            self.progress.inc(1);

            if mode == RunMode::UntilComplete && report.cells == 0 {
                tracing::warn!(
                    "No cell could be processed, stopping with {} incomplete",
                    self.state.incomplete
                );
                break;
            }
        }

        self.progress.finish_and_clear();
        summary.total_records = self.store.len();
        summary.incomplete = self.state.incomplete;
        tracing::info!(
            "Run finished after {} rounds: {} new records, {} in store, {} cells left",
            summary.rounds,
            summary.new_records,
            summary.total_records,
            summary.incomplete
        );
        Ok(summary)
    }

    /// Visit every active cell of every enabled site once, in plan order
    pub async fn sweep(&mut self) -> Result<SweepReport, HarvestError> {
        let mut report = SweepReport::default();
        self.state.persist(&self.status_path)?;

        for site_index in 0..self.plan.sites.len() {
            if !self.plan.sites[site_index].enabled {
                continue;
            }
            for query_index in 0..self.plan.queries.len() {
                let id = CellId::new(site_index, query_index);
                if !self.state.has_more(id) {
                    continue;
                }
                report.cells += 1;

                let mut library = match self.build_library(id) {
                    Ok(library) => library,
                    Err(HarvestError::Source(e)) if e.is_configuration() => {
                        tracing::error!(
                            "Abandoning {} query {}: {}",
                            self.plan.sites[site_index].name,
                            query_index,
                            e
                        );
                        self.state.abandon(id, e.to_string())?;
                        self.state.persist(&self.status_path)?;
                        report.abandoned += 1;
                        report.completed += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let records = library.fetch_page(self.transport).await;
                let query = &self.plan.queries[query_index];
                for record in records {
                    if self.store.add(record, Some(library.name()), Some(query))? {
                        report.new_records += 1;
                    }
                }
                self.store.flush()?;

                if self.state.update(id, &library)? {
                    report.completed += 1;
                    tracing::info!(
                        "{} query {} complete ({} results{})",
                        library.name(),
                        query_index,
                        library.start(),
                        library
                            .error()
                            .map(|e| format!(", error: {}", e))
                            .unwrap_or_default()
                    );
                }
                self.state.persist(&self.status_path)?;
                self.progress
                    .set_length(self.progress.position() + self.state.max_batches);
            }
        }

        tracing::info!(
            "Sweep done: {} cells, {} new records, {} cells left",
            report.cells,
            report.new_records,
            self.state.incomplete
        );
        Ok(report)
    }

    /// Fresh library for a cell: plan settings, query options, then the saved cursor
    fn build_library(&self, id: CellId) -> Result<Library, HarvestError> {
        let site = &self.plan.sites[id.site];
        let query = self
            .plan
            .queries
            .get(id.query)
            .ok_or(HarvestError::UnknownCell {
                site: id.site,
                query: id.query,
            })?;

        let mut library = self.registry.build(&site.name, site.key.as_deref())?;
        if let Some(pause) = self.rate_limit_pause {
            library.set_rate_limit_pause(pause);
        }
        library.set_options(&site.options);
        library.set_query_options(query)?;
        self.state.restore(id, &mut library)?;
        Ok(library)
    }
}

/// Page through a single query, merging into `store`.
///
/// Stops after `batches` requests when given, otherwise when the library is exhausted
/// or errored. Provider errors end the run but are not returned as errors; check
/// [`Library::error`].
pub async fn run_single(
    library: &mut Library,
    transport: &dyn Transport,
    store: &mut ResultsStore,
    query: &QueryOptions,
    batches: Option<usize>,
) -> Result<RunSummary, HarvestError> {
    let mut summary = RunSummary::default();

    while library.has_results() && batches.map_or(true, |limit| summary.pages < limit) {
        let records = library.fetch_page(transport).await;
        summary.pages += 1;
        for record in records {
            if store.add(record, Some(library.name()), Some(query))? {
                summary.new_records += 1;
            }
        }
        store.flush()?;
        tracing::info!(
            "{}: {} of {} results retrieved",
            library.name(),
            library.start(),
            library.total()
        );
    }

    summary.rounds = summary.pages;
    summary.total_records = store.len();
    summary.incomplete = usize::from(library.has_results());
    Ok(summary)
}

/// Build a library for single-query mode; any configuration problem is an error
pub fn build_single(
    registry: &LibraryRegistry,
    name: &str,
    key: Option<&str>,
    options: &QueryOptions,
    query: &QueryOptions,
) -> Result<Library, SourceError> {
    let mut library = registry.build(name, key)?;
    library.set_options(options);
    library.set_query_options(query)?;
    Ok(library)
}
