//! Per-cell progress of a harvest, persisted between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::HarvestError;
use crate::models::Plan;
use crate::sources::{Library, LibraryRegistry, UNKNOWN_BATCHES, UNKNOWN_TOTAL};
use crate::utils::{read_with_fallback, write_with_backup};

const FALLBACK_PAGE_SIZE: u64 = 25;

/// Position of a cell: site index and query index in the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId {
    pub site: usize,
    pub query: usize,
}

impl CellId {
    pub fn new(site: usize, query: usize) -> Self {
        Self { site, query }
    }
}

/// Cursor and completion flag of one (site, query) cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellStatus {
    pub start: u64,
    pub page_size: u64,
    /// `-1` until the provider reports a total
    pub total: i64,
    pub has_more: bool,
    /// Remaining-page estimate, for progress only
    pub batches_left: u64,
    /// Why the cell was abandoned, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CellStatus {
    fn seeded(start: u64, page_size: u64, enabled: bool) -> Self {
        Self {
            start,
            page_size,
            total: UNKNOWN_TOTAL,
            has_more: enabled,
            batches_left: if enabled { UNKNOWN_BATCHES } else { 0 },
            error: None,
        }
    }

    /// Never fetched and never abandoned
    fn untouched(&self) -> bool {
        self.total == UNKNOWN_TOTAL && self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStatus {
    pub name: String,
    pub enabled: bool,
    /// One entry per plan query, in plan order
    pub cells: Vec<CellStatus>,
}

/// Progress of every cell of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub sites: Vec<SiteStatus>,
    /// Cells of enabled sites that still have results to fetch
    pub incomplete: usize,
    /// Largest remaining-page estimate over active cells
    pub max_batches: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RunState {
    /// Fresh state for `plan`: one cell per (site, query), enabled cells active
    pub fn seed(plan: &Plan, registry: &LibraryRegistry) -> Self {
        let sites = plan
            .sites
            .iter()
            .map(|site| {
                let page_size = site
                    .page_size
                    .or_else(|| registry.default_page_size(&site.name))
                    .unwrap_or(FALLBACK_PAGE_SIZE)
                    .max(1);
                let start = site.start.unwrap_or(0);
                SiteStatus {
                    name: site.name.clone(),
                    enabled: site.enabled,
                    cells: plan
                        .queries
                        .iter()
                        .map(|_| CellStatus::seeded(start, page_size, site.enabled))
                        .collect(),
                }
            })
            .collect();

        let mut state = Self {
            sites,
            incomplete: 0,
            max_batches: 0,
            updated_at: None,
        };
        state.recount();
        tracing::info!(
            "Seeded run state: {} cells, {} to harvest",
            plan.cell_count(),
            state.incomplete
        );
        state
    }

    /// Read a persisted state (or its backup); `None` if there is none
    pub fn load(path: &Path) -> Result<Option<Self>, HarvestError> {
        Ok(read_with_fallback(path)?)
    }

    /// Rehydrate the state at `path` and reconcile it with `plan`, or seed a new one
    pub fn load_or_seed(
        path: &Path,
        plan: &Plan,
        registry: &LibraryRegistry,
    ) -> Result<Self, HarvestError> {
        match Self::load(path)? {
            Some(mut state) => {
                state.reconcile(plan)?;
                tracing::info!(
                    "Resuming from {}: {} cells left",
                    path.display(),
                    state.incomplete
                );
                Ok(state)
            }
            None => Ok(Self::seed(plan, registry)),
        }
    }

    /// Check that this state was seeded from `plan`
    pub fn check_plan(&self, plan: &Plan) -> Result<(), HarvestError> {
        if self.sites.len() != plan.sites.len() {
            return Err(HarvestError::PlanMismatch(format!(
                "{} sites in the status, {} in the plan",
                self.sites.len(),
                plan.sites.len()
            )));
        }
        for (status, site) in self.sites.iter().zip(&plan.sites) {
            if status.name != site.name {
                return Err(HarvestError::PlanMismatch(format!(
                    "site {} in the status, {} in the plan",
                    status.name, site.name
                )));
            }
            if status.cells.len() != plan.queries.len() {
                return Err(HarvestError::PlanMismatch(format!(
                    "{} queries for {} in the status, {} in the plan",
                    status.cells.len(),
                    site.name,
                    plan.queries.len()
                )));
            }
        }
        Ok(())
    }

    /// Check the plan and follow changes to its `enabled` flags.
    ///
    /// A site enabled since seeding gets its untouched cells activated; a site disabled
    /// since keeps its cursors but stops counting toward `incomplete`.
    pub fn reconcile(&mut self, plan: &Plan) -> Result<(), HarvestError> {
        self.check_plan(plan)?;
        for (status, site) in self.sites.iter_mut().zip(&plan.sites) {
            if site.enabled && !status.enabled {
                for cell in status.cells.iter_mut().filter(|c| !c.has_more && c.untouched()) {
                    cell.has_more = true;
                    cell.batches_left = UNKNOWN_BATCHES;
                }
            }
            status.enabled = site.enabled;
        }
        self.recount();
        Ok(())
    }

    pub fn cell(&self, id: CellId) -> Option<&CellStatus> {
        self.sites.get(id.site).and_then(|s| s.cells.get(id.query))
    }

    fn cell_mut(&mut self, id: CellId) -> Result<&mut CellStatus, HarvestError> {
        self.sites
            .get_mut(id.site)
            .and_then(|s| s.cells.get_mut(id.query))
            .ok_or(HarvestError::UnknownCell {
                site: id.site,
                query: id.query,
            })
    }

    pub fn has_more(&self, id: CellId) -> bool {
        self.cell(id).map(|c| c.has_more).unwrap_or(false)
    }

    /// Copy the cell's cursor into a freshly built library
    pub fn restore(&self, id: CellId, library: &mut Library) -> Result<(), HarvestError> {
        let cell = self.cell(id).ok_or(HarvestError::UnknownCell {
            site: id.site,
            query: id.query,
        })?;
        library.restore_cursor(cell.start, cell.page_size, cell.total);
        Ok(())
    }

    /// Write the library's cursor back into the cell.
    ///
    /// Returns true when this call completed the cell.
    pub fn update(&mut self, id: CellId, library: &Library) -> Result<bool, HarvestError> {
        let cell = self.cell_mut(id)?;
        let was_active = cell.has_more;
        let more = was_active && library.has_results();

        cell.start = library.start();
        cell.page_size = library.page_size();
        cell.total = library.total();
        cell.error = library.error().map(str::to_string);
        cell.has_more = more;
        cell.batches_left = if more { library.estimate_batches_left() } else { 0 };

        let completed = was_active && !more;
        if completed {
            self.incomplete = self.incomplete.saturating_sub(1);
        }
        self.max_batches = self.active_cells().map(|c| c.batches_left).max().unwrap_or(0);
        Ok(completed)
    }

    /// Mark a cell complete without fetching anything, recording why
    pub fn abandon(&mut self, id: CellId, reason: impl Into<String>) -> Result<(), HarvestError> {
        let cell = self.cell_mut(id)?;
        let was_active = cell.has_more;
        cell.has_more = false;
        cell.batches_left = 0;
        cell.error = Some(reason.into());
        if was_active {
            self.incomplete = self.incomplete.saturating_sub(1);
        }
        self.max_batches = self.active_cells().map(|c| c.batches_left).max().unwrap_or(0);
        Ok(())
    }

    /// Save with write-then-rotate
    pub fn persist(&mut self, path: &Path) -> Result<(), HarvestError> {
        self.updated_at = Some(Utc::now());
        write_with_backup(path, self)?;
        Ok(())
    }

    fn active_cells(&self) -> impl Iterator<Item = &CellStatus> {
        self.sites
            .iter()
            .filter(|s| s.enabled)
            .flat_map(|s| s.cells.iter())
            .filter(|c| c.has_more)
    }

    fn recount(&mut self) {
        self.incomplete = self.active_cells().count();
        self.max_batches = self.active_cells().map(|c| c.batches_left).max().unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{IeeeXploreProvider, MockTransport};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn plan() -> Plan {
        Plan::from_json(
            r#"{
                "sites": [
                    {"name": "ieee", "page_size": 2},
                    {"name": "springer", "enabled": false},
                    {"name": "elsevier", "start": 50}
                ],
                "queries": [{"query_text": "a"}, {"query_text": "b"}]
            }"#,
        )
        .unwrap()
    }

    fn library() -> Library {
        let mut library = Library::new(Arc::new(IeeeXploreProvider::new()), "k");
        library.set_rate_limit_pause(Duration::ZERO);
        library
    }

    #[test]
    fn test_seed() {
        let state = RunState::seed(&plan(), &LibraryRegistry::new());
        assert_eq!(state.incomplete, 4);
        assert_eq!(state.max_batches, UNKNOWN_BATCHES);

        let ieee = state.cell(CellId::new(0, 1)).unwrap();
        assert_eq!((ieee.start, ieee.page_size, ieee.total), (0, 2, UNKNOWN_TOTAL));
        assert!(ieee.has_more);

        assert!(!state.has_more(CellId::new(1, 0)));
        assert_eq!(state.cell(CellId::new(1, 0)).unwrap().page_size, 50);

        let elsevier = state.cell(CellId::new(2, 0)).unwrap();
        assert_eq!((elsevier.start, elsevier.page_size), (50, 25));
    }

    #[test]
    fn test_seed_with_nothing_enabled() {
        let plan = Plan::from_json(
            r#"{"sites": [{"name": "ieee", "enabled": false}], "queries": [{"query_text": "a"}]}"#,
        )
        .unwrap();
        let state = RunState::seed(&plan, &LibraryRegistry::new());
        assert_eq!(state.incomplete, 0);
        assert_eq!(state.max_batches, 0);
    }

    #[tokio::test]
    async fn test_update_decrements_once() {
        let mut state = RunState::seed(&plan(), &LibraryRegistry::new());
        let id = CellId::new(0, 0);
        let transport = MockTransport::new();
        transport.push_response(json!({
            "total_records": 1,
            "articles": [{"doi": "10.1/a", "title": "T", "content_type": "Journals"}]
        }));

        let mut lib = library();
        state.restore(id, &mut lib).unwrap();
        lib.fetch_page(&transport).await;

        assert!(state.update(id, &lib).unwrap());
        assert_eq!(state.incomplete, 3);
        let cell = state.cell(id).unwrap();
        assert_eq!((cell.start, cell.total, cell.has_more, cell.batches_left), (1, 1, false, 0));

        // A second update of a finished cell changes nothing
        assert!(!state.update(id, &lib).unwrap());
        assert_eq!(state.incomplete, 3);
    }

    #[test]
    fn test_update_tracks_estimates() {
        let mut state = RunState::seed(&plan(), &LibraryRegistry::new());
        let mut lib = library();
        lib.restore_cursor(2, 2, 10);

        assert!(!state.update(CellId::new(0, 0), &lib).unwrap());
        assert_eq!(state.cell(CellId::new(0, 0)).unwrap().batches_left, 4);
        // Other cells are still unknown
        assert_eq!(state.max_batches, UNKNOWN_BATCHES);
    }

    #[test]
    fn test_abandon() {
        let mut state = RunState::seed(&plan(), &LibraryRegistry::new());
        state.abandon(CellId::new(2, 1), "no key").unwrap();
        assert_eq!(state.incomplete, 3);
        assert_eq!(state.cell(CellId::new(2, 1)).unwrap().error.as_deref(), Some("no key"));

        state.abandon(CellId::new(2, 1), "again").unwrap();
        assert_eq!(state.incomplete, 3);
        assert!(state.abandon(CellId::new(9, 0), "x").is_err());
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.json");
        let registry = LibraryRegistry::new();

        let mut state = RunState::seed(&plan(), &registry);
        state.abandon(CellId::new(0, 0), "boom").unwrap();
        state.persist(&path).unwrap();
        assert!(state.updated_at.is_some());

        let reloaded = RunState::load_or_seed(&path, &plan(), &registry).unwrap();
        assert_eq!(reloaded, state);
    }

    #[test]
    fn test_plan_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.json");
        let registry = LibraryRegistry::new();
        RunState::seed(&plan(), &registry).persist(&path).unwrap();

        let mut other = plan();
        other.queries.pop();
        assert!(matches!(
            RunState::load_or_seed(&path, &other, &registry),
            Err(HarvestError::PlanMismatch(_))
        ));

        let mut renamed = plan();
        renamed.sites[0].name = "xplore".into();
        assert!(matches!(
            RunState::load_or_seed(&path, &renamed, &registry),
            Err(HarvestError::PlanMismatch(_))
        ));
    }

    #[test]
    fn test_reconcile_follows_enabled_flags() {
        let registry = LibraryRegistry::new();
        let mut state = RunState::seed(&plan(), &registry);
        assert_eq!(state.incomplete, 4);

        let mut changed = plan();
        changed.sites[1].enabled = true;
        changed.sites[2].enabled = false;
        state.reconcile(&changed).unwrap();

        assert!(state.has_more(CellId::new(1, 0)));
        // Disabled cells keep their flag but no longer count
        assert!(state.has_more(CellId::new(2, 0)));
        assert_eq!(state.incomplete, 4);

        changed.sites[0].enabled = false;
        state.reconcile(&changed).unwrap();
        assert_eq!(state.incomplete, 2);
    }
}
