use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::StoreError;
use crate::models::{Publication, QueryOptions};
use crate::utils::{read_with_fallback, write_with_backup};

/// Deduplicated results of a harvest, saved as a JSON object keyed by identifier.
///
/// The first record seen for an identifier is kept as is; later sightings only extend
/// its provenance. Saves happen every `save_every` changes (0 leaves saving to
/// [`ResultsStore::flush`]).
#[derive(Debug)]
pub struct ResultsStore {
    path: PathBuf,
    records: BTreeMap<String, Publication>,
    save_every: usize,
    unsaved: usize,
}

impl ResultsStore {
    /// Open the store at `path`, rehydrating it (or its backup) when present
    pub fn open(path: impl Into<PathBuf>, save_every: usize) -> Result<Self, StoreError> {
        let path = path.into();
        let records: BTreeMap<String, Publication> =
            read_with_fallback(&path)?.unwrap_or_default();

        if let Some((key, record)) = records.iter().find(|(key, r)| key.as_str() != r.identifier()) {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("entry {} holds record {}", key, record.identifier()),
            });
        }

        tracing::info!("Loaded {} publications from {}", records.len(), path.display());
        Ok(Self {
            path,
            records,
            save_every,
            unsaved: 0,
        })
    }

    /// Merge one record.
    ///
    /// Returns true if the identifier was new. When `source` and `query` are both
    /// given, the pair is appended to the stored record's provenance.
    pub fn add(
        &mut self,
        record: Publication,
        source: Option<&str>,
        query: Option<&QueryOptions>,
    ) -> Result<bool, StoreError> {
        let identifier = record.identifier().to_string();
        let is_new = !self.records.contains_key(&identifier);
        let stored = self.records.entry(identifier).or_insert(record);

        let provenance_added = match (source, query) {
            (Some(source), Some(query)) => stored.add_search_terms(source, query),
            _ => false,
        };

        if is_new {
            tracing::debug!("New publication {}", stored.identifier());
        }

        if is_new || provenance_added {
            self.unsaved += 1;
            if self.save_every > 0 && self.unsaved >= self.save_every {
                self.save()?;
            }
        }
        Ok(is_new)
    }

    /// Save if anything changed since the last save
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.unsaved > 0 {
            self.save()?;
        }
        Ok(())
    }

    /// Save unconditionally
    pub fn save(&mut self) -> Result<(), StoreError> {
        write_with_backup(&self.path, &self.records)?;
        tracing::info!("Saved {} publications to {}", self.records.len(), self.path.display());
        self.unsaved = 0;
        Ok(())
    }

    pub fn get(&self, identifier: &str) -> Option<&Publication> {
        self.records.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.records.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in identifier order
    pub fn iter(&self) -> impl Iterator<Item = &Publication> {
        self.records.values()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Changes not yet written to disk
    pub fn unsaved(&self) -> usize {
        self.unsaved
    }
}
