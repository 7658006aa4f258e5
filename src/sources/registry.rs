//! Registry of known digital libraries.

use std::collections::HashMap;
use std::sync::Arc;

use super::{
    IeeeXploreProvider, Library, Provider, ScienceDirectProvider, SourceError, SpringerProvider,
};

/// Environment variable consulted when no library-specific key is set
pub const FALLBACK_KEY_VAR: &str = "LIBRARY_API_KEY";

/// The digital libraries this crate can talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryKind {
    IeeeXplore,
    SpringerNature,
    ScienceDirect,
}

impl LibraryKind {
    pub const ALL: [LibraryKind; 3] = [
        LibraryKind::IeeeXplore,
        LibraryKind::SpringerNature,
        LibraryKind::ScienceDirect,
    ];

    /// Names accepted in plans and on the command line; the first is canonical
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            LibraryKind::IeeeXplore => &["ieee_xplore", "ieee", "ieeexplore", "ieee-xplore", "xplore"],
            LibraryKind::SpringerNature => &[
                "springer_nature",
                "springer",
                "springer_link",
                "springer-link",
                "springer-nature",
            ],
            LibraryKind::ScienceDirect => {
                &["science_direct", "science-direct", "sciencedirect", "elsevier"]
            }
        }
    }

    /// Environment variable holding this library's API key
    pub fn env_var(&self) -> &'static str {
        match self {
            LibraryKind::IeeeXplore => "IEEE_XPLORE_API_KEY",
            LibraryKind::SpringerNature => "SPRINGER_LINK_API_KEY",
            LibraryKind::ScienceDirect => "SCIENCE_DIRECT_API_KEY",
        }
    }

    pub fn provider(&self) -> Arc<dyn Provider> {
        match self {
            LibraryKind::IeeeXplore => Arc::new(IeeeXploreProvider::new()),
            LibraryKind::SpringerNature => Arc::new(SpringerProvider::new()),
            LibraryKind::ScienceDirect => Arc::new(ScienceDirectProvider::new()),
        }
    }
}

/// A provider together with the names it answers to
#[derive(Debug, Clone)]
pub struct RegisteredLibrary {
    pub provider: Arc<dyn Provider>,
    pub aliases: Vec<String>,
    pub env_var: Option<String>,
}

/// Immutable name -> provider mapping, built once and passed by reference
#[derive(Debug, Clone, Default)]
pub struct LibraryRegistry {
    entries: Vec<RegisteredLibrary>,
    by_name: HashMap<String, usize>,
}

impl LibraryRegistry {
    /// Create a registry with every supported library
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for kind in LibraryKind::ALL {
            registry.register(kind.provider(), kind.aliases(), Some(kind.env_var()));
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register a provider under its id and the given aliases
    pub fn register(&mut self, provider: Arc<dyn Provider>, aliases: &[&str], env_var: Option<&str>) {
        tracing::debug!("Registering digital library {}", provider.id());
        let index = self.entries.len();
        let mut names: Vec<String> = vec![provider.id().to_string()];
        names.extend(aliases.iter().map(|alias| alias.to_string()));
        names.dedup();
        for name in &names {
            self.by_name.insert(name.to_lowercase(), index);
        }
        self.entries.push(RegisteredLibrary {
            provider,
            aliases: names,
            env_var: env_var.map(str::to_string),
        });
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredLibrary> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|index| &self.entries[*index])
    }

    pub fn get_required(&self, name: &str) -> Result<&RegisteredLibrary, SourceError> {
        self.get(name)
            .ok_or_else(|| SourceError::UnknownLibrary(name.to_string()))
    }

    /// Registered libraries in registration order
    pub fn all(&self) -> impl Iterator<Item = &RegisteredLibrary> {
        self.entries.iter()
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve an API key: explicit key, then the library variable, then the fallback
    pub fn resolve_key(&self, name: &str, explicit: Option<&str>) -> Result<String, SourceError> {
        self.resolve_key_with(name, explicit, |var| std::env::var(var).ok())
    }

    /// [`Self::resolve_key`] with a custom environment lookup
    pub fn resolve_key_with<F>(
        &self,
        name: &str,
        explicit: Option<&str>,
        lookup: F,
    ) -> Result<String, SourceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let entry = self.get_required(name)?;
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(explicit.map(str::to_string)) {
            return Ok(key);
        }
        if let Some(var) = &entry.env_var {
            if let Some(key) = non_empty(lookup(var)) {
                return Ok(key);
            }
        }
        non_empty(lookup(FALLBACK_KEY_VAR)).ok_or_else(|| SourceError::MissingCredential {
            library: entry.provider.id().to_string(),
            env_var: entry
                .env_var
                .clone()
                .unwrap_or_else(|| FALLBACK_KEY_VAR.to_string()),
            fallback: FALLBACK_KEY_VAR.to_string(),
        })
    }

    /// Build a fresh [`Library`] for `name`, resolving its API key
    pub fn build(&self, name: &str, explicit_key: Option<&str>) -> Result<Library, SourceError> {
        let entry = self.get_required(name)?;
        let key = self.resolve_key(name, explicit_key)?;
        Ok(Library::new(Arc::clone(&entry.provider), key).with_name(name))
    }

    /// Default page size for a library, if it is known
    pub fn default_page_size(&self, name: &str) -> Option<u64> {
        self.get(name).map(|entry| entry.provider.default_page_size())
    }
}
