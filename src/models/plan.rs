//! Harvest plan: which libraries to query, and with which queries.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use super::QueryOptions;

/// A declarative harvest plan, read once at start-up and never modified.
///
/// ```json
/// {
///   "sites": [{"name": "ieee", "enabled": true, "page_size": 25}],
///   "queries": [{"query_text": "\"program repair\"", "year": 2020}]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub sites: Vec<SitePlan>,

    #[serde(default, deserialize_with = "scalar_option_list")]
    pub queries: Vec<QueryOptions>,
}

/// One digital library in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitePlan {
    /// Library name or alias (e.g. "ieee", "springer", "elsevier")
    pub name: String,

    /// Explicit API key; takes precedence over environment variables
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Initial cursor (number of results to skip)
    #[serde(default)]
    pub start: Option<u64>,

    #[serde(default)]
    pub page_size: Option<u64>,

    /// Non-query request options passed through to the provider
    #[serde(default, deserialize_with = "scalar_options")]
    pub options: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// Option values may be written as JSON strings, numbers or booleans
fn scalar_options<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(D::Error::custom(format!(
                        "option '{}' must be a string, number or boolean, got {}",
                        key, other
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}

fn scalar_option_list<'de, D>(deserializer: D) -> Result<Vec<QueryOptions>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Entry(#[serde(deserialize_with = "scalar_options")] QueryOptions);

    let entries = Vec::<Entry>::deserialize(deserializer)?;
    Ok(entries.into_iter().map(|Entry(options)| options).collect())
}

impl Plan {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read a plan file
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content).map_err(|source| PlanError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn enabled_sites(&self) -> impl Iterator<Item = &SitePlan> {
        self.sites.iter().filter(|site| site.enabled)
    }

    /// Total number of (site, query) cells, enabled or not
    pub fn cell_count(&self) -> usize {
        self.sites.len() * self.queries.len()
    }
}

/// Errors reading a plan file
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Cannot read plan file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid plan file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
