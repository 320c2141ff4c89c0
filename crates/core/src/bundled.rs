//! Read-only dataset shipped with the binary.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::{Category, CollectionMeta, Metadata, Site};
use crate::validation::validate_dataset;

const EMBEDDED: &str = include_str!("../data/bundled.json");

/// Both collections as served in static mode.
///
/// The same shape is produced by the JSON export, so an exported store can be
/// dropped in as a new bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundledDataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub sites: Vec<Site>,
}

impl BundledDataset {
    pub fn new(categories: Vec<Category>, sites: Vec<Site>) -> Self {
        Self { version: None, generated_at: None, categories, sites }
    }

    /// The dataset compiled into this binary.
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidInput(format!("cannot read bundled dataset {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// `bundled_path` when configured, the embedded dataset otherwise.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        match &config.bundled_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading bundled dataset from file");
                Self::load(path)
            }
            None => Self::embedded(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_dataset(&self.categories, &self.sites).into_result()
    }

    /// Counts stamped with the generation time, or now when unknown.
    pub fn metadata(&self) -> Metadata {
        let last_updated = self.generated_at.unwrap_or_else(Utc::now);
        Metadata {
            categories: CollectionMeta { count: self.categories.len(), last_updated },
            sites: CollectionMeta { count: self.sites.len(), last_updated },
        }
    }
}
