//! Collection records and the small bookkeeping records stored next to them.
//!
//! Field names serialize in camelCase so the stored JSON matches what the
//! static site and admin UI read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A navigation category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Unique slug-like identifier.
    pub id: String,
    pub name: String,
    /// Emoji or icon path.
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Utc::now")]
    pub add_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: icon.into(),
            description: String::new(),
            add_date: Utc::now(),
            last_modified: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A bookmarked site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub short_desc: String,
    #[serde(default)]
    pub icon: String,
    /// Id of the owning [`Category`].
    pub category: String,
    #[serde(default = "Utc::now")]
    pub add_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Site {
    pub fn new(
        id: impl Into<String>, title: impl Into<String>, url: impl Into<String>, category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            description: String::new(),
            short_desc: String::new(),
            icon: String::new(),
            category: category.into(),
            add_date: Utc::now(),
            last_modified: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_short_desc(mut self, short_desc: impl Into<String>) -> Self {
        self.short_desc = short_desc.into();
        self
    }

    /// Case-insensitive substring match over title, descriptions and category.
    ///
    /// `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        [&self.title, &self.description, &self.short_desc, &self.category]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Partial update for a [`Category`]. The id is immutable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CategoryPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.icon.is_none() && self.description.is_none()
    }

    /// Merge the present fields over `category` and stamp `last_modified`.
    pub fn apply(&self, category: &mut Category) {
        if let Some(name) = &self.name {
            category.name = name.clone();
        }
        if let Some(icon) = &self.icon {
            category.icon = icon.clone();
        }
        if let Some(description) = &self.description {
            category.description = description.clone();
        }
        category.last_modified = Some(Utc::now());
    }
}

/// Partial update for a [`Site`]. The id is immutable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub short_desc: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl SitePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.url.is_none()
            && self.description.is_none()
            && self.short_desc.is_none()
            && self.icon.is_none()
            && self.category.is_none()
    }

    /// Merge the present fields over `site` and stamp `last_modified`.
    pub fn apply(&self, site: &mut Site) {
        let fields = [
            (&self.title, &mut site.title),
            (&self.url, &mut site.url),
            (&self.description, &mut site.description),
            (&self.short_desc, &mut site.short_desc),
            (&self.icon, &mut site.icon),
            (&self.category, &mut site.category),
        ];
        for (patch, target) in fields {
            if let Some(value) = patch {
                *target = value.clone();
            }
        }
        site.last_modified = Some(Utc::now());
    }
}

/// Count and freshness of one stored collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMeta {
    pub count: usize,
    pub last_updated: DateTime<Utc>,
}

impl CollectionMeta {
    pub fn now(count: usize) -> Self {
        Self { count, last_updated: Utc::now() }
    }
}

/// Collection-level metadata record stored under `bookmarks:metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub categories: CollectionMeta,
    pub sites: CollectionMeta,
}

impl Metadata {
    pub fn for_counts(categories: usize, sites: usize) -> Self {
        Self { categories: CollectionMeta::now(categories), sites: CollectionMeta::now(sites) }
    }
}

/// Schema version record stored under `data:version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub compatible_versions: Vec<String>,
}

impl VersionRecord {
    pub fn is_compatible(&self) -> bool {
        self.compatible_versions.iter().any(|v| v == &self.version)
    }
}

/// Which backing store the data manager is serving from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Bundled dataset, read-only.
    Static,
    /// Remote key-value store.
    Kv,
    /// Reserved; reads behave like `Kv`.
    Hybrid,
}

/// Snapshot of the data manager's source selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceInfo {
    pub source: DataSource,
    #[serde(rename = "isKVAvailable")]
    pub is_kv_available: bool,
    pub is_initialized: bool,
}
