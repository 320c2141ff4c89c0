//! One-way migration of the bundled dataset into the remote store, and the
//! inverse export.
//!
//! A migration validates everything before its first write. If a write fails
//! part way, the previous values of every touched key are put back, so the
//! store never holds one new collection next to one old one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::adapter::{
    CATEGORIES_KEY, COMPATIBLE_VERSIONS, CURRENT_SCHEMA_VERSION, KvAdapter, METADATA_KEY, SITES_KEY, SetOptions,
    VERSION_KEY,
};
use crate::bundled::BundledDataset;
use crate::codegen::{StaticFormat, generate_static_file_code};
use crate::error::{Error, Result};
use crate::manager::{CacheScope, DataManager};
use crate::models::{Category, Metadata, Site, VersionRecord};
use crate::validation::validate_dataset;

/// Keys a migration writes, in write order.
const MIGRATED_KEYS: [&str; 4] = [CATEGORIES_KEY, SITES_KEY, METADATA_KEY, VERSION_KEY];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationState {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub progress: u8,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub state: MigrationState,
    /// Percentage, moves through fixed checkpoints.
    pub progress: u8,
    pub message: String,
    pub errors: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub log: Vec<LogEntry>,
}

/// Outcome of a successful migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub categories: usize,
    pub sites: usize,
    pub version: String,
    pub duration_ms: u64,
}

/// Store contents captured by [`Migrator::export_from_kv`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot {
    pub categories: Vec<Category>,
    pub sites: Vec<Site>,
    pub metadata: Metadata,
    pub version: Option<VersionRecord>,
    pub exported_at: DateTime<Utc>,
}

impl ExportSnapshot {
    /// The snapshot as a bundle, ready to replace the embedded dataset.
    pub fn to_bundle(&self) -> BundledDataset {
        BundledDataset {
            version: Some(self.version.as_ref().map_or(CURRENT_SCHEMA_VERSION.to_string(), |v| v.version.clone())),
            generated_at: Some(self.exported_at),
            categories: self.categories.clone(),
            sites: self.sites.clone(),
        }
    }
}

/// Called with `(progress, message)` at each checkpoint.
pub type ProgressListener = Arc<dyn Fn(u8, &str) + Send + Sync>;

pub struct Migrator {
    adapter: Arc<KvAdapter>,
    data: Arc<DataManager>,
    bundled: Arc<BundledDataset>,
    status: Mutex<MigrationStatus>,
    listener: Option<ProgressListener>,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator").field("status", &*self.lock()).finish_non_exhaustive()
    }
}

impl Migrator {
    pub fn new(adapter: Arc<KvAdapter>, data: Arc<DataManager>, bundled: Arc<BundledDataset>) -> Self {
        Self { adapter, data, bundled, status: Mutex::new(MigrationStatus::default()), listener: None }
    }

    pub fn with_listener(mut self, listener: ProgressListener) -> Self {
        self.listener = Some(listener);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MigrationStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_status(&self) -> MigrationStatus {
        self.lock().clone()
    }

    /// Back to `NotStarted`. Refused while a migration is running.
    pub fn reset(&self) -> Result<()> {
        let mut status = self.lock();
        if status.state == MigrationState::InProgress {
            return Err(Error::InvalidInput("cannot reset while a migration is in progress".into()));
        }
        *status = MigrationStatus::default();
        Ok(())
    }

    fn checkpoint(&self, progress: u8, message: &str) {
        tracing::info!(progress, "{message}");
        {
            let mut status = self.lock();
            status.progress = progress;
            status.message = message.to_string();
            status.log.push(LogEntry { timestamp: Utc::now(), progress, message: message.to_string() });
        }
        if let Some(listener) = &self.listener {
            listener(progress, message);
        }
    }

    fn begin(&self) -> Result<()> {
        let mut status = self.lock();
        if status.state == MigrationState::InProgress {
            return Err(Error::MigrationFailed("a migration is already in progress".into()));
        }
        *status = MigrationStatus {
            state: MigrationState::InProgress,
            started_at: Some(Utc::now()),
            message: "Starting migration".into(),
            ..Default::default()
        };
        Ok(())
    }

    /// Migrate the bundled dataset this migrator was built with.
    pub async fn migrate_to_kv(&self) -> Result<MigrationReport> {
        let dataset = Arc::clone(&self.bundled);
        self.migrate_dataset(&dataset).await
    }

    /// Validate `dataset` and write it to the store as the new system of
    /// record.
    pub async fn migrate_dataset(&self, dataset: &BundledDataset) -> Result<MigrationReport> {
        self.begin()?;
        let started = Instant::now();

        match self.run(dataset, started).await {
            Ok(report) => {
                let mut status = self.lock();
                status.state = MigrationState::Completed;
                status.completed_at = Some(Utc::now());
                tracing::info!(categories = report.categories, sites = report.sites, "migration completed");
                Ok(report)
            }
            Err(e) => {
                let errors: Vec<String> = match &e {
                    Error::Validation(fields) => fields.iter().map(|f| f.message.clone()).collect(),
                    other => vec![other.to_string()],
                };
                let summary = match errors.as_slice() {
                    [only] => only.clone(),
                    [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
                    [] => "unknown error".to_string(),
                };
                tracing::warn!(errors = errors.len(), error = %summary, "migration failed");

                let mut status = self.lock();
                status.state = MigrationState::Failed;
                status.completed_at = Some(Utc::now());
                status.message = format!("Migration failed: {summary}");
                status.errors = errors;
                Err(Error::MigrationFailed(summary))
            }
        }
    }

    async fn run(&self, dataset: &BundledDataset, started: Instant) -> Result<MigrationReport> {
        self.checkpoint(10, "Checking prerequisites");
        if !self.adapter.is_available() {
            return Err(Error::network("migrate", CATEGORIES_KEY, "remote store is not available"));
        }

        self.checkpoint(20, "Validating dataset");
        validate_dataset(&dataset.categories, &dataset.sites).into_result()?;

        self.checkpoint(30, "Capturing current store contents");
        let previous: Vec<Option<String>> =
            join_all(MIGRATED_KEYS.iter().map(|key| self.adapter.get_raw(key))).await.into_iter().collect::<Result<_>>()?;

        if let Err(e) = self.write_all(dataset).await {
            self.rollback(&previous).await;
            return Err(e);
        }

        self.data.clear_cache(CacheScope::All).await;
        self.data.refresh_source().await;
        self.checkpoint(100, "Migration completed");

        Ok(MigrationReport {
            categories: dataset.categories.len(),
            sites: dataset.sites.len(),
            version: CURRENT_SCHEMA_VERSION.to_string(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    async fn write_all(&self, dataset: &BundledDataset) -> Result<()> {
        self.checkpoint(50, "Writing categories");
        self.adapter.set(CATEGORIES_KEY, &dataset.categories, SetOptions::default()).await?;

        self.checkpoint(70, "Writing sites");
        self.adapter.set(SITES_KEY, &dataset.sites, SetOptions::default()).await?;

        self.checkpoint(85, "Writing metadata");
        let metadata = Metadata::for_counts(dataset.categories.len(), dataset.sites.len());
        self.adapter.set(METADATA_KEY, &metadata, SetOptions::default()).await?;

        self.checkpoint(95, "Writing version record");
        self.adapter.set_version(CURRENT_SCHEMA_VERSION).await?;
        Ok(())
    }

    async fn rollback(&self, previous: &[Option<String>]) {
        tracing::warn!("restoring store contents after failed migration");
        for (key, value) in MIGRATED_KEYS.iter().zip(previous) {
            if let Err(e) = self.adapter.restore_raw(key, value.as_deref()).await {
                tracing::error!(key, error = %e, "rollback failed for key");
            }
        }
    }

    /// Read both collections back from the store and check them.
    pub async fn export_from_kv(&self) -> Result<ExportSnapshot> {
        if !self.adapter.is_available() {
            return Err(Error::network("export", CATEGORIES_KEY, "remote store is not available"));
        }

        let (categories, sites, metadata, version) = tokio::try_join!(
            self.adapter.get_uncached::<Vec<Category>>(CATEGORIES_KEY),
            self.adapter.get_uncached::<Vec<Site>>(SITES_KEY),
            self.adapter.get_uncached::<Metadata>(METADATA_KEY),
            self.adapter.get_uncached::<VersionRecord>(VERSION_KEY),
        )?;

        if let Some(record) = &version
            && !COMPATIBLE_VERSIONS.contains(&record.version.as_str())
        {
            return Err(Error::IncompatibleVersion {
                found: record.version.clone(),
                compatible: COMPATIBLE_VERSIONS.iter().map(|v| v.to_string()).collect(),
            });
        }

        let categories = categories.unwrap_or_default();
        let sites = sites.unwrap_or_default();
        validate_dataset(&categories, &sites).into_result()?;

        let metadata = metadata.unwrap_or_else(|| Metadata::for_counts(categories.len(), sites.len()));
        tracing::info!(categories = categories.len(), sites = sites.len(), "exported store contents");

        Ok(ExportSnapshot { categories, sites, metadata, version, exported_at: Utc::now() })
    }

    /// Source text for a new bundled dataset built from `snapshot`.
    pub fn generate_static_file_code(&self, snapshot: &ExportSnapshot, format: StaticFormat) -> Result<String> {
        generate_static_file_code(snapshot, format)
    }
}
