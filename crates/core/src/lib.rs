//! Core types and shared functionality for marknav.
//!
//! This crate provides:
//! - Pluggable TTL/LRU cache with memory, SQLite and hybrid tiers
//! - Typed adapter over the remote key-value store
//! - Data manager facade with bundled-dataset fallback
//! - Migration tool between the bundled dataset and the store
//! - Unified error types
//! - Configuration structures

pub mod adapter;
pub mod bundled;
pub mod cache;
pub mod codegen;
pub mod config;
pub mod error;
pub mod kv;
pub mod manager;
pub mod migration;
pub mod models;
pub mod services;
pub mod validation;

pub use adapter::{AdapterOptions, KvAdapter, SetOptions};
pub use bundled::BundledDataset;
pub use cache::{CacheManager, CacheStats};
pub use codegen::StaticFormat;
pub use config::{AppConfig, CacheStrategy, ConfigError};
pub use error::{Error, Result};
pub use kv::{KvError, KvNamespace, MemoryKv};
pub use manager::{CacheScope, DataManager};
pub use migration::{ExportSnapshot, MigrationReport, MigrationState, MigrationStatus, Migrator};
pub use models::{Category, CategoryPatch, DataSource, DataSourceInfo, Metadata, Site, SitePatch, VersionRecord};
pub use services::Services;
