//! marknav CLI
//!
//! Moves bookmark data between the bundled dataset and the remote store.
//! Results go to stdout as JSON; logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use marknav_client::CloudflareKv;
use marknav_core::{AppConfig, BundledDataset, KvNamespace, Migrator, Services, StaticFormat};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load()?;
    let needs_store = matches!(cli.command, Commands::Migrate { .. } | Commands::Export { .. });
    let store: Option<Arc<dyn KvNamespace>> = if needs_store {
        Some(Arc::new(CloudflareKv::new(config.require_kv()?)?))
    } else {
        match &config.kv {
            Some(kv) => Some(Arc::new(CloudflareKv::new(kv)?)),
            None => None,
        }
    };
    let services = Services::build(&config, store).await?;

    match cli.command {
        Commands::Migrate { from } => {
            let dataset = match from {
                Some(path) => BundledDataset::load(&path).with_context(|| format!("loading {}", path.display()))?,
                None => (*services.bundled).clone(),
            };
            let migrator = Migrator::new(services.adapter.clone(), services.data.clone(), services.bundled.clone())
                .with_listener(Arc::new(|progress: u8, message: &str| {
                    eprintln!("[{progress:>3}%] {message}");
                }));

            let report = migrator.migrate_dataset(&dataset).await?;
            print_json(&report)?;
        }
        Commands::Export { format, out } => {
            let snapshot = services.migrator.export_from_kv().await?;
            let code = services.migrator.generate_static_file_code(&snapshot, StaticFormat::from(format))?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, code)
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!(path = %path.display(), sites = snapshot.sites.len(), "export written");
                }
                None => print!("{code}"),
            }
        }
        Commands::Status => {
            let version = services.adapter.get_version().await?;
            let compatible = services.adapter.check_version_compatibility().await?;
            let metadata = services.data.get_metadata().await;
            print_json(&serde_json::json!({
                "version": version,
                "compatible": compatible,
                "metadata": metadata,
            }))?;
        }
        Commands::Info => {
            services.data.initialize().await;
            print_json(&serde_json::json!({
                "dataSource": services.data.get_data_source_info(),
                "cache": services.cache.stats().await,
            }))?;
        }
        Commands::Search { query, category } => {
            let sites: Vec<_> = services
                .data
                .search_sites(&query, true)
                .await
                .into_iter()
                .filter(|site| category.as_deref().is_none_or(|c| site.category == c))
                .collect();
            print_json(&sites)?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
