use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use marknav_core::StaticFormat;

#[derive(Parser, Debug)]
#[command(name = "marknav")]
#[command(about = "Migrate, export and inspect marknav bookmark data", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy a dataset into the remote store
    Migrate {
        /// Dataset JSON to migrate instead of the configured bundle
        #[arg(long)]
        from: Option<PathBuf>,
    },
    /// Export the remote store as a static data file
    Export {
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show the stored schema version and collection counts
    Status,
    /// Show the active data source and cache statistics
    Info,
    /// Search sites
    Search {
        query: String,

        /// Restrict to one category id
        #[arg(short, long)]
        category: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Js,
}

impl From<ExportFormat> for StaticFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Json => StaticFormat::Json,
            ExportFormat::Js => StaticFormat::JsModule,
        }
    }
}
