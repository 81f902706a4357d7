//! Command-line arguments.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use docketeer_core::Config;

/// Config file picked up from the working directory when none is named.
pub const DEFAULT_CONFIG_FILE: &str = "docketeer.toml";

#[derive(Debug, Parser)]
#[command(name = "docketeer")]
#[command(version, about = "Incremental regulatory document acquisition with a provenance ledger")]
pub struct Cli {
    #[command(flatten)]
    pub paths: PathArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Location overrides shared by every subcommand.
#[derive(Debug, Args)]
pub struct PathArgs {
    /// TOML configuration file.
    #[arg(long, global = true, env = "DOCKETEER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for the ledger and run artifacts.
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Directory where documents are stored.
    #[arg(long, global = true)]
    pub download_dir: Option<PathBuf>,

    /// Ledger database file.
    #[arg(long, global = true)]
    pub ledger_path: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Backfill local files, then discover and download new documents
    Run {
        /// Stop after this many new downloads
        #[arg(long)]
        limit: Option<u32>,

        /// Do not run the extraction step
        #[arg(long)]
        skip_extraction: bool,
    },

    /// Seed the ledger from a legacy metadata CSV
    ImportLegacy {
        /// CSV to import (default: facility_information_metadata.csv in the
        /// download directory)
        csv: Option<PathBuf>,
    },

    /// Recompute checksums of every recorded document
    Verify,

    /// Show ledger counts and the latest run
    Status,
}

impl PathArgs {
    /// The config file to load: `--config`/`DOCKETEER_CONFIG`, else
    /// `docketeer.toml` in `cwd` when present.
    pub fn config_file(&self, cwd: &Path) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }
        let default = cwd.join(DEFAULT_CONFIG_FILE);
        default.is_file().then_some(default)
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.paths.output_dir = dir.clone();
        }
        if let Some(dir) = &self.download_dir {
            config.paths.download_dir = dir.clone();
        }
        if let Some(path) = &self.ledger_path {
            config.paths.ledger_path = Some(path.clone());
        }
    }
}
