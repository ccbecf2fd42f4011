// src/cli.rs
//! CLI definitions for formulary
//!
//! Command implementations live in the `commands` module.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "formulary")]
#[command(author = "Formulary Contributors")]
#[command(version)]
#[command(about = "Build and install command-line tools from pinned formulas", long_about = None)]
pub struct Cli {
    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: ~/.config/formulary/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Additional directory of formula files (repeatable)
    #[arg(long = "formula-dir", global = true, value_name = "DIR")]
    pub formula_dirs: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch, verify, build and install one or more tools
    Install {
        /// Formula name or path to a formula file
        #[arg(required = true)]
        formulas: Vec<String>,

        /// Build the latest commit of the head branch instead of the release
        #[arg(long)]
        head: bool,

        /// Install prefix (default: ~/.local)
        #[arg(long, value_name = "DIR")]
        prefix: Option<PathBuf>,

        /// Keep the scratch directory for inspection
        #[arg(long)]
        keep_scratch: bool,

        /// Don't check build dependencies on PATH
        #[arg(long)]
        skip_dependency_check: bool,
    },

    /// Download and verify a release archive without building
    Fetch {
        /// Formula name or path to a formula file
        formula: String,

        /// Directory to place the archive in
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Print the digest of a local file, for pinning a formula
    Digest {
        /// File to hash
        file: PathBuf,

        /// Hash algorithm (sha256 or sha512)
        #[arg(short, long, default_value = "sha256")]
        algorithm: String,
    },

    /// Show a formula
    Info {
        /// Formula name or path to a formula file
        formula: String,
    },

    /// List known formulas
    List,

    /// Validate a formula file
    Check {
        /// Path to the formula file
        path: PathBuf,
    },

    /// Generate shell completions for formulary itself
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
