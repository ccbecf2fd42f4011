// src/main.rs

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::GlobalOptions;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise -v/-q pick the level
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let globals = GlobalOptions {
        config: cli.config,
        formula_dirs: cli.formula_dirs,
    };

    match cli.command {
        Commands::Install {
            formulas,
            head,
            prefix,
            keep_scratch,
            skip_dependency_check,
        } => commands::cmd_install(
            &globals,
            &formulas,
            head,
            prefix.as_deref(),
            keep_scratch,
            skip_dependency_check,
        ),
        Commands::Fetch { formula, output } => commands::cmd_fetch(&globals, &formula, &output),
        Commands::Digest { file, algorithm } => commands::cmd_digest(&file, &algorithm),
        Commands::Info { formula } => commands::cmd_info(&globals, &formula),
        Commands::List => commands::cmd_list(&globals),
        Commands::Check { path } => commands::cmd_check(&path),
        Commands::Completions { shell } => commands::cmd_completions(shell),
    }
}
