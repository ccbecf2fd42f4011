// src/commands.rs
//! Command handlers for the formulary CLI

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::Shell;
use formulary::{
    BuildMode, FormulaRecord, FormulaRepository, FormularyConfig, HashAlgorithm, InstallReport,
    Kitchen, hash_file, parse_formula_file, validate_formula,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::cli::Cli;

/// Options shared by every command
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub formula_dirs: Vec<PathBuf>,
}

impl GlobalOptions {
    fn load_config(&self) -> Result<FormularyConfig> {
        match &self.config {
            Some(path) => FormularyConfig::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display())),
            None => FormularyConfig::load_default().context("Failed to load default config"),
        }
    }

    /// Built-in formulas plus configured and command-line directories
    fn repository(&self, config: &FormularyConfig) -> Result<FormulaRepository> {
        let mut repo = FormulaRepository::builtin().context("Built-in formulas are invalid")?;
        for dir in config.paths.formula_dirs.iter().chain(&self.formula_dirs) {
            let count = repo
                .extend_from_dir(dir)
                .with_context(|| format!("Failed to load formulas from {}", dir.display()))?;
            info!("Loaded {} formula(s) from {}", count, dir.display());
        }
        Ok(repo)
    }
}

/// Install one or more tools
pub fn cmd_install(
    globals: &GlobalOptions,
    references: &[String],
    head: bool,
    prefix: Option<&Path>,
    keep_scratch: bool,
    skip_dependency_check: bool,
) -> Result<()> {
    let config = globals.load_config()?;
    let repo = globals.repository(&config)?;
    let formulas = references
        .iter()
        .map(|r| repo.resolve(r).with_context(|| format!("Unknown formula: {r}")))
        .collect::<Result<Vec<_>>>()?;

    let mut kitchen_config = config.kitchen_config()?;
    kitchen_config.keep_scratch |= keep_scratch;
    kitchen_config.check_dependencies &= !skip_dependency_check;
    kitchen_config.show_progress = std::io::stderr().is_terminal();

    let layout = config.layout(prefix)?;
    let kitchen = Kitchen::new(kitchen_config).context("Failed to set up the build kitchen")?;
    let mode = if head { BuildMode::Head } else { BuildMode::Release };

    let token = kitchen.cancel_token();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, cleaning up...");
        token.cancel();
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    if let [formula] = formulas.as_slice() {
        let report = kitchen
            .install(formula, mode, &layout)
            .with_context(|| format!("Failed to install {}", formula.name()))?;
        print_report(&report);
        return Ok(());
    }

    let results = kitchen.install_batch(&formulas, mode, &layout)?;
    let mut failed = Vec::new();
    for (name, result) in results {
        match result {
            Ok(report) => print_report(&report),
            Err(e) => {
                eprintln!("[FAILED] {}: {}", name, e);
                failed.push(name);
            }
        }
    }
    if !failed.is_empty() {
        anyhow::bail!("{} of {} install(s) failed: {}", failed.len(), formulas.len(), failed.join(", "));
    }
    Ok(())
}

fn print_report(report: &InstallReport) {
    println!(
        "[COMPLETE] {} {} ({}) -> {}",
        report.name,
        report.version,
        report.mode,
        report.binary_path.display()
    );
    if let Some(digest) = &report.digest {
        println!("  source: {}", digest.to_prefixed_string());
    }
    for (shell, path) in &report.completions {
        println!("  {} completion: {}", shell, path.display());
    }
    println!("  smoke tests: {} passed", report.smoke_results.len());
    if !report.runtime_dependencies.is_empty() {
        println!(
            "  runtime dependencies (not checked): {}",
            report.runtime_dependencies.join(", ")
        );
    }
    if let Some(scratch) = &report.scratch_dir {
        println!("  scratch kept at {}", scratch.display());
    }
}

/// Download and verify a release archive
pub fn cmd_fetch(globals: &GlobalOptions, reference: &str, output: &Path) -> Result<()> {
    let config = globals.load_config()?;
    let repo = globals.repository(&config)?;
    let formula = repo
        .resolve(reference)
        .with_context(|| format!("Unknown formula: {reference}"))?;

    let mut kitchen_config = config.kitchen_config()?;
    kitchen_config.show_progress = std::io::stderr().is_terminal();
    let kitchen = Kitchen::new(kitchen_config)?;

    let (path, digest) = kitchen
        .fetch(&formula, output)
        .with_context(|| format!("Failed to fetch {}", formula.name()))?;
    println!("[OK] {} ({})", path.display(), digest.to_prefixed_string());
    Ok(())
}

/// Print a file digest in formula checksum form
pub fn cmd_digest(file: &Path, algorithm: &str) -> Result<()> {
    let algorithm: HashAlgorithm = algorithm.parse()?;
    let hash = hash_file(algorithm, file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    println!("{}  {}", hash.to_prefixed_string(), file.display());
    Ok(())
}

/// Show a formula
pub fn cmd_info(globals: &GlobalOptions, reference: &str) -> Result<()> {
    let config = globals.load_config()?;
    let repo = globals.repository(&config)?;
    let formula = repo
        .resolve(reference)
        .with_context(|| format!("Unknown formula: {reference}"))?;
    print_formula(&formula);
    Ok(())
}

fn print_formula(formula: &FormulaRecord) {
    println!(
        "{} {}",
        formula.name(),
        formula.version().unwrap_or_else(|| "(unversioned)".to_string())
    );
    if let Some(desc) = &formula.formula.description {
        println!("  {}", desc);
    }
    if let Some(homepage) = &formula.formula.homepage {
        println!("  homepage: {}", homepage);
    }
    if let Some(license) = &formula.formula.license {
        println!("  license: {}", license);
    }
    println!("  source: {}", formula.source.url);
    if let Some(checksum) = &formula.source.checksum {
        println!("  checksum: {}", checksum);
    }
    if let Some(head) = &formula.head {
        println!("  head: {} ({})", head.url, head.branch);
    }
    for dep in &formula.dependencies {
        println!("  depends on: {} ({})", dep.name, dep.stage);
    }
    println!("  build: {}", formula.build.command.join(" "));
    let shells: Vec<_> = formula.completions.iter().map(|c| c.shell.as_str()).collect();
    if !shells.is_empty() {
        println!("  completions: {}", shells.join(", "));
    }
    println!("  smoke tests: {}", formula.smoke_tests.len());
}

/// List known formulas
pub fn cmd_list(globals: &GlobalOptions) -> Result<()> {
    let config = globals.load_config()?;
    let repo = globals.repository(&config)?;
    for formula in repo.iter() {
        println!(
            "{:<24} {:<12} {}",
            formula.name(),
            formula.version().unwrap_or_default(),
            formula.formula.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Validate a formula file
pub fn cmd_check(path: &Path) -> Result<()> {
    println!("Reading formula: {}", path.display());
    let formula = parse_formula_file(path)
        .with_context(|| format!("Failed to parse formula: {}", path.display()))?;
    let warnings = validate_formula(&formula).context("Formula validation failed")?;

    for warning in &warnings {
        println!("Warning: {}", warning);
    }
    if warnings.is_empty() {
        println!("[OK] No issues found");
    } else {
        println!("[OK] {} warning(s)", warnings.len());
    }
    Ok(())
}

/// Print formulary's own completion script
pub fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "formulary", &mut std::io::stdout());
    Ok(())
}
