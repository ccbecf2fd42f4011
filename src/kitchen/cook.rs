// src/kitchen/cook.rs

//! Cook: one install run for a single formula

use crate::error::{Error, InstallError, Result};
use crate::formula::{BuildMode, FormulaRecord, ResolvedSource, ShellKind, validate_formula};
use crate::hash::Hash;
use crate::layout::InstallLayout;
use crate::runner::{CommandOutput, ExitState};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::archive::extract_archive;
use super::build::BuildPlan;
use super::config::InstallReport;
use super::fetch::checkout_head;
use super::install::{generate_completions, place_binary};
use super::smoke::{SmokeResult, run_smoke_tests};
use super::state::{PipelineState, Stage};
use super::verify::verify_archive;
use super::Kitchen;

/// A single install run
///
/// Owns the scratch directory. Dropping a `Cook` removes it, which is what
/// cleans up after a failed or cancelled run.
pub struct Cook<'a> {
    kitchen: &'a Kitchen,
    formula: &'a FormulaRecord,
    layout: &'a InstallLayout,
    source: ResolvedSource,
    scratch: TempDir,
    state: PipelineState,
    history: Vec<PipelineState>,
    log: String,
    /// Version string embedded into the binary
    version: String,
    archive: Option<PathBuf>,
    digest: Option<Hash>,
    source_dir: Option<PathBuf>,
    artifact: Option<PathBuf>,
    binary: Option<PathBuf>,
    completions: Vec<(ShellKind, PathBuf)>,
    smoke_results: Vec<SmokeResult>,
}

impl<'a> Cook<'a> {
    pub(super) fn new(
        kitchen: &'a Kitchen,
        formula: &'a FormulaRecord,
        mode: BuildMode,
        layout: &'a InstallLayout,
    ) -> Result<Self> {
        for warning in validate_formula(formula)? {
            debug!("{}: {}", formula.name(), warning);
        }
        let source = formula.resolve_source(mode)?;
        let version = match &source {
            ResolvedSource::Release { version, .. } => version.clone(),
            // Filled in from the checkout
            ResolvedSource::Head { .. } => String::new(),
        };

        let prefix = format!("formulary-{}-", formula.name());
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let scratch = match &kitchen.config.scratch_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!("Scratch directory: {}", scratch.path().display());

        Ok(Self {
            kitchen,
            formula,
            layout,
            source,
            scratch,
            state: PipelineState::Pending,
            history: vec![PipelineState::Pending],
            log: String::new(),
            version,
            archive: None,
            digest: None,
            source_dir: None,
            artifact: None,
            binary: None,
            completions: Vec::new(),
            smoke_results: Vec::new(),
        })
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Run one stage, recording the transition it causes
    ///
    /// Cancellation is checked before the stage starts and again if it
    /// fails, since an interrupted subprocess surfaces as an ordinary error.
    pub(super) fn run_stage(
        &mut self,
        stage: Stage,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        debug_assert_eq!(self.state.next_stage(), Some(stage));

        let outcome = if self.kitchen.cancel.is_cancelled() {
            Err(Error::Cancelled { stage })
        } else {
            info!("{}: {} stage", self.formula.name(), stage);
            body(self)
        };

        match outcome {
            Ok(()) => {
                self.transition(stage.completed_state());
                Ok(())
            }
            Err(e) => {
                let e = if self.kitchen.cancel.is_cancelled() {
                    Error::Cancelled { stage }
                } else {
                    e
                };
                self.transition(PipelineState::Failed {
                    stage,
                    cause: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: PipelineState) {
        match &next {
            PipelineState::Failed { .. } => warn!("{}: {} -> {}", self.formula.name(), self.state, next),
            _ => info!("{}: {} -> {}", self.formula.name(), self.state, next),
        }
        self.log_line(&format!("state: {next}"));
        self.history.push(next.clone());
        self.state = next;
    }

    /// Fetch stage: download the release archive or clone the head branch
    pub(super) fn prep(&mut self) -> Result<()> {
        match self.source.clone() {
            ResolvedSource::Release { url, .. } => {
                let path = self
                    .kitchen
                    .fetcher
                    .fetch_archive(&url, &self.scratch.path().join("download"))?;
                self.log_line(&format!("Fetched source: {url}"));
                self.archive = Some(path);
            }
            ResolvedSource::Head { url, branch } => {
                let dest = self.scratch.path().join("src").join(self.formula.name());
                let checkout = checkout_head(
                    self.kitchen.runner.as_ref(),
                    &self.kitchen.config,
                    &url,
                    &branch,
                    &dest,
                )?;
                self.version = format!("HEAD-{}", checkout.revision);
                self.log_line(&format!("Checked out {url} ({branch}) at {}", checkout.revision));
                self.source_dir = Some(checkout.path);
            }
        }
        Ok(())
    }

    /// Verify stage: compare the archive digest with the pinned one
    ///
    /// Head checkouts have no pinned digest and pass through.
    pub(super) fn verify(&mut self) -> Result<()> {
        match (&self.source, &self.archive) {
            (ResolvedSource::Release { url, digest, .. }, Some(archive)) => {
                let actual = verify_archive(url, archive, digest)?;
                self.log_line(&format!("Verified {}", actual.to_prefixed_string()));
                self.digest = Some(actual);
            }
            (ResolvedSource::Release { url, .. }, None) => {
                return Err(Error::fetch(url.as_str(), "no archive was fetched"));
            }
            (ResolvedSource::Head { .. }, _) => {
                debug!("Head build, skipping integrity check");
                self.log_line("Integrity check skipped (head)");
            }
        }
        Ok(())
    }

    /// Build stage, part 1: extract the verified archive
    pub(super) fn unpack(&mut self) -> Result<()> {
        if let Some(archive) = &self.archive {
            let root = extract_archive(archive, &self.scratch.path().join("src"))?;
            self.log_line(&format!("Extracted source to {}", root.display()));
            self.source_dir = Some(root);
        }
        Ok(())
    }

    /// Build stage, part 2: make sure build tools are on PATH
    pub(super) fn check_dependencies(&mut self) -> Result<()> {
        if !self.kitchen.config.check_dependencies {
            return Ok(());
        }
        let deps: Vec<&str> = self
            .formula
            .build_dependencies()
            .map(|d| d.name.as_str())
            .collect();
        if deps.is_empty() {
            return Ok(());
        }

        let missing = self.kitchen.probe.check_missing(&deps)?;
        if !missing.is_empty() {
            return Err(Error::MissingDependencies(missing));
        }
        debug!("Build dependencies present: {}", deps.join(", "));
        Ok(())
    }

    /// Build stage, part 3: simmer, i.e. run the build command
    pub(super) fn simmer(&mut self) -> Result<()> {
        let source_dir = self.source_dir.clone().ok_or_else(|| Error::Build {
            command: self.formula.build.command.join(" "),
            status: ExitState::Exited(0),
            stderr: "no source tree to build".to_string(),
        })?;

        let out_dir = self.scratch.path().join("out");
        fs::create_dir_all(&out_dir)?;

        let plan = BuildPlan::new(
            self.formula,
            &source_dir,
            &out_dir.join(self.formula.name()),
            &self.version,
            self.kitchen.config.build_timeout,
        )?;
        info!("Building {} {}", self.formula.name(), self.version);
        debug!("Command: {}", plan.command.display());

        let output = self.kitchen.runner.run(&plan.command)?;
        self.log_build_output("build", &output);
        let artifact = plan.finish(&output)?;
        self.artifact = Some(artifact);
        Ok(())
    }

    /// Install stage: place the binary, then derive completions from it
    pub(super) fn plate(&mut self) -> Result<()> {
        let artifact = self.artifact.clone().ok_or_else(|| {
            Error::from(InstallError::Placement {
                path: self.layout.binary_path(self.formula.name()),
                reason: "nothing was built".to_string(),
            })
        })?;

        let binary = place_binary(&artifact, self.layout, self.formula.name())?;
        self.log_line(&format!("Installed {}", binary.display()));
        self.binary = Some(binary.clone());

        let written = generate_completions(
            self.kitchen.runner.as_ref(),
            &binary,
            self.formula.name(),
            &self.formula.completions,
            self.layout,
            self.kitchen.config.command_timeout,
        )?;
        for (shell, path) in &written {
            self.log_line(&format!("Wrote {shell} completion: {}", path.display()));
        }
        self.completions = written;
        Ok(())
    }

    /// Post-verify stage: taste, i.e. run the smoke tests
    pub(super) fn taste(&mut self) -> Result<()> {
        let binary = self
            .binary
            .clone()
            .unwrap_or_else(|| self.layout.binary_path(self.formula.name()));
        let results = run_smoke_tests(
            self.kitchen.runner.as_ref(),
            &binary,
            &self.formula.smoke_tests,
            self.kitchen.config.command_timeout,
        )?;
        self.log_line(&format!("{} smoke test(s) passed", results.len()));
        self.smoke_results = results;
        Ok(())
    }

    /// Mark the run done and build the report
    pub(super) fn serve(mut self) -> InstallReport {
        self.transition(PipelineState::Done);

        let scratch_dir = if self.kitchen.config.keep_scratch {
            let path = self.scratch.keep();
            info!("Keeping scratch directory {}", path.display());
            Some(path)
        } else {
            None
        };

        InstallReport {
            name: self.formula.name().to_string(),
            version: self.version,
            mode: self.source.mode(),
            digest: self.digest,
            binary_path: self
                .binary
                .unwrap_or_else(|| self.layout.binary_path(self.formula.name())),
            completions: self.completions,
            smoke_results: self.smoke_results,
            runtime_dependencies: self
                .formula
                .runtime_dependencies()
                .map(|d| d.name.clone())
                .collect(),
            history: self.history,
            log: self.log,
            scratch_dir,
        }
    }

    /// Give up the scratch directory instead of deleting it
    pub(super) fn abandon(self) {
        if self.kitchen.config.keep_scratch {
            let path = self.scratch.keep();
            info!("Keeping scratch directory {} after failure", path.display());
        }
    }

    fn log_line(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
    }

    /// Log command output with a phase header
    fn log_build_output(&mut self, phase: &str, output: &CommandOutput) {
        self.log_line(&format!("=== {} ({}) ===", phase, output.status));
        let stdout = output.stdout_lossy();
        let stderr = output.stderr_lossy();
        if !stdout.is_empty() {
            self.log.push_str(&stdout);
            self.log.push('\n');
        }
        if !stderr.is_empty() {
            self.log.push_str(&stderr);
            self.log.push('\n');
        }
    }
}
