// src/kitchen/mod.rs

//! Kitchen: runs formulas through the install pipeline
//!
//! A run moves through five stages in a fixed order:
//! - Fetch the release archive (or clone the head branch)
//! - Verify the archive against its pinned digest
//! - Build the binary with the formula's single build command
//! - Install the binary atomically and derive completion scripts from it
//! - Post-verify the installed binary with the formula's smoke tests
//!
//! Any failure stops the run in a terminal `Failed` state and removes the
//! scratch directory. Nothing is retried.

mod archive;
mod build;
mod config;
mod cook;
pub mod deps;
mod fetch;
mod install;
mod smoke;
mod state;
mod verify;

pub use archive::extract_archive;
pub use build::{BuildPlan, LdFlags};
pub use config::{InstallReport, KitchenConfig};
pub use cook::Cook;
pub use deps::{DependencyProbe, NoopProbe, PathProbe};
pub use fetch::{ArchiveFetcher, Checkout, checkout_head};
pub use install::{generate_completions, place_binary};
pub use smoke::{SmokeResult, run_smoke_tests};
pub use state::{PipelineState, Stage};
pub use verify::verify_archive;

use crate::error::{Error, Result};
use crate::formula::{BuildMode, FormulaRecord, ResolvedSource, validate_formula};
use crate::hash::Hash;
use crate::layout::InstallLayout;
use crate::runner::{CancelToken, CommandRunner, SystemRunner};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// The Kitchen: where formulas are cooked into installed tools
pub struct Kitchen {
    pub(crate) config: KitchenConfig,
    runner: Arc<dyn CommandRunner>,
    probe: Arc<dyn DependencyProbe>,
    fetcher: ArchiveFetcher,
    cancel: CancelToken,
}

impl Kitchen {
    /// Create a Kitchen that runs real subprocesses
    pub fn new(config: KitchenConfig) -> Result<Self> {
        let cancel = CancelToken::new();
        let runner = Arc::new(SystemRunner::with_cancel(cancel.clone()));
        Self::with_runner(config, runner, cancel)
    }

    /// Create a Kitchen with a custom command runner
    ///
    /// `cancel` should be the token the runner watches, so that cancelling
    /// the Kitchen also interrupts a running subprocess.
    pub fn with_runner(
        config: KitchenConfig,
        runner: Arc<dyn CommandRunner>,
        cancel: CancelToken,
    ) -> Result<Self> {
        let fetcher = ArchiveFetcher::new(&config, cancel.clone())?;
        Ok(Self {
            config,
            runner,
            probe: Arc::new(PathProbe::new()),
            fetcher,
            cancel,
        })
    }

    /// Create a Kitchen with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(KitchenConfig::default())
    }

    /// Set the build dependency probe
    pub fn set_probe(&mut self, probe: Arc<dyn DependencyProbe>) {
        self.probe = probe;
    }

    pub fn config(&self) -> &KitchenConfig {
        &self.config
    }

    /// Token that interrupts every run on this Kitchen
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the full pipeline for one formula
    ///
    /// On success the binary is at its final path, every completion script is
    /// written and every smoke test passed. On failure the error names the
    /// stage that broke; a failure before the Install stage leaves the
    /// destination untouched.
    pub fn install(
        &self,
        formula: &FormulaRecord,
        mode: BuildMode,
        layout: &InstallLayout,
    ) -> Result<InstallReport> {
        info!("Installing {} ({} build)", formula.name(), mode);

        let mut cook = Cook::new(self, formula, mode, layout)?;
        let outcome = (|| {
            cook.run_stage(Stage::Fetch, Cook::prep)?;
            cook.run_stage(Stage::Verify, Cook::verify)?;
            cook.run_stage(Stage::Build, |cook| {
                cook.unpack()?;
                cook.check_dependencies()?;
                cook.simmer()
            })?;
            cook.run_stage(Stage::Install, Cook::plate)?;
            cook.run_stage(Stage::PostVerify, Cook::taste)
        })();

        match outcome {
            Ok(()) => {
                let report = cook.serve();
                info!(
                    "Installed {} {} to {}",
                    report.name,
                    report.version,
                    report.binary_path.display()
                );
                Ok(report)
            }
            Err(e) => {
                cook.abandon();
                Err(e)
            }
        }
    }

    /// Fetch and verify a release archive into `dest_dir` without building
    ///
    /// The archive only appears in `dest_dir` once its digest checks out.
    pub fn fetch(&self, formula: &FormulaRecord, dest_dir: &Path) -> Result<(PathBuf, Hash)> {
        validate_formula(formula)?;
        let (url, digest) = match formula.resolve_source(BuildMode::Release)? {
            ResolvedSource::Release { url, digest, .. } => (url, digest),
            ResolvedSource::Head { .. } => {
                return Err(Error::Formula(format!(
                    "{}: only release sources can be fetched",
                    formula.name()
                )));
            }
        };

        fs::create_dir_all(dest_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(".formulary-fetch-")
            .tempdir_in(dest_dir)?;

        let fetched = self.fetcher.fetch_archive(&url, staging.path())?;
        let actual = verify_archive(&url, &fetched, &digest)?;

        let file_name = fetched
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "source.tar.gz".into());
        let dest = dest_dir.join(file_name);
        fs::rename(&fetched, &dest)?;

        info!("Fetched {} ({})", dest.display(), actual.to_prefixed_string());
        Ok((dest, actual))
    }

    /// Install several formulas concurrently
    ///
    /// Each run is independent with its own scratch directory. Names must be
    /// unique so no two runs write the same destination paths. Results come
    /// back in input order.
    pub fn install_batch(
        &self,
        formulas: &[FormulaRecord],
        mode: BuildMode,
        layout: &InstallLayout,
    ) -> Result<Vec<(String, Result<InstallReport>)>> {
        let mut seen = HashSet::new();
        for formula in formulas {
            if !seen.insert(formula.name()) {
                return Err(Error::Formula(format!(
                    "{} appears more than once in the batch",
                    formula.name()
                )));
            }
        }

        info!("Installing {} formula(s)", formulas.len());
        Ok(formulas
            .par_iter()
            .map(|formula| {
                (
                    formula.name().to_string(),
                    self.install(formula, mode, layout),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InstallError, VerificationError};
    use crate::formula::{CompletionEntry, ShellKind, parse_formula};
    use crate::hash::{HashAlgorithm, hash_bytes};
    use crate::runner::fake::{FnRunner, failed, ok};
    use crate::runner::{CommandOutput, CommandSpec};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        archive_url: String,
        digest: String,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut builder = tar::Builder::new(Vec::new());
            let content = b"package main\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "gwt-1.0.0/main.go", &content[..])
                .unwrap();
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&builder.into_inner().unwrap()).unwrap();
            let bytes = encoder.finish().unwrap();

            let archive = dir.path().join("v1.0.0.tar.gz");
            fs::write(&archive, &bytes).unwrap();
            Self {
                archive_url: url::Url::from_file_path(&archive).unwrap().to_string(),
                digest: hash_bytes(HashAlgorithm::Sha256, &bytes).to_prefixed_string(),
                dir,
            }
        }

        fn formula_with_digest(&self, digest: &str) -> FormulaRecord {
            parse_formula(&format!(
                r#"
completions = ["bash", "zsh", "fish"]

[formula]
name = "gwt"

[source]
url = "{}"
checksum = "{}"

[head]
url = "https://github.com/TinsFox/gwt.git"

[[dependencies]]
name = "go"
stage = "build"

[[dependencies]]
name = "git"

[[test]]
args = ["--version"]
expect = "gwt version"

[[test]]
args = ["--help"]
expect = "Git Worktree CLI"
"#,
                self.archive_url, digest
            ))
            .unwrap()
        }

        fn formula(&self) -> FormulaRecord {
            self.formula_with_digest(&self.digest)
        }

        fn layout(&self) -> InstallLayout {
            InstallLayout::under(self.dir.path().join("prefix"))
        }

        fn scratch_root(&self) -> PathBuf {
            self.dir.path().join("scratch")
        }

        fn kitchen(&self, runner: Arc<FnRunner>) -> Kitchen {
            let config = KitchenConfig::default().with_scratch_root(self.scratch_root());
            let mut kitchen = Kitchen::with_runner(config, runner, CancelToken::new()).unwrap();
            kitchen.set_probe(Arc::new(NoopProbe));
            kitchen
        }

        fn scratch_is_clean(&self) -> bool {
            fs::read_dir(self.scratch_root())
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(true)
        }
    }

    /// Behaves like `go build` followed by a well-behaved gwt binary
    fn toolchain(spec: &CommandSpec) -> crate::error::Result<CommandOutput> {
        let program = spec.program.to_string_lossy();
        if program == "go" {
            let output = spec
                .args
                .iter()
                .position(|a| a == "-o")
                .map(|i| PathBuf::from(&spec.args[i + 1]))
                .unwrap();
            let ldflags = spec
                .args
                .iter()
                .position(|a| a == "-ldflags")
                .map(|i| spec.args[i + 1].clone())
                .unwrap_or_default();
            fs::write(&output, format!("binary built with {ldflags}")).unwrap();
            return Ok(ok(""));
        }
        if program == "git" {
            if spec.args[0] == "clone" {
                fs::create_dir_all(spec.args.last().unwrap()).unwrap();
                return Ok(ok(""));
            }
            return Ok(ok("abc1234\n"));
        }
        Ok(match spec.args.first().map(String::as_str) {
            Some("completion") => ok(&format!("# {} completion for gwt\n", spec.args[1])),
            Some("--version") => ok("gwt version 1.0.0\n"),
            Some("--help") => ok("Git Worktree CLI\n"),
            _ => failed(1, "unknown command"),
        })
    }

    #[test]
    fn test_install_release_end_to_end() {
        let fixture = Fixture::new();
        let runner = Arc::new(FnRunner::new(toolchain));
        let kitchen = fixture.kitchen(runner.clone());
        let layout = fixture.layout();

        let report = kitchen
            .install(&fixture.formula(), BuildMode::Release, &layout)
            .unwrap();

        assert_eq!(report.version, "1.0.0");
        assert_eq!(report.mode, BuildMode::Release);
        assert_eq!(
            report.digest.as_ref().map(Hash::to_prefixed_string),
            Some(fixture.digest.clone())
        );
        assert_eq!(
            report.history,
            vec![
                PipelineState::Pending,
                PipelineState::Fetched,
                PipelineState::Verified,
                PipelineState::Built,
                PipelineState::Installed,
                PipelineState::PostVerified,
                PipelineState::Done,
            ]
        );
        assert_eq!(
            fs::read_to_string(&report.binary_path).unwrap(),
            "binary built with -s -w -X main.Version=1.0.0"
        );
        assert_eq!(report.completions.len(), 3);
        for (_, path) in &report.completions {
            assert!(!fs::read(path).unwrap().is_empty());
        }
        assert_eq!(report.smoke_results.len(), 2);
        assert_eq!(report.runtime_dependencies, vec!["git"]);
        assert!(report.scratch_dir.is_none());
        assert!(fixture.scratch_is_clean());

        // The build ran inside the extracted source root
        let build = runner
            .calls()
            .into_iter()
            .find(|c| c.program == Path::new("go"))
            .unwrap();
        assert!(build.cwd.unwrap().ends_with("gwt-1.0.0"));
    }

    #[test]
    fn test_digest_mismatch_stops_before_build() {
        let fixture = Fixture::new();
        let runner = Arc::new(FnRunner::new(toolchain));
        let kitchen = fixture.kitchen(runner.clone());
        let layout = fixture.layout();
        let wrong = format!("sha256:{}", "0".repeat(64));

        let err = kitchen
            .install(&fixture.formula_with_digest(&wrong), BuildMode::Release, &layout)
            .unwrap_err();

        assert!(matches!(err, Error::Integrity { .. }));
        assert_eq!(err.stage(), Some(Stage::Verify));
        assert!(runner.calls().is_empty());
        assert!(!layout.prefix.exists());
        assert!(fixture.scratch_is_clean());
    }

    #[test]
    fn test_build_failure_installs_nothing() {
        let fixture = Fixture::new();
        let runner = Arc::new(FnRunner::new(|spec| {
            if spec.program == Path::new("go") {
                Ok(failed(1, "main.go:1: syntax error"))
            } else {
                toolchain(spec)
            }
        }));
        let layout = fixture.layout();

        let err = fixture
            .kitchen(runner)
            .install(&fixture.formula(), BuildMode::Release, &layout)
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Build));
        assert!(err.to_string().contains("syntax error"));
        assert!(!layout.binary_path("gwt").exists());
        assert!(!layout.bash_completion_dir.exists());
        assert!(fixture.scratch_is_clean());
    }

    #[test]
    fn test_missing_build_dependency() {
        let fixture = Fixture::new();
        let runner = Arc::new(FnRunner::new(toolchain));
        let mut kitchen = fixture.kitchen(runner.clone());
        let empty = tempfile::tempdir().unwrap();
        kitchen.set_probe(Arc::new(PathProbe::with_search_path(&[empty.path().to_path_buf()])));

        let err = kitchen
            .install(&fixture.formula(), BuildMode::Release, &fixture.layout())
            .unwrap_err();
        match err {
            Error::MissingDependencies(missing) => assert_eq!(missing, vec!["go"]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_head_build_embeds_revision() {
        let fixture = Fixture::new();
        let runner = Arc::new(FnRunner::new(toolchain));
        let kitchen = fixture.kitchen(runner.clone());

        let report = kitchen
            .install(&fixture.formula(), BuildMode::Head, &fixture.layout())
            .unwrap();

        assert_eq!(report.version, "HEAD-abc1234");
        assert_eq!(report.mode, BuildMode::Head);
        assert!(report.digest.is_none());
        assert_eq!(
            fs::read_to_string(&report.binary_path).unwrap(),
            "binary built with -s -w -X main.Version=HEAD-abc1234"
        );
        assert_eq!(runner.calls()[0].args[0], "clone");
    }

    #[test]
    fn test_failed_completion_keeps_binary() {
        let fixture = Fixture::new();
        let runner = Arc::new(FnRunner::new(|spec| {
            if spec.args.first().map(String::as_str) == Some("completion") && spec.args[1] == "fish"
            {
                Ok(failed(1, "fish not supported"))
            } else {
                toolchain(spec)
            }
        }));
        let layout = fixture.layout();

        let err = fixture
            .kitchen(runner)
            .install(&fixture.formula(), BuildMode::Release, &layout)
            .unwrap_err();

        match err {
            Error::Install(InstallError::Completions(failures)) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].shell, ShellKind::Fish);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(layout.binary_path("gwt").is_file());
    }

    #[test]
    fn test_smoke_failure_reports_only_failing_test() {
        let fixture = Fixture::new();
        let runner = Arc::new(FnRunner::new(|spec| {
            if spec.args.first().map(String::as_str) == Some("--help") {
                Ok(ok("usage: something else\n"))
            } else {
                toolchain(spec)
            }
        }));

        let err = fixture
            .kitchen(runner)
            .install(&fixture.formula(), BuildMode::Release, &fixture.layout())
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::PostVerify));
        match err {
            Error::Verification(VerificationError { failures }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].expected, "Git Worktree CLI");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cancelled_before_start() {
        let fixture = Fixture::new();
        let runner = Arc::new(FnRunner::new(toolchain));
        let kitchen = fixture.kitchen(runner.clone());
        kitchen.cancel_token().cancel();

        let err = kitchen
            .install(&fixture.formula(), BuildMode::Release, &fixture.layout())
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { stage: Stage::Fetch }));
        assert!(runner.calls().is_empty());
        assert!(fixture.scratch_is_clean());
    }

    #[test]
    fn test_cancelled_during_build() {
        let fixture = Fixture::new();
        let token = CancelToken::new();
        let interrupt = token.clone();
        // Ctrl-C arrives while `go build` runs; the runner kills it and bails
        let runner = Arc::new(FnRunner::new(move |spec| {
            if spec.program == Path::new("go") {
                interrupt.cancel();
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "go build cancelled",
                )));
            }
            toolchain(spec)
        }));
        let config = KitchenConfig::default().with_scratch_root(fixture.scratch_root());
        let mut kitchen = Kitchen::with_runner(config, runner, token).unwrap();
        kitchen.set_probe(Arc::new(NoopProbe));
        let layout = fixture.layout();

        let err = kitchen
            .install(&fixture.formula(), BuildMode::Release, &layout)
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled { stage: Stage::Build }));
        assert!(fixture.scratch_is_clean());
        assert!(!layout.binary_path("gwt").exists());
    }

    #[test]
    fn test_invalid_record_is_rejected_before_fetch() {
        let fixture = Fixture::new();
        let runner = Arc::new(FnRunner::new(toolchain));
        let kitchen = fixture.kitchen(runner.clone());
        let layout = fixture.layout();
        let mut formula = fixture.formula();
        formula.completions.push(CompletionEntry::new(ShellKind::Zsh));

        let err = kitchen
            .install(&formula, BuildMode::Release, &layout)
            .unwrap_err();

        assert!(matches!(err, Error::Formula(_)));
        assert!(err.to_string().contains("zsh"));
        assert!(runner.calls().is_empty());
        assert!(!layout.prefix.exists());
        assert!(fixture.scratch_is_clean());
    }

    #[test]
    fn test_keep_scratch() {
        let fixture = Fixture::new();
        let config = KitchenConfig::default()
            .with_scratch_root(fixture.scratch_root())
            .keeping_scratch();
        let mut kitchen =
            Kitchen::with_runner(config, Arc::new(FnRunner::new(toolchain)), CancelToken::new())
                .unwrap();
        kitchen.set_probe(Arc::new(NoopProbe));

        let report = kitchen
            .install(&fixture.formula(), BuildMode::Release, &fixture.layout())
            .unwrap();
        let scratch = report.scratch_dir.unwrap();
        assert!(scratch.join("out/gwt").is_file());
    }

    #[test]
    fn test_fetch_only() {
        let fixture = Fixture::new();
        let kitchen = fixture.kitchen(Arc::new(FnRunner::new(toolchain)));
        let dest = fixture.dir.path().join("cache");

        let (path, digest) = kitchen.fetch(&fixture.formula(), &dest).unwrap();
        assert_eq!(path, dest.join("v1.0.0.tar.gz"));
        assert_eq!(digest.to_prefixed_string(), fixture.digest);
        // Staging directory is gone
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 1);
    }

    #[test]
    fn test_batch_rejects_duplicate_names() {
        let fixture = Fixture::new();
        let kitchen = fixture.kitchen(Arc::new(FnRunner::new(toolchain)));
        let formulas = vec![fixture.formula(), fixture.formula()];

        let err = kitchen
            .install_batch(&formulas, BuildMode::Release, &fixture.layout())
            .unwrap_err();
        assert!(matches!(err, Error::Formula(_)));
    }

    #[test]
    fn test_batch_installs_independent_formulas() {
        let fixture = Fixture::new();
        let kitchen = fixture.kitchen(Arc::new(FnRunner::new(toolchain)));
        let mut other = fixture.formula();
        other.formula.name = "git-worktree-cli".to_string();
        other.completions.clear();
        other.smoke_tests.truncate(1);
        let formulas = vec![fixture.formula(), other];

        let results = kitchen
            .install_batch(&formulas, BuildMode::Release, &fixture.layout())
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "gwt");
        assert_eq!(results[1].0, "git-worktree-cli");
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(fixture.layout().binary_path("git-worktree-cli").is_file());
    }
}
