// src/error.rs

//! Error types for formula parsing and the install pipeline
//!
//! Every pipeline stage fails with its own error kind so callers can tell
//! *where* an install broke without parsing messages. [`Error::stage`] maps
//! each kind back to the [`Stage`] that produces it.

use crate::formula::ShellKind;
use crate::hash::HashAlgorithm;
use crate::kitchen::Stage;
use crate::runner::ExitState;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by formulary
#[derive(Error, Debug)]
pub enum Error {
    /// The formula record violates one of its invariants
    #[error("invalid formula: {0}")]
    Formula(String),

    /// A formula or config file could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// Configuration is inconsistent or unusable
    #[error("config error: {0}")]
    Config(String),

    /// Source could not be retrieved (network, HTTP status, VCS)
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Downloaded bytes do not match the expected digest
    #[error("integrity check failed for {url}: expected {algorithm}:{expected}, got {algorithm}:{actual}")]
    Integrity {
        url: String,
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
    },

    /// Verified archive could not be unpacked into a source tree
    #[error("failed to unpack {}: {reason}", .archive.display())]
    Unpack { archive: PathBuf, reason: String },

    /// Build-stage dependencies are not available on PATH
    #[error("missing build dependencies: {}", .0.join(", "))]
    MissingDependencies(Vec<String>),

    /// The external build command failed or produced no artifact
    #[error("build command `{command}` {status}{}", stderr_suffix(.stderr))]
    Build {
        command: String,
        status: ExitState,
        stderr: String,
    },

    /// Binary placement or completion generation failed
    #[error(transparent)]
    Install(#[from] InstallError),

    /// One or more post-install smoke tests failed
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// The run was interrupted
    #[error("install cancelled during {stage} stage")]
    Cancelled { stage: Stage },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The pipeline stage this error kind belongs to, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Fetch { .. } => Some(Stage::Fetch),
            Self::Integrity { .. } => Some(Stage::Verify),
            Self::Unpack { .. } | Self::MissingDependencies(_) | Self::Build { .. } => {
                Some(Stage::Build)
            }
            Self::Install(_) => Some(Stage::Install),
            Self::Verification(_) => Some(Stage::PostVerify),
            Self::Cancelled { stage } => Some(*stage),
            Self::Formula(_) | Self::Parse(_) | Self::Config(_) | Self::Io(_) => None,
        }
    }

    /// Create a fetch error for a URL
    pub fn fetch(url: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure while placing the binary or generating derived files
#[derive(Error, Debug)]
pub enum InstallError {
    /// The binary could not be moved into the destination directory
    #[error("failed to place binary at {}: {reason}", .path.display())]
    Placement { path: PathBuf, reason: String },

    /// One or more completion scripts could not be generated
    ///
    /// The binary stays installed; it works without completions.
    #[error("completion generation failed for {}", join_shells(.0))]
    Completions(Vec<CompletionFailure>),
}

/// A single shell whose completion script could not be produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionFailure {
    pub shell: ShellKind,
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for CompletionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.shell, self.path.display(), self.reason)
    }
}

/// Aggregated smoke-test failures
#[derive(Error, Debug)]
#[error("{} smoke test(s) failed: {}", .failures.len(), join_failures(.failures))]
pub struct VerificationError {
    pub failures: Vec<SmokeFailure>,
}

/// A smoke-test assertion that did not hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeFailure {
    /// Arguments the installed binary was run with
    pub args: Vec<String>,
    /// Substring the output should have contained
    pub expected: String,
    /// How the process ended; `None` when it could not be started
    pub status: Option<ExitState>,
    /// Combined stdout and stderr, or the reason the binary did not start
    pub output: String,
}

impl fmt::Display for SmokeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            Some(status) => write!(
                f,
                "`{}` {}, expected output containing {:?}",
                self.args.join(" "),
                status,
                self.expected
            ),
            None => write!(
                f,
                "`{}` could not be started: {}",
                self.args.join(" "),
                self.output
            ),
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\nstderr: {trimmed}")
    }
}

fn join_shells(failures: &[CompletionFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_failures(failures: &[SmokeFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
