// src/kitchen/config.rs

//! Configuration and result types for the Kitchen

use crate::formula::{BuildMode, ShellKind};
use crate::hash::Hash;
use crate::kitchen::smoke::SmokeResult;
use crate::kitchen::state::PipelineState;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the Kitchen
#[derive(Debug, Clone)]
pub struct KitchenConfig {
    /// Parent directory for per-run scratch directories (system temp when `None`)
    pub scratch_root: Option<PathBuf>,
    /// Timeout for the build command
    pub build_timeout: Duration,
    /// Timeout for completion generation, smoke tests and git queries
    pub command_timeout: Duration,
    /// Timeout for a VCS checkout in head mode
    pub checkout_timeout: Duration,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
    /// Download attempts before giving up on network errors
    pub max_retries: u32,
    /// Keep the scratch directory after the run (for debugging)
    pub keep_scratch: bool,
    /// Check build dependencies on PATH before building
    pub check_dependencies: bool,
    /// Executable used for head-mode checkouts
    pub git: PathBuf,
    /// Draw a progress bar while downloading
    pub show_progress: bool,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            scratch_root: None,
            build_timeout: Duration::from_secs(3600), // 1 hour
            command_timeout: Duration::from_secs(60),
            checkout_timeout: Duration::from_secs(600),
            http_timeout: Duration::from_secs(30),
            max_retries: 3,
            keep_scratch: false,
            check_dependencies: true,
            git: PathBuf::from("git"),
            show_progress: false,
        }
    }
}

impl KitchenConfig {
    /// Put scratch directories under `root`
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Keep scratch directories around after the run
    pub fn keeping_scratch(mut self) -> Self {
        self.keep_scratch = true;
        self
    }
}

/// Result of a successful install run
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Formula name
    pub name: String,
    /// Version string embedded into the binary
    pub version: String,
    pub mode: BuildMode,
    /// Digest of the verified archive (release mode only)
    pub digest: Option<Hash>,
    /// Final path of the installed binary
    pub binary_path: PathBuf,
    /// Generated completion scripts
    pub completions: Vec<(ShellKind, PathBuf)>,
    /// Smoke-test outcomes, all passing
    pub smoke_results: Vec<SmokeResult>,
    /// Runtime dependencies the tool expects; not checked
    pub runtime_dependencies: Vec<String>,
    /// Every state the run went through, ending in `Done`
    pub history: Vec<PipelineState>,
    /// Build log
    pub log: String,
    /// Scratch directory, if it was kept
    pub scratch_dir: Option<PathBuf>,
}
