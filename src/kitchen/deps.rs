// src/kitchen/deps.rs

//! Build dependency checks

use crate::error::Result;
use std::path::PathBuf;

/// Trait for checking that build dependencies are available
///
/// Keeps the Kitchen independent of how tools are located, so a build
/// container with a pre-provisioned toolchain can skip the check.
pub trait DependencyProbe: Send + Sync {
    /// Return the dependencies that are not available
    fn check_missing(&self, deps: &[&str]) -> Result<Vec<String>>;
}

/// Looks dependencies up as executables on PATH
#[derive(Debug, Clone, Default)]
pub struct PathProbe {
    /// Search path override (process PATH when `None`)
    search_path: Option<String>,
}

impl PathProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search these directories instead of the process PATH
    pub fn with_search_path(paths: &[PathBuf]) -> Self {
        let joined = std::env::join_paths(paths)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            search_path: Some(joined),
        }
    }
}

impl DependencyProbe for PathProbe {
    fn check_missing(&self, deps: &[&str]) -> Result<Vec<String>> {
        let cwd = std::env::current_dir()?;
        Ok(deps
            .iter()
            .filter(|dep| {
                let found = match &self.search_path {
                    Some(path) => which::which_in(dep, Some(path), &cwd),
                    None => which::which(dep),
                };
                found.is_err()
            })
            .map(|dep| dep.to_string())
            .collect())
    }
}

/// A probe that assumes every dependency is present
pub struct NoopProbe;

impl DependencyProbe for NoopProbe {
    fn check_missing(&self, _deps: &[&str]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
