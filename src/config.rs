// src/config.rs
//! Configuration file parsing for formulary
//!
//! Supports a TOML configuration file with the following sections:
//! - [paths] - Install prefix, directory overrides, extra formula directories
//! - [build] - Build and subprocess timeouts, scratch handling
//! - [network] - HTTP timeout and retries

use crate::error::{Error, Result};
use crate::kitchen::KitchenConfig;
use crate::layout::InstallLayout;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormularyConfig {
    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub build: BuildSettings,

    #[serde(default)]
    pub network: NetworkSection,
}

/// Where things get installed and where formulas come from
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsSection {
    /// Install prefix (default `~/.local`)
    #[serde(default)]
    pub prefix: Option<PathBuf>,

    /// Override `<prefix>/bin`
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,

    #[serde(default)]
    pub bash_completion_dir: Option<PathBuf>,

    #[serde(default)]
    pub zsh_completion_dir: Option<PathBuf>,

    #[serde(default)]
    pub fish_completion_dir: Option<PathBuf>,

    /// Parent for scratch directories (system temp by default)
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,

    /// Extra directories of formula files
    #[serde(default)]
    pub formula_dirs: Vec<PathBuf>,
}

/// Build settings
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSettings {
    /// Build command timeout (e.g. "1h", "30m")
    #[serde(default = "default_build_timeout")]
    pub timeout: String,

    /// Timeout for completion generation and smoke tests
    #[serde(default = "default_command_timeout")]
    pub command_timeout: String,

    /// Timeout for head-mode clones
    #[serde(default = "default_checkout_timeout")]
    pub checkout_timeout: String,

    #[serde(default)]
    pub keep_scratch: bool,

    #[serde(default = "default_true")]
    pub check_dependencies: bool,

    /// git executable for head builds
    #[serde(default = "default_git")]
    pub git: PathBuf,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            timeout: default_build_timeout(),
            command_timeout: default_command_timeout(),
            checkout_timeout: default_checkout_timeout(),
            keep_scratch: false,
            check_dependencies: true,
            git: default_git(),
        }
    }
}

fn default_build_timeout() -> String {
    "1h".to_string()
}

fn default_command_timeout() -> String {
    "60s".to_string()
}

fn default_checkout_timeout() -> String {
    "10m".to_string()
}

fn default_git() -> PathBuf {
    PathBuf::from("git")
}

fn default_true() -> bool {
    true
}

/// Network settings
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSection {
    /// Per-request timeout
    #[serde(default = "default_http_timeout")]
    pub timeout: String,

    /// Download attempts on network errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_http_timeout() -> String {
    "30s".to_string()
}

fn default_max_retries() -> u32 {
    3
}

impl FormularyConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: FormularyConfig = toml::from_str(&content).map_err(|e| {
            Error::Parse(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;

        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load the per-user config file if there is one
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/formulary/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("formulary").join("config.toml"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("build.timeout", &self.build.timeout),
            ("build.command_timeout", &self.build.command_timeout),
            ("build.checkout_timeout", &self.build.checkout_timeout),
            ("network.timeout", &self.network.timeout),
        ] {
            let duration = parse_duration(value)
                .map_err(|e| Error::Config(format!("{key}: {e}")))?;
            if duration.is_zero() {
                return Err(Error::Config(format!("{key} must be greater than zero")));
            }
        }

        if self.network.max_retries == 0 {
            return Err(Error::Config("network.max_retries must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Convert to Kitchen settings
    pub fn kitchen_config(&self) -> Result<KitchenConfig> {
        Ok(KitchenConfig {
            scratch_root: self.paths.scratch_root.clone(),
            build_timeout: parse_duration(&self.build.timeout)?,
            command_timeout: parse_duration(&self.build.command_timeout)?,
            checkout_timeout: parse_duration(&self.build.checkout_timeout)?,
            http_timeout: parse_duration(&self.network.timeout)?,
            max_retries: self.network.max_retries,
            keep_scratch: self.build.keep_scratch,
            check_dependencies: self.build.check_dependencies,
            git: self.build.git.clone(),
            show_progress: false,
        })
    }

    /// Destination layout, starting from `prefix` when one is given
    pub fn layout(&self, prefix: Option<&Path>) -> Result<InstallLayout> {
        let mut layout = match prefix.or(self.paths.prefix.as_deref()) {
            Some(prefix) => InstallLayout::under(prefix),
            None => InstallLayout::user_default()?,
        };
        if let Some(dir) = &self.paths.bin_dir {
            layout.bin_dir = dir.clone();
        }
        if let Some(dir) = &self.paths.bash_completion_dir {
            layout.bash_completion_dir = dir.clone();
        }
        if let Some(dir) = &self.paths.zsh_completion_dir {
            layout.zsh_completion_dir = dir.clone();
        }
        if let Some(dir) = &self.paths.fish_completion_dir {
            layout.fish_completion_dir = dir.clone();
        }
        Ok(layout)
    }
}

/// Parse a duration string (e.g., "30s", "10m", "1h", "1d")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('d') {
        (n, 24 * 60 * 60)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 60 * 60)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else {
        // Assume seconds
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid duration: {}", s)))?;

    Ok(Duration::from_secs(num * multiplier))
}
