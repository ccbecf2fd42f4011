// src/formula/format.rs

//! Formula file format definitions
//!
//! A formula is a TOML file describing one command-line tool: where its
//! source lives, how to build it, which completion scripts to derive from the
//! built binary and how to smoke-test the result.

use crate::error::{Error, Result};
use crate::hash::Hash;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Archive filenames we can pull a version out of: `v1.0.0.tar.gz`, `gwt-0.1.1.tgz`
static VERSION_IN_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:.*?[-_])?v?(\d+(?:\.\d+)+(?:-[0-9A-Za-z.]+)?)\.(?:tar\.gz|tgz|tar\.xz|txz|tar\.bz2|tbz2|tar|zip)$",
    )
    .expect("version pattern is valid")
});

/// A complete formula record
///
/// Records are immutable once loaded; every pipeline stage reads them and
/// none writes back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaRecord {
    /// Tool metadata
    pub formula: FormulaSection,

    /// Released source archive
    pub source: SourceSection,

    /// Live version-control source (optional)
    #[serde(default)]
    pub head: Option<HeadSection>,

    /// Tools required to build or run
    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    /// Build invocation
    #[serde(default)]
    pub build: BuildSection,

    /// Completion scripts generated from the installed binary
    #[serde(default)]
    pub completions: Vec<CompletionEntry>,

    /// Post-install smoke tests
    #[serde(default, rename = "test")]
    pub smoke_tests: Vec<SmokeTest>,

    /// Variables for substitution in the build command
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl FormulaRecord {
    /// Installed binary name
    pub fn name(&self) -> &str {
        &self.formula.name
    }

    /// Release version: explicit, or inferred from the archive filename
    pub fn version(&self) -> Option<String> {
        self.formula
            .version
            .clone()
            .or_else(|| infer_version_from_url(&self.source.url))
    }

    /// Parsed expected digest of the release archive
    pub fn expected_digest(&self) -> Result<Hash> {
        let checksum = self
            .source
            .checksum
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                Error::Formula(format!(
                    "{}: release source {} has no checksum",
                    self.formula.name, self.source.url
                ))
            })?;

        checksum
            .parse::<Hash>()
            .map_err(|e| Error::Formula(format!("{}: bad checksum: {}", self.formula.name, e)))
    }

    /// Pick the source for a run
    ///
    /// Release and head are mutually exclusive per run; the mode decides
    /// which one is active.
    pub fn resolve_source(&self, mode: BuildMode) -> Result<ResolvedSource> {
        match mode {
            BuildMode::Release => {
                let version = self.version().ok_or_else(|| {
                    Error::Formula(format!(
                        "{}: no version given and none found in {}",
                        self.formula.name, self.source.url
                    ))
                })?;
                Ok(ResolvedSource::Release {
                    url: self.source.url.clone(),
                    digest: self.expected_digest()?,
                    version,
                })
            }
            BuildMode::Head => {
                let head = self.head.as_ref().ok_or_else(|| {
                    Error::Formula(format!("{} has no head source", self.formula.name))
                })?;
                Ok(ResolvedSource::Head {
                    url: head.url.clone(),
                    branch: head.branch.clone(),
                })
            }
        }
    }

    /// Substitute variables in a template
    ///
    /// Replaces `%(name)s` patterns with built-in values first, then with the
    /// `[variables]` table. Unknown placeholders are left untouched.
    pub fn substitute(&self, template: &str, builtins: &[(&str, &str)]) -> String {
        let mut result = template.to_string();

        for (key, value) in builtins {
            result = result.replace(&format!("%({})s", key), value);
        }
        result = result.replace("%(name)s", &self.formula.name);

        for (key, value) in &self.variables {
            result = result.replace(&format!("%({})s", key), value);
        }

        result
    }

    /// Dependencies needed on PATH before the build command runs
    pub fn build_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.stage == DependencyStage::Build)
    }

    /// Dependencies the installed tool needs at run time
    pub fn runtime_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.stage == DependencyStage::Runtime)
    }
}

/// Extract a version from the last path segment of an archive URL
pub fn infer_version_from_url(url: &str) -> Option<String> {
    let filename = url.trim_end_matches('/').rsplit('/').next()?;
    VERSION_IN_FILENAME
        .captures(filename)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Tool metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaSection {
    /// Tool name, also the installed binary name
    pub name: String,

    /// Explicit release version (inferred from the source URL when absent)
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub homepage: Option<String>,

    #[serde(default)]
    pub license: Option<String>,
}

/// Released source archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSection {
    /// Archive URL (`https://`, `http://` or `file://`)
    pub url: String,

    /// Expected digest, `sha256:<hex>` or bare hex
    #[serde(default, alias = "sha256")]
    pub checksum: Option<String>,
}

/// Version-control source tracked in head mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadSection {
    /// Git remote URL
    pub url: String,

    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Which source a run builds from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// Pinned release archive, digest-verified
    #[default]
    Release,
    /// Live branch checkout, not verified
    Head,
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Release => write!(f, "release"),
            Self::Head => write!(f, "head"),
        }
    }
}

/// The source chosen for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Release {
        url: String,
        digest: Hash,
        version: String,
    },
    Head {
        url: String,
        branch: String,
    },
}

impl ResolvedSource {
    pub fn url(&self) -> &str {
        match self {
            Self::Release { url, .. } | Self::Head { url, .. } => url,
        }
    }

    pub fn mode(&self) -> BuildMode {
        match self {
            Self::Release { .. } => BuildMode::Release,
            Self::Head { .. } => BuildMode::Head,
        }
    }
}

/// When a dependency is needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStage {
    /// Needed only to build
    Build,
    /// Needed by the installed tool
    #[default]
    Runtime,
}

impl fmt::Display for DependencyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Runtime => write!(f, "runtime"),
        }
    }
}

/// A required tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub stage: DependencyStage,
}

/// Build invocation section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    /// Command template: program followed by arguments
    ///
    /// Placeholders: `%(ldflags)s`, `%(output)s`, `%(version)s`, `%(name)s`
    /// and any key from `[variables]`.
    #[serde(default = "default_build_command")]
    pub command: Vec<String>,

    /// Strip symbol tables and debug info (`-s -w`)
    #[serde(default = "default_true")]
    pub strip: bool,

    /// Linker symbol receiving the version string (`-X <symbol>=<version>`)
    ///
    /// Set to an empty string to skip version embedding.
    #[serde(default = "default_version_symbol")]
    pub version_symbol: String,

    /// Extra linker flags appended after the computed ones
    #[serde(default)]
    pub extra_ldflags: Vec<String>,

    /// Subdirectory of the source tree to build from
    #[serde(default)]
    pub workdir: Option<String>,

    /// Environment variables for the build command
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            command: default_build_command(),
            strip: true,
            version_symbol: default_version_symbol(),
            extra_ldflags: Vec::new(),
            workdir: None,
            environment: HashMap::new(),
        }
    }
}

fn default_build_command() -> Vec<String> {
    ["go", "build", "-trimpath", "-o", "%(output)s", "-ldflags", "%(ldflags)s"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_version_symbol() -> String {
    "main.Version".to_string()
}

fn default_true() -> bool {
    true
}

/// Shells we can generate completion scripts for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    Bash,
    Zsh,
    Fish,
}

impl ShellKind {
    pub const ALL: [ShellKind; 3] = [Self::Bash, Self::Zsh, Self::Fish];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Fish => "fish",
        }
    }

    /// Conventional completion file name for a tool
    pub fn file_name(&self, tool: &str) -> String {
        match self {
            Self::Bash => tool.to_string(),
            Self::Zsh => format!("_{tool}"),
            Self::Fish => format!("{tool}.fish"),
        }
    }
}

impl fmt::Display for ShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShellKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bash" => Ok(Self::Bash),
            "zsh" => Ok(Self::Zsh),
            "fish" => Ok(Self::Fish),
            other => Err(Error::Parse(format!(
                "unknown shell: {other} (supported: bash, zsh, fish)"
            ))),
        }
    }
}

/// One completion script to derive from the installed binary
///
/// Written either as a bare shell name (`"zsh"`) or as a table with an
/// explicit file name relative to that shell's completion directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CompletionRepr")]
pub struct CompletionEntry {
    pub shell: ShellKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl CompletionEntry {
    pub fn new(shell: ShellKind) -> Self {
        Self {
            shell,
            file_name: None,
        }
    }

    /// File name inside the shell's completion directory
    pub fn file_name_for(&self, tool: &str) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| self.shell.file_name(tool))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CompletionRepr {
    Shell(ShellKind),
    Table {
        shell: ShellKind,
        #[serde(default)]
        file_name: Option<String>,
    },
}

impl From<CompletionRepr> for CompletionEntry {
    fn from(repr: CompletionRepr) -> Self {
        match repr {
            CompletionRepr::Shell(shell) => Self::new(shell),
            CompletionRepr::Table { shell, file_name } => Self { shell, file_name },
        }
    }
}

/// A post-install smoke test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokeTest {
    /// Arguments passed to the installed binary
    #[serde(default)]
    pub args: Vec<String>,

    /// Substring the combined output must contain
    pub expect: String,

    /// Expected exit code
    #[serde(default)]
    pub exit_code: i32,
}
