// src/kitchen/build.rs

//! Build Invoker: turn a formula's build section into one external command

use crate::error::{Error, Result};
use crate::formula::{BuildSection, FormulaRecord};
use crate::runner::{CommandOutput, CommandSpec, ExitState};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Linker flags for a build
///
/// Renders as a single space-separated string, which is what Go's `-ldflags`
/// expects as one argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdFlags {
    flags: Vec<String>,
}

impl LdFlags {
    /// Flags for a build section and the version being built
    pub fn for_build(build: &BuildSection, version: &str) -> Self {
        let mut flags = Vec::new();
        if build.strip {
            flags.push("-s".to_string());
            flags.push("-w".to_string());
        }
        if !build.version_symbol.is_empty() {
            flags.push("-X".to_string());
            flags.push(format!("{}={}", build.version_symbol, version));
        }
        flags.extend(build.extra_ldflags.iter().cloned());
        Self { flags }
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.flags
    }
}

impl fmt::Display for LdFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flags.join(" "))
    }
}

/// A fully substituted build invocation
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub command: CommandSpec,
    pub ldflags: LdFlags,
    /// Where the command must leave the artifact
    pub output: PathBuf,
}

impl BuildPlan {
    /// Substitute placeholders and assemble the command
    ///
    /// `%(ldflags)s`, `%(output)s`, `%(version)s` and `%(name)s` are built in;
    /// the formula's `[variables]` fill in the rest. Environment values get
    /// the same substitution.
    pub fn new(
        formula: &FormulaRecord,
        source_dir: &Path,
        output: &Path,
        version: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let build = &formula.build;
        let ldflags = LdFlags::for_build(build, version);
        let ldflags_str = ldflags.to_string();
        let output_str = output.to_string_lossy();
        let builtins = [
            ("ldflags", ldflags_str.as_str()),
            ("output", output_str.as_ref()),
            ("version", version),
        ];

        let mut argv = build
            .command
            .iter()
            .map(|arg| formula.substitute(arg, &builtins));
        let program = argv.next().ok_or_else(|| {
            Error::Formula(format!("{}: build command is empty", formula.name()))
        })?;

        let workdir = match &build.workdir {
            Some(sub) => source_dir.join(sub),
            None => source_dir.to_path_buf(),
        };

        let mut command = CommandSpec::new(program, timeout).args(argv).cwd(workdir);

        // Sorted so the environment is stable between runs
        let mut env: Vec<_> = build.environment.iter().collect();
        env.sort();
        for (key, value) in env {
            command = command.env(key.clone(), formula.substitute(value, &builtins));
        }

        Ok(Self {
            command,
            ldflags,
            output: output.to_path_buf(),
        })
    }

    /// Turn the command's outcome into the artifact path
    ///
    /// A zero exit with no file at the output path is still a build failure.
    pub fn finish(&self, output: &CommandOutput) -> Result<PathBuf> {
        if !output.success() {
            return Err(Error::Build {
                command: self.command.display(),
                status: output.status,
                stderr: output.stderr_lossy(),
            });
        }
        if !self.output.is_file() {
            return Err(Error::Build {
                command: self.command.display(),
                status: ExitState::Exited(0),
                stderr: format!("no artifact produced at {}", self.output.display()),
            });
        }
        Ok(self.output.clone())
    }
}
