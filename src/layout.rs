// src/layout.rs

//! Destination directory layout for installed tools

use crate::error::{Error, Result};
use crate::formula::ShellKind;
use std::fs;
use std::path::{Path, PathBuf};

/// Where binaries and completion scripts are installed
///
/// Defaults follow the usual prefix conventions:
/// - `bin/`
/// - `etc/bash_completion.d/`
/// - `share/zsh/site-functions/`
/// - `share/fish/vendor_completions.d/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    pub prefix: PathBuf,
    pub bin_dir: PathBuf,
    pub bash_completion_dir: PathBuf,
    pub zsh_completion_dir: PathBuf,
    pub fish_completion_dir: PathBuf,
}

impl InstallLayout {
    /// Standard layout under a prefix
    pub fn under(prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        Self {
            bin_dir: prefix.join("bin"),
            bash_completion_dir: prefix.join("etc/bash_completion.d"),
            zsh_completion_dir: prefix.join("share/zsh/site-functions"),
            fish_completion_dir: prefix.join("share/fish/vendor_completions.d"),
            prefix,
        }
    }

    /// Per-user layout under `~/.local`
    pub fn user_default() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".to_string()))?;
        Ok(Self::under(home.join(".local")))
    }

    /// Completion directory for a shell
    pub fn completion_dir(&self, shell: ShellKind) -> &Path {
        match shell {
            ShellKind::Bash => &self.bash_completion_dir,
            ShellKind::Zsh => &self.zsh_completion_dir,
            ShellKind::Fish => &self.fish_completion_dir,
        }
    }

    /// Final path of an installed binary
    pub fn binary_path(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }

    /// Create the binary directory if missing
    pub fn ensure_bin_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.bin_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_prefix() {
        let layout = InstallLayout::under("/opt/tools");
        assert_eq!(layout.binary_path("gwt"), PathBuf::from("/opt/tools/bin/gwt"));
        assert_eq!(
            layout.completion_dir(ShellKind::Zsh),
            Path::new("/opt/tools/share/zsh/site-functions")
        );
        assert_eq!(
            layout.completion_dir(ShellKind::Fish),
            Path::new("/opt/tools/share/fish/vendor_completions.d")
        );
        assert_eq!(
            layout.completion_dir(ShellKind::Bash),
            Path::new("/opt/tools/etc/bash_completion.d")
        );
    }
}
