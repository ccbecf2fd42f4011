// src/kitchen/install.rs

//! Artifact Installer: place the binary and derive completion scripts from it

use crate::error::{CompletionFailure, Error, InstallError, Result};
use crate::formula::{CompletionEntry, ShellKind};
use crate::layout::InstallLayout;
use crate::runner::{CommandRunner, CommandSpec};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Mode for installed binaries
#[cfg(unix)]
const BINARY_MODE: u32 = 0o755;

/// Mode for completion scripts
#[cfg(unix)]
const COMPLETION_MODE: u32 = 0o644;

/// Move a built artifact into the layout's bin directory
///
/// The artifact is copied to a temp file in the destination directory and
/// renamed over `<bin>/<name>`, so the final path either holds the previous
/// binary or the complete new one, never a partial file.
pub fn place_binary(artifact: &Path, layout: &InstallLayout, name: &str) -> Result<PathBuf> {
    let dest = layout.binary_path(name);
    let placement_err = |reason: String| {
        Error::from(InstallError::Placement {
            path: dest.clone(),
            reason,
        })
    };

    layout
        .ensure_bin_dir()
        .map_err(|e| placement_err(e.to_string()))?;

    let mut source = File::open(artifact)
        .map_err(|e| placement_err(format!("cannot read {}: {e}", artifact.display())))?;
    let mut staged = NamedTempFile::new_in(&layout.bin_dir)
        .map_err(|e| placement_err(e.to_string()))?;
    io::copy(&mut source, staged.as_file_mut()).map_err(|e| placement_err(e.to_string()))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| placement_err(e.to_string()))?;

    #[cfg(unix)]
    set_mode(staged.path(), BINARY_MODE).map_err(|e| placement_err(e.to_string()))?;

    staged
        .persist(&dest)
        .map_err(|e| placement_err(e.error.to_string()))?;

    info!("Installed {}", dest.display());
    Ok(dest)
}

/// Run `<binary> completion <shell>` for each entry and write the output
///
/// Every shell is attempted. Failures (non-zero exit, timeout, empty output,
/// unwritable destination) are collected into one error; scripts that were
/// generated stay in place and the binary is not touched.
pub fn generate_completions(
    runner: &dyn CommandRunner,
    binary: &Path,
    tool: &str,
    entries: &[CompletionEntry],
    layout: &InstallLayout,
    timeout: Duration,
) -> Result<Vec<(ShellKind, PathBuf)>> {
    let mut written = Vec::new();
    let mut failures = Vec::new();

    for entry in entries {
        let path = layout
            .completion_dir(entry.shell)
            .join(entry.file_name_for(tool));

        match completion_script(runner, binary, entry.shell, timeout).and_then(|script| {
            write_atomic(&path, &script)
                .map_err(|e| format!("cannot write {}: {e}", path.display()))
        }) {
            Ok(()) => {
                debug!("Wrote {} completion to {}", entry.shell, path.display());
                written.push((entry.shell, path));
            }
            Err(e) => {
                warn!("{} completion for {} failed: {}", entry.shell, tool, e);
                failures.push(CompletionFailure {
                    shell: entry.shell,
                    path,
                    reason: e,
                });
            }
        }
    }

    if failures.is_empty() {
        Ok(written)
    } else {
        Err(InstallError::Completions(failures).into())
    }
}

/// Output of `<binary> completion <shell>`, or why there is none
fn completion_script(
    runner: &dyn CommandRunner,
    binary: &Path,
    shell: ShellKind,
    timeout: Duration,
) -> std::result::Result<Vec<u8>, String> {
    let spec = CommandSpec::new(binary, timeout).args(["completion", shell.as_str()]);
    let output = runner
        .run(&spec)
        .map_err(|e| format!("`{}` could not run: {e}", spec.display()))?;
    if !output.success() {
        return Err(format!(
            "`{}` {}: {}",
            spec.display(),
            output.status,
            output.stderr_lossy().trim()
        ));
    }
    if output.stdout.iter().all(u8::is_ascii_whitespace) {
        return Err(format!("`{}` produced no output", spec.display()));
    }
    Ok(output.stdout)
}

/// Write `contents` to `path` via a temp file and rename
fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(dir)?;

    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;
    #[cfg(unix)]
    set_mode(staged.path(), COMPLETION_MODE)?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}
