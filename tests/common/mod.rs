// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use formulary::{HashAlgorithm, InstallLayout, KitchenConfig, hash::hash_bytes};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Stand-in for `go build`: writes a shell-script "binary" that answers
/// `--version`, `--help` and `completion <shell>` like gwt does.
pub const FAKE_GO: &str = r##"#!/bin/sh
out=""
ldflags=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -ldflags) ldflags="$2"; shift 2 ;;
    *) shift ;;
  esac
done
if [ ! -f main.go ]; then
  echo "no Go files in $(pwd)" >&2
  exit 1
fi
version=$(printf '%s\n' "$ldflags" | sed -n 's/.*-X main\.Version=\([^ ]*\).*/\1/p')
cat > "$out" <<EOF
#!/bin/sh
case "\$1" in
  --version) echo "gwt version $version" ;;
  --help) echo "Git Worktree CLI - A powerful command-line tool for managing Git worktrees" ;;
  completion)
    case "\$2" in
      bash) echo "complete -F _gwt gwt" ;;
      zsh) echo "#compdef gwt" ;;
      fish) echo "complete -c gwt -f" ;;
      *) echo "unsupported shell: \$2" >&2; exit 1 ;;
    esac ;;
  *) echo "unknown command: \$1" >&2; exit 1 ;;
esac
EOF
chmod +x "$out"
"##;

/// A build tool that always fails
pub const FAILING_GO: &str = r#"#!/bin/sh
echo "./main.go:3:1: syntax error: non-declaration statement outside function body" >&2
exit 2
"#;

/// A build tool that never finishes, with the wait in a child process
pub const HANGING_GO: &str = r#"#!/bin/sh
sleep 30
echo "unreachable"
"#;

/// Scratch area for one test: archives, tools, install prefix
pub struct Sandbox {
    pub dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write an executable script under `tools/`
    pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
        let tools = self.path().join("tools");
        fs::create_dir_all(&tools).unwrap();
        let path = tools.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// A `gwt-1.0.0/` source tarball served from a `file://` URL
    ///
    /// Returns the URL and its `sha256:` checksum.
    pub fn release_archive(&self) -> (String, String) {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in [
            ("gwt-1.0.0/main.go", "package main\n\nfunc main() {}\n"),
            ("gwt-1.0.0/go.mod", "module github.com/TinsFox/gwt\n"),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&builder.into_inner().unwrap()).unwrap();
        let bytes = encoder.finish().unwrap();

        let releases = self.path().join("releases");
        fs::create_dir_all(&releases).unwrap();
        let archive = releases.join("v1.0.0.tar.gz");
        fs::write(&archive, &bytes).unwrap();

        (
            url::Url::from_file_path(&archive).unwrap().to_string(),
            hash_bytes(HashAlgorithm::Sha256, &bytes).to_prefixed_string(),
        )
    }

    pub fn layout(&self) -> InstallLayout {
        InstallLayout::under(self.path().join("prefix"))
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.path().join("scratch")
    }

    pub fn kitchen_config(&self) -> KitchenConfig {
        KitchenConfig {
            command_timeout: Duration::from_secs(20),
            ..KitchenConfig::default().with_scratch_root(self.scratch_root())
        }
    }

    /// True when every scratch directory has been removed
    pub fn scratch_is_clean(&self) -> bool {
        fs::read_dir(self.scratch_root())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}

/// The gwt formula, pointed at a local archive and build tool
pub fn gwt_formula(url: &str, checksum: &str, go: &Path) -> String {
    format!(
        r#"
completions = ["bash", "zsh", "fish"]

[formula]
name = "gwt"
description = "Git Worktree CLI - A powerful command-line tool for managing Git worktrees"
license = "MIT"

[source]
url = "{url}"
checksum = "{checksum}"

[[dependencies]]
name = "sh"
stage = "build"

[build]
command = ["{go}", "build", "-trimpath", "-o", "%(output)s", "-ldflags", "%(ldflags)s"]

[[test]]
args = ["--version"]
expect = "gwt version"

[[test]]
args = ["--help"]
expect = "Git Worktree CLI"
"#,
        go = go.display()
    )
}
