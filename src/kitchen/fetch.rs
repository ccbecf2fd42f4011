// src/kitchen/fetch.rs

//! Archive Fetcher: retrieve release archives and head checkouts
//!
//! Release archives come over HTTP(S) or from `file://` URLs; head mode
//! clones the tracked branch with git. Everything lands inside the run's
//! scratch directory, which the caller owns and cleans up.

use crate::error::{Error, Result};
use crate::kitchen::config::KitchenConfig;
use crate::kitchen::state::Stage;
use crate::runner::{CancelToken, CommandRunner, CommandSpec};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, Response};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Retry delay in milliseconds, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 1000;

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// A head-mode working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub path: PathBuf,
    /// Abbreviated commit hash of the checked-out tip
    pub revision: String,
}

/// Downloads release archives
pub struct ArchiveFetcher {
    client: Client,
    max_retries: u32,
    show_progress: bool,
    cancel: CancelToken,
}

impl ArchiveFetcher {
    pub fn new(config: &KitchenConfig, cancel: CancelToken) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("formulary/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: config.max_retries.max(1),
            show_progress: config.show_progress,
            cancel,
        })
    }

    /// Fetch `url` into `dest_dir`, returning the local file path
    ///
    /// The file is written under a temporary name and renamed once complete,
    /// so a failed transfer never leaves a plausible-looking archive behind.
    pub fn fetch_archive(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dest_dir)?;

        // Bare paths are local archives
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                let source = Path::new(url);
                let name = source
                    .file_name()
                    .ok_or_else(|| Error::fetch(url, format!("invalid URL: {e}")))?;
                let dest = dest_dir.join(name);
                copy_local(url, source, &dest)?;
                info!("Copied {} to {}", url, dest.display());
                return Ok(dest);
            }
        };
        let dest = dest_dir.join(archive_filename(&parsed));

        match parsed.scheme() {
            "http" | "https" => self.download(url, &dest)?,
            "file" => {
                let source = parsed
                    .to_file_path()
                    .map_err(|_| Error::fetch(url, "not a local file path"))?;
                copy_local(url, &source, &dest)?;
            }
            other => {
                return Err(Error::fetch(url, format!("unsupported URL scheme {other}")));
            }
        }

        info!("Fetched {} to {}", url, dest.display());
        Ok(dest)
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::fetch(url, format!("HTTP {}", response.status())));
                    }
                    return self.stream_to_file(url, response, dest);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::fetch(
                            url,
                            format!("failed after {attempt} attempts: {e}"),
                        ));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    /// Stream an HTTP response to disk in chunks
    fn stream_to_file(&self, url: &str, mut response: Response, dest: &Path) -> Result<()> {
        let progress = self.progress_bar(response.content_length(), dest);
        let partial = partial_path(dest);
        let mut file = File::create(&partial)?;
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        let mut downloaded: u64 = 0;

        let result = loop {
            if self.cancel.is_cancelled() {
                break Err(Error::Cancelled { stage: Stage::Fetch });
            }
            let n = match response.read(&mut buffer) {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(Error::fetch(url, format!("failed to read response: {e}"))),
            };
            if let Err(e) = file.write_all(&buffer[..n]) {
                break Err(Error::Io(e));
            }
            downloaded += n as u64;
            if let Some(pb) = &progress {
                pb.set_position(downloaded);
            }
        };

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        match result.and_then(|()| file.sync_all().map_err(Error::from)) {
            Ok(()) => {
                debug!("Downloaded {} bytes from {}", downloaded, url);
                fs::rename(&partial, dest)?;
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&partial);
                Err(e)
            }
        }
    }

    fn progress_bar(&self, total: Option<u64>, dest: &Path) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let pb = match total {
            Some(len) => ProgressBar::new(len),
            None => ProgressBar::new_spinner(),
        };
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec})")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.set_message(
            dest.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        Some(pb)
    }
}

/// Clone a branch into `dest` and report the checked-out revision
pub fn checkout_head(
    runner: &dyn CommandRunner,
    config: &KitchenConfig,
    url: &str,
    branch: &str,
    dest: &Path,
) -> Result<Checkout> {
    info!("Cloning {} (branch {})", url, branch);

    let clone = CommandSpec::new(&config.git, config.checkout_timeout)
        .args(["clone", "--depth", "1", "--branch", branch, url])
        .arg(dest.to_string_lossy());
    let output = runner.run(&clone)?;
    if !output.success() {
        return Err(Error::fetch(
            url,
            format!(
                "git clone {}: {}",
                output.status,
                output.stderr_lossy().trim()
            ),
        ));
    }

    let rev_parse = CommandSpec::new(&config.git, config.command_timeout)
        .args(["rev-parse", "--short", "HEAD"])
        .cwd(dest);
    let output = runner.run(&rev_parse)?;
    let revision = output.stdout_lossy().trim().to_string();
    if !output.success() || revision.is_empty() {
        return Err(Error::fetch(
            url,
            format!("cannot determine checked-out revision: {}", output.stderr_lossy().trim()),
        ));
    }

    debug!("Checked out {} at {}", url, revision);
    Ok(Checkout {
        path: dest.to_path_buf(),
        revision,
    })
}

/// File name for a downloaded archive, from the last URL path segment
fn archive_filename(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("source.tar.gz")
        .to_string()
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

fn copy_local(url: &str, source: &Path, dest: &Path) -> Result<()> {
    let partial = partial_path(dest);
    if let Err(e) = fs::copy(source, &partial) {
        let _ = fs::remove_file(&partial);
        return Err(Error::fetch(url, format!("{}: {e}", source.display())));
    }
    fs::rename(&partial, dest)?;
    Ok(())
}
