// src/runner.rs

//! External command execution
//!
//! Every subprocess the pipeline starts (the build tool, completion
//! generation, smoke tests, git) goes through [`CommandRunner`]. The real
//! implementation is [`SystemRunner`]; tests substitute scripted fakes so the
//! stages can be exercised without a toolchain.

use crate::error::{Error, Result};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// How often a waiting runner checks for cancellation
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for output pipes to close once the process is gone
const READER_GRACE: Duration = Duration::from_secs(2);

const READER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared flag used to interrupt a running install
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A command to run
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Working directory (inherits the caller's when `None`)
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Upper bound on wall-clock time
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Human-readable command line for logs and error messages
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push_str(&format!("{arg:?}"));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Exited normally with a status code
    Exited(i32),
    /// Terminated by a signal
    Signaled,
    /// Killed after exceeding its timeout
    TimedOut(Duration),
}

impl ExitState {
    /// True only for a normal exit with status 0
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled => write!(f, "was terminated by a signal"),
            Self::TimedOut(limit) => write!(f, "timed out after {}s", limit.as_secs()),
        }
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitState,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Stdout followed by stderr
    pub fn combined_lossy(&self) -> String {
        let mut combined = self.stdout_lossy();
        combined.push_str(&self.stderr_lossy());
        combined
    }
}

/// Capability to run an external command and capture its output
///
/// Returns `Err` only when the command could not be started (or was
/// cancelled). A command that runs and fails is reported through
/// [`CommandOutput::status`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    cancel: CancelToken,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill running children when `cancel` fires
    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self { cancel }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!("Running: {}", spec.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        // Own process group, so a timeout or cancel reaches the whole tree
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to start {}: {e}", spec.program.display()),
            ))
        })?;

        // Drain both pipes on their own threads so a chatty child can't block
        // on a full pipe while we wait on it.
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let started = Instant::now();
        let status = loop {
            if self.cancel.is_cancelled() {
                kill_tree(&mut child);
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    format!("{} cancelled", spec.display()),
                )));
            }

            let remaining = spec.timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                warn!(
                    "{} exceeded {}s timeout, killing",
                    spec.display(),
                    spec.timeout.as_secs()
                );
                kill_tree(&mut child);
                break ExitState::TimedOut(spec.timeout);
            }

            if let Some(status) = child.wait_timeout(remaining.min(CANCEL_POLL_INTERVAL))? {
                break match status.code() {
                    Some(code) => ExitState::Exited(code),
                    None => ExitState::Signaled,
                };
            }
        };

        // A detached grandchild may still hold the pipes open
        let deadline = (started + spec.timeout).max(Instant::now() + READER_GRACE);
        Ok(CommandOutput {
            status,
            stdout: join_reader(stdout, deadline),
            stderr: join_reader(stderr, deadline),
        })
    }
}

/// Kill the child and everything in its process group, then reap it
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
            debug!("killpg {} failed: {}", child.id(), e);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

/// Collect a reader thread's output, giving up at `deadline`
fn join_reader(handle: Option<thread::JoinHandle<Vec<u8>>>, deadline: Instant) -> Vec<u8> {
    let Some(handle) = handle else {
        return Vec::new();
    };
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("Output pipe still open after the process ended, discarding it");
            return Vec::new();
        }
        thread::sleep(READER_POLL_INTERVAL);
    }
    handle.join().unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted runner for pipeline tests

    use super::*;
    use std::sync::Mutex;

    type Handler = dyn Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync;

    /// Runner that answers every command with a closure and records calls
    pub struct FnRunner {
        handler: Box<Handler>,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl FnRunner {
        pub fn new(
            handler: impl Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync + 'static,
        ) -> Self {
            Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for FnRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            (self.handler)(spec)
        }
    }

    pub fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            status: ExitState::Exited(0),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    pub fn failed(code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            status: ExitState::Exited(code),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }
}
