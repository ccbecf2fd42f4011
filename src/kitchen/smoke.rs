// src/kitchen/smoke.rs

//! Post-Install Verifier: run the installed binary and check its output

use crate::error::{Result, SmokeFailure, VerificationError};
use crate::formula::SmokeTest;
use crate::runner::{CommandRunner, CommandSpec, ExitState};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one smoke test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeResult {
    pub args: Vec<String>,
    pub expected: String,
    /// `None` when the binary could not be started
    pub status: Option<ExitState>,
    pub passed: bool,
}

/// Run every smoke test against the installed binary
///
/// All tests run even after one fails. Any failure turns the whole stage
/// into a [`VerificationError`] listing just the failing assertions.
pub fn run_smoke_tests(
    runner: &dyn CommandRunner,
    binary: &Path,
    tests: &[SmokeTest],
    timeout: Duration,
) -> Result<Vec<SmokeResult>> {
    let mut results = Vec::with_capacity(tests.len());
    let mut failures = Vec::new();

    for test in tests {
        let spec = CommandSpec::new(binary, timeout).args(test.args.iter().cloned());
        let (status, combined) = match runner.run(&spec) {
            Ok(output) => (Some(output.status), output.combined_lossy()),
            Err(e) => (None, e.to_string()),
        };

        let passed =
            status == Some(ExitState::Exited(test.exit_code)) && combined.contains(&test.expect);
        if passed {
            debug!("Smoke test passed: {}", spec.display());
        } else {
            match status {
                Some(status) => warn!(
                    "Smoke test failed: `{}` {}, expected {:?}",
                    spec.display(),
                    status,
                    test.expect
                ),
                None => warn!("Smoke test failed: `{}`: {}", spec.display(), combined),
            }
            failures.push(SmokeFailure {
                args: test.args.clone(),
                expected: test.expect.clone(),
                status,
                output: combined,
            });
        }

        results.push(SmokeResult {
            args: test.args.clone(),
            expected: test.expect.clone(),
            status,
            passed,
        });
    }

    if failures.is_empty() {
        Ok(results)
    } else {
        Err(VerificationError { failures }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::runner::CommandOutput;
    use crate::runner::fake::{FnRunner, ok};

    fn smoke(args: &[&str], expect: &str) -> SmokeTest {
        SmokeTest {
            args: args.iter().map(|s| s.to_string()).collect(),
            expect: expect.to_string(),
            exit_code: 0,
        }
    }

    fn gwt_runner() -> FnRunner {
        FnRunner::new(|spec| {
            Ok(match spec.args.first().map(String::as_str) {
                Some("--version") => ok("gwt version 1.0.0\n"),
                Some("--help") => ok("Git Worktree CLI\n\nUsage: gwt <command>\n"),
                _ => ok(""),
            })
        })
    }

    #[test]
    fn test_all_pass() {
        let tests = [
            smoke(&["--version"], "gwt version"),
            smoke(&["--help"], "Git Worktree CLI"),
        ];
        let results =
            run_smoke_tests(&gwt_runner(), Path::new("/bin/gwt"), &tests, Duration::from_secs(5))
                .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.passed));
    }

    #[test]
    fn test_failures_aggregate_and_all_run() {
        let runner = gwt_runner();
        let tests = [
            smoke(&["--version"], "gwt version"),
            smoke(&["--help"], "nonexistent-string"),
            smoke(&["--version"], "9.9.9"),
        ];
        let err = run_smoke_tests(&runner, Path::new("/bin/gwt"), &tests, Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(runner.calls().len(), 3);

        match err {
            Error::Verification(VerificationError { failures }) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].args, vec!["--help"]);
                assert_eq!(failures[0].expected, "nonexistent-string");
                assert!(failures[0].output.contains("Git Worktree CLI"));
                assert_eq!(failures[1].expected, "9.9.9");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stderr_counts_as_output() {
        let runner = FnRunner::new(|_| {
            Ok(CommandOutput {
                status: ExitState::Exited(0),
                stdout: Vec::new(),
                stderr: b"gwt version 1.0.0\n".to_vec(),
            })
        });
        let tests = [smoke(&["--version"], "gwt version")];
        assert!(run_smoke_tests(&runner, Path::new("/bin/gwt"), &tests, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_unstartable_binary_is_a_failure() {
        let runner = FnRunner::new(|spec| {
            if spec.args.first().map(String::as_str) == Some("--version") {
                Err(Error::Io(std::io::Error::other("exec format error")))
            } else {
                Ok(ok("Git Worktree CLI\n"))
            }
        });
        let tests = [
            smoke(&["--version"], "gwt version"),
            smoke(&["--help"], "Git Worktree CLI"),
        ];
        let err = run_smoke_tests(&runner, Path::new("/bin/gwt"), &tests, Duration::from_secs(5))
            .unwrap_err();

        // The remaining test still ran
        assert_eq!(runner.calls().len(), 2);
        assert_eq!(err.stage(), Some(crate::kitchen::Stage::PostVerify));
        match err {
            Error::Verification(VerificationError { failures }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].status, None);
                assert!(failures[0].output.contains("exec format error"));
                assert!(failures[0].to_string().contains("could not be started"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_exit_code_must_match() {
        let runner = FnRunner::new(|_| {
            Ok(CommandOutput {
                status: ExitState::Exited(2),
                stdout: b"usage: gwt\n".to_vec(),
                stderr: Vec::new(),
            })
        });
        let mut expect_failure = smoke(&["bogus"], "usage");
        let results = run_smoke_tests(
            &runner,
            Path::new("/bin/gwt"),
            std::slice::from_ref(&expect_failure),
            Duration::from_secs(5),
        );
        assert!(results.is_err());

        expect_failure.exit_code = 2;
        let results = run_smoke_tests(
            &runner,
            Path::new("/bin/gwt"),
            &[expect_failure],
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(results[0].passed);
    }
}
