// src/process.rs

//! External command execution with timeouts
//!
//! Every inspection and the image download shell out to host tools. Commands
//! run synchronously; output is captured into anonymous temp files so a
//! chatty tool can never block on a full pipe while we wait on it.
//!
//! The only cancellation mechanism is the per-command timeout. A caller that
//! wants one deadline across several commands threads a [`TimeBudget`]
//! through them and hands each command whatever is left.

use crate::error::{Error, Result};
use std::ffi::{OsStr, OsString};
use std::io::{Read, Seek, SeekFrom};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Remaining time allowance shared by a sequence of commands
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    total: Option<Duration>,
    started: Instant,
}

impl TimeBudget {
    /// Create a budget; `None` means commands may run indefinitely
    pub fn new(total: Option<Duration>) -> Self {
        Self {
            total,
            started: Instant::now(),
        }
    }

    /// A budget without any limit
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Time left, or `None` when unlimited
    pub fn remaining(&self) -> Option<Duration> {
        self.total
            .map(|total| total.saturating_sub(self.started.elapsed()))
    }

    /// The full allowance this budget started with
    pub fn total(&self) -> Option<Duration> {
        self.total
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }
}

impl Default for TimeBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Builder for a single external command invocation
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    /// Indices into `args` hidden from logs and errors
    redacted: Vec<usize>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            envs: Vec::new(),
            redacted: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Add an argument that must not show up in logs, such as credentials
    pub fn secret_arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.redacted.push(self.args.len());
        self.arg(arg)
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Add an environment variable on top of the inherited environment
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Take the timeout from whatever is left of a budget
    pub fn budget(self, budget: &TimeBudget) -> Self {
        self.timeout(budget.remaining())
    }

    /// Human-readable command line for logs and errors
    pub fn display(&self) -> String {
        let args = self.args.iter().enumerate().map(|(idx, arg)| {
            if self.redacted.contains(&idx) {
                "<redacted>".into()
            } else {
                arg.to_string_lossy()
            }
        });
        std::iter::once(self.program.to_string_lossy())
            .chain(args)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the command and return its stdout
    ///
    /// Fails with `ToolNotFound` when the program cannot be spawned,
    /// `TimeoutExpired` when the timeout elapses (the child is killed), and
    /// `CommandFailed` on a non-zero exit status.
    pub fn run(&self) -> Result<String> {
        let command_line = self.display();

        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(Error::TimeoutExpired {
                    command: command_line,
                    seconds: 0,
                });
            }
        }

        debug!(
            "Running command {:?} with timeout {:?} and {} extra environment variables",
            command_line,
            self.timeout,
            self.envs.len()
        );

        let mut stdout = tempfile::tempfile()?;
        let mut stderr = tempfile::tempfile()?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout.try_clone()?))
            .stderr(Stdio::from(stderr.try_clone()?))
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ToolNotFound(self.program.to_string_lossy().to_string())
                } else {
                    Error::CommandFailed(format!("Failed to spawn {:?}: {}", command_line, e))
                }
            })?;

        let status = match self.timeout {
            Some(timeout) => match child.wait_timeout(timeout)? {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::TimeoutExpired {
                        command: command_line,
                        seconds: whole_seconds(timeout),
                    });
                }
            },
            None => child.wait()?,
        };

        let stdout = read_captured(&mut stdout)?;
        let stderr = read_captured(&mut stderr)?;

        if !stderr.trim().is_empty() {
            warn!("{}: {}", self.program.to_string_lossy(), stderr.trim());
        }

        if !status.success() {
            return Err(Error::CommandFailed(format!(
                "{:?} exited with code {}",
                command_line,
                status.code().unwrap_or(-1)
            )));
        }

        Ok(stdout)
    }
}

/// Seconds of a timeout for reporting, rounded up so short timeouts are not `0`
fn whole_seconds(timeout: Duration) -> u64 {
    timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0)
}

fn read_captured(file: &mut std::fs::File) -> Result<String> {
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_stdout() {
        let out = ToolCommand::new("sh")
            .args(["-c", "echo hello"])
            .run()
            .unwrap();
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn test_env_is_passed() {
        let out = ToolCommand::new("sh")
            .args(["-c", "printf %s \"$EXTRACT_TEST_VALUE\""])
            .env("EXTRACT_TEST_VALUE", "42")
            .run()
            .unwrap();
        assert_eq!(out, "42");
    }

    #[test]
    fn test_missing_tool() {
        let err = ToolCommand::new("definitely-not-a-real-tool-3c9f")
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }

    #[test]
    fn test_non_zero_exit() {
        let err = ToolCommand::new("sh").args(["-c", "exit 3"]).run().unwrap_err();
        assert!(matches!(err, Error::CommandFailed(_)));
    }

    #[test]
    fn test_timeout_kills_child() {
        let err = ToolCommand::new("sleep")
            .arg("5")
            .timeout(Some(Duration::from_millis(100)))
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::TimeoutExpired { seconds: 1, .. }));
    }

    #[test]
    fn test_whole_seconds_rounds_up() {
        assert_eq!(whole_seconds(Duration::from_millis(100)), 1);
        assert_eq!(whole_seconds(Duration::from_secs(5)), 5);
        assert_eq!(whole_seconds(Duration::from_millis(5001)), 6);
    }

    #[test]
    fn test_exhausted_budget_skips_spawn() {
        let budget = TimeBudget::new(Some(Duration::ZERO));
        assert!(budget.is_exhausted());
        let err = ToolCommand::new("definitely-not-a-real-tool-3c9f")
            .budget(&budget)
            .run()
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_budget_decrements() {
        let budget = TimeBudget::new(Some(Duration::from_secs(60)));
        let left = budget.remaining().unwrap();
        assert!(left <= Duration::from_secs(60));
        assert!(TimeBudget::unlimited().remaining().is_none());
    }

    #[test]
    fn test_display() {
        let cmd = ToolCommand::new("rpm").args(["-qa", "--root", "/tmp/rootfs"]);
        assert_eq!(cmd.display(), "rpm -qa --root /tmp/rootfs");
    }

    #[test]
    fn test_secret_arg_redacted() {
        let cmd = ToolCommand::new("skopeo")
            .arg("copy")
            .secret_arg("--src-creds=user:pw")
            .arg("docker://x");
        assert_eq!(cmd.display(), "skopeo copy <redacted> docker://x");
    }
}
