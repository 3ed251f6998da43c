// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! SSH/SCP invocation helper shared by the remote queue family.
//!
//! Control commands (mkdir, submit, poll, kill) run with a timeout and are
//! retried with exponential backoff on transient failure. File copies are
//! unbounded; stalled transfers are caught by the ServerAlive options
//! passed to the client instead of a wall-clock timeout.

use mq_core::QueueConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Timeout for control commands.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempts per command before the failure is surfaced.
pub const MAX_ATTEMPTS: u32 = 3;

/// First retry delay; doubled per attempt.
pub const BACKOFF_BASE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command:?} timed out after {}s", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("{command:?} exited with {exit_code}: {stderr}")]
    Failed { command: String, exit_code: i32, stderr: String },
}

/// Captured output of a finished remote command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// One queue's SSH endpoint and retry policy.
#[derive(Debug, Clone)]
pub struct SshSession {
    ssh_executable: String,
    scp_executable: String,
    host: String,
    user: Option<String>,
    port: u16,
    identity_file: Option<PathBuf>,
    control_timeout: Duration,
    max_attempts: u32,
    backoff_base: Duration,
}

impl SshSession {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            ssh_executable: "ssh".to_string(),
            scp_executable: "scp".to_string(),
            host: host.into(),
            user: None,
            port: 22,
            identity_file: None,
            control_timeout: CONTROL_TIMEOUT,
            max_attempts: MAX_ATTEMPTS,
            backoff_base: BACKOFF_BASE,
        }
    }

    pub fn from_config(config: &QueueConfig, host: &str) -> Self {
        let mut session = Self::new(host);
        session.user = config.user.clone();
        session.port = config.ssh_port;
        session.identity_file = config.identity_file.clone();
        session
    }

    #[cfg(test)]
    pub fn with_retry(mut self, max_attempts: u32, backoff_base: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff_base = backoff_base;
        self
    }

    #[cfg(test)]
    pub fn with_executables(mut self, ssh: impl Into<String>, scp: impl Into<String>) -> Self {
        self.ssh_executable = ssh.into();
        self.scp_executable = scp.into();
        self
    }

    #[cfg(test)]
    pub fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    fn common_options(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            // Idle-transfer detection for unbounded copies.
            "-o".to_string(),
            "ServerAliveInterval=30".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=4".to_string(),
        ];
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args
    }

    fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-p".to_string());
        args.push(self.port.to_string());
        args.push(self.destination());
        args.push(command.to_string());
        args
    }

    fn scp_args(&self, from: String, to: String) -> Vec<String> {
        let mut args = self.common_options();
        // scp spells the port flag differently than ssh.
        args.push("-P".to_string());
        args.push(self.port.to_string());
        args.push("-r".to_string());
        args.push(from);
        args.push(to);
        args
    }

    /// Run a command on the remote host, retrying transient failures.
    ///
    /// Exit codes in `allowed_exit_codes` are treated as success (e.g.
    /// PBS returns 153 when stat-ing a completed job).
    pub async fn run_remote(
        &self,
        command: &str,
        allowed_exit_codes: &[i32],
    ) -> Result<CommandOutput, SessionError> {
        let args = self.ssh_args(command);
        self.run_with_retry(&self.ssh_executable, &args, Some(self.control_timeout), {
            move |out: &CommandOutput| out.exit_code == 0 || allowed_exit_codes.contains(&out.exit_code)
        })
        .await
    }

    /// Copy a local directory's contents to a remote path.
    pub async fn copy_to_remote(&self, local: &Path, remote: &str) -> Result<(), SessionError> {
        // Trailing `/.` copies the contents, not the directory itself.
        let from = format!("{}/.", local.display());
        let to = format!("{}:{}", self.destination(), remote);
        let args = self.scp_args(from, to);
        self.run_with_retry(&self.scp_executable, &args, None, |out| out.exit_code == 0)
            .await
            .map(|_| ())
    }

    /// Copy a remote directory back under a local parent directory.
    pub async fn copy_from_remote(&self, remote: &str, local_parent: &Path) -> Result<(), SessionError> {
        let from = format!("{}:{}", self.destination(), remote);
        let to = local_parent.display().to_string();
        let args = self.scp_args(from, to);
        self.run_with_retry(&self.scp_executable, &args, None, |out| out.exit_code == 0)
            .await
            .map(|_| ())
    }

    async fn run_with_retry(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
        accept: impl Fn(&CommandOutput) -> bool,
    ) -> Result<CommandOutput, SessionError> {
        let mut last_failure: Option<SessionError> = None;
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = self.backoff_base * 2u32.saturating_pow(attempt - 2);
                debug!(program, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
            }
            match run_once(program, args, timeout).await {
                Ok(output) if accept(&output) => return Ok(output),
                Ok(output) => {
                    warn!(
                        program,
                        attempt,
                        exit_code = output.exit_code,
                        "remote command failed"
                    );
                    last_failure = Some(SessionError::Failed {
                        command: display_command(program, args),
                        exit_code: output.exit_code,
                        stderr: output.stderr.trim().to_string(),
                    });
                }
                // A missing ssh/scp binary will not fix itself.
                Err(e @ SessionError::Spawn { .. }) => return Err(e),
                Err(e) => {
                    warn!(program, attempt, error = %e, "remote command errored");
                    last_failure = Some(e);
                }
            }
        }
        Err(last_failure.unwrap_or_else(|| SessionError::Failed {
            command: display_command(program, args),
            exit_code: -1,
            stderr: String::new(),
        }))
    }
}

fn display_command(program: &str, args: &[String]) -> String {
    // Last two args are destination and command/paths; enough for messages.
    let tail = args.iter().rev().take(2).rev().cloned().collect::<Vec<_>>().join(" ");
    format!("{program} ... {tail}")
}

async fn run_once(
    program: &str,
    args: &[String],
    timeout: Option<Duration>,
) -> Result<CommandOutput, SessionError> {
    let child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| SessionError::Spawn { program: program.to_string(), source })?;

    let wait = child.wait_with_output();
    let output = match timeout {
        None => wait.await,
        Some(limit) => match tokio::time::timeout(limit, wait).await {
            Ok(result) => result,
            Err(_) => {
                return Err(SessionError::Timeout {
                    command: display_command(program, args),
                    timeout: limit,
                })
            }
        },
    }
    .map_err(|source| SessionError::Spawn { program: program.to_string(), source })?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
