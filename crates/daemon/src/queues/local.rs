// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Local queue: a process pool with a FIFO and a concurrency cap.
//!
//! Jobs run as `/bin/sh` children in their working directories with stdout
//! and stderr captured to files. Exit 0 finishes the job, non-zero fails
//! it, and cancellation sends SIGTERM with a SIGKILL fallback after a
//! grace period.

use super::{render_command, resolve_program, QueueBackend, QueueError};
use async_trait::async_trait;
use mq_core::{Job, JobState, MoleQueueId, QueueConfig};
use mq_store::JobStore;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Grace period between SIGTERM and SIGKILL on cancellation.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Launch script name when a program does not run direct.
pub const DEFAULT_LAUNCH_SCRIPT: &str = "launch.sh";

struct PoolState {
    fifo: VecDeque<MoleQueueId>,
    running: HashMap<MoleQueueId, CancellationToken>,
}

struct LocalInner {
    config: QueueConfig,
    store: Arc<JobStore>,
    concurrency: usize,
    kill_grace: Duration,
    state: Mutex<PoolState>,
}

/// Process-pool backend for the local machine.
pub struct LocalQueue {
    inner: Arc<LocalInner>,
}

impl LocalQueue {
    pub fn new(config: QueueConfig, store: Arc<JobStore>) -> Self {
        let concurrency = config.concurrency.unwrap_or_else(default_concurrency).max(1);
        Self {
            inner: Arc::new(LocalInner {
                config,
                store,
                concurrency,
                kill_grace: KILL_GRACE,
                state: Mutex::new(PoolState { fifo: VecDeque::new(), running: HashMap::new() }),
            }),
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[async_trait]
impl QueueBackend for LocalQueue {
    fn type_name(&self) -> &'static str {
        "local"
    }

    fn settings_snapshot(&self) -> QueueConfig {
        self.inner.config.clone()
    }

    async fn submit(&self, job: &Job) -> Result<(), QueueError> {
        let inner = &self.inner;
        let program = resolve_program(&inner.config, job)?;

        if !program.run_direct {
            let command = render_command(program, job);
            let script = launch_script_name(&inner.config);
            write_launch_script(&job.local_working_directory, script, &command)
                .map_err(QueueError::LaunchScript)?;
        }

        inner.store.transition(job.mole_queue_id, JobState::Submitted)?;
        inner.state.lock().fifo.push_back(job.mole_queue_id);
        start_next(inner);
        Ok(())
    }

    async fn cancel(&self, id: MoleQueueId) -> Result<(), QueueError> {
        let inner = &self.inner;
        let token = {
            let mut state = inner.state.lock();
            if let Some(pos) = state.fifo.iter().position(|queued| *queued == id) {
                state.fifo.remove(pos);
                None
            } else {
                state.running.get(&id).cloned()
            }
        };

        match token {
            // Running: the runner task delivers SIGTERM/SIGKILL and
            // transitions the job to Killed.
            Some(token) => token.cancel(),
            None => {
                // Queued (or never dispatched): cancel directly. Terminal
                // jobs make this a no-op, keeping cancel idempotent.
                match inner.store.lookup(id) {
                    Some(job) if !job.is_terminal() => {
                        if let Err(e) = inner.store.transition(id, JobState::Canceled) {
                            debug!(job = %id, error = %e, "cancel raced a transition");
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    async fn update(&self) {
        // Child exits drive local state directly; nothing to poll.
    }

    async fn retrieve(&self, _id: MoleQueueId) -> Result<(), QueueError> {
        // Local output is already in the working directory.
        Ok(())
    }
}

fn launch_script_name(config: &QueueConfig) -> &str {
    config.launch_script_name.as_deref().unwrap_or(DEFAULT_LAUNCH_SCRIPT)
}

fn write_launch_script(dir: &Path, name: &str, command: &str) -> std::io::Result<()> {
    std::fs::write(dir.join(name), format!("#!/bin/sh\n\n{command}\n"))
}

/// Start queued jobs while the pool has capacity.
fn start_next(inner: &Arc<LocalInner>) {
    loop {
        let (id, token) = {
            let mut state = inner.state.lock();
            if state.running.len() >= inner.concurrency {
                return;
            }
            let Some(id) = state.fifo.pop_front() else { return };
            let token = CancellationToken::new();
            state.running.insert(id, token.clone());
            (id, token)
        };
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            run_job(&inner, id, token).await;
            inner.state.lock().running.remove(&id);
            start_next(&inner);
        });
    }
}

async fn run_job(inner: &Arc<LocalInner>, id: MoleQueueId, token: CancellationToken) {
    let Some(job) = inner.store.lookup(id) else { return };
    if job.state != JobState::Submitted {
        // Canceled while queued; nothing to run.
        debug!(job = %id, state = %job.state, "skipping dispatch");
        return;
    }

    let Some(program) = inner.config.program(&job.spec.program) else {
        fail(inner, id, format!("unknown program: {}", job.spec.program));
        return;
    };

    let mut command = tokio::process::Command::new("/bin/sh");
    if program.run_direct {
        command.arg("-c").arg(render_command(program, &job));
    } else {
        command.arg(launch_script_name(&inner.config));
    }
    command.current_dir(&job.local_working_directory).stdin(Stdio::null()).kill_on_drop(true);

    match capture_file(&job.local_working_directory, "stdout") {
        Ok(stdout) => {
            command.stdout(stdout);
        }
        Err(e) => return fail(inner, id, format!("cannot create stdout capture: {e}")),
    }
    match capture_file(&job.local_working_directory, "stderr") {
        Ok(stderr) => {
            command.stderr(stderr);
        }
        Err(e) => return fail(inner, id, format!("cannot create stderr capture: {e}")),
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return fail(inner, id, format!("cannot spawn process: {e}")),
    };

    if inner.store.transition(id, JobState::RunningLocal).is_err() {
        // Lost a race with cancellation; reap the child and stop.
        let _ = child.kill().await;
        return;
    }

    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => finish(inner, id, status),
            Err(e) => fail(inner, id, format!("cannot wait for process: {e}")),
        },
        _ = token.cancelled() => {
            terminate_then_kill(&mut child, inner.kill_grace).await;
            if let Err(e) = inner.store.transition(id, JobState::Killed) {
                warn!(job = %id, error = %e, "kill transition rejected");
            }
        }
    }
}

fn capture_file(dir: &Path, name: &str) -> std::io::Result<Stdio> {
    std::fs::File::create(dir.join(name)).map(Stdio::from)
}

fn finish(inner: &Arc<LocalInner>, id: MoleQueueId, status: std::process::ExitStatus) {
    match status.code() {
        Some(code) => {
            if let Err(e) = inner.store.set_exit_code(id, code) {
                warn!(job = %id, error = %e, "cannot record exit code");
            }
            if code == 0 {
                if let Err(e) = inner.store.transition(id, JobState::Finished) {
                    warn!(job = %id, error = %e, "finish transition rejected");
                }
            } else {
                fail(inner, id, format!("process exited with code {code}"));
            }
        }
        None => fail(inner, id, "process terminated by signal".to_string()),
    }
}

fn fail(inner: &Arc<LocalInner>, id: MoleQueueId, message: String) {
    if let Err(e) = inner.store.fail(id, message) {
        warn!(job = %id, error = %e, "error transition rejected");
    }
}

/// SIGTERM, then SIGKILL once the grace period elapses.
async fn terminate_then_kill(child: &mut tokio::process::Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return;
        }
        debug!(pid, "grace period elapsed; sending SIGKILL");
    }
    #[cfg(not(unix))]
    let _ = grace;
    let _ = child.kill().await;
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
