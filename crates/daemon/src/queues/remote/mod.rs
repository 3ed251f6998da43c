// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Remote queue skeleton shared by the SSH-driven scheduler family.
//!
//! Lifecycle per job: stage the working directory to the remote host,
//! submit the launch script, poll the scheduler until the job reports (or
//! disappears in) a terminal state, retrieve outputs, optionally clean the
//! remote directory. Scheduler differences are data in [`Scheduler`].

pub mod scheduler;
pub mod session;

use super::{render_command, resolve_program, submission_vars, QueueBackend, QueueError};
use crate::queues::RegistryError;
use async_trait::async_trait;
use mq_core::{expand_template, Job, JobState, MoleQueueId, QueueConfig, QueueId};
use mq_store::JobStore;
use scheduler::{QueueLine, Scheduler};
use session::SshSession;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default remote base directory (relative to the remote user's home).
pub const DEFAULT_REMOTE_BASE: &str = "molequeue";

/// Generic SSH-driven batch queue, specialized by a [`Scheduler`].
pub struct RemoteQueue {
    config: QueueConfig,
    scheduler: Scheduler,
    session: SshSession,
    store: Arc<JobStore>,
}

impl RemoteQueue {
    pub fn new(config: QueueConfig, store: Arc<JobStore>) -> Result<Self, RegistryError> {
        let Some(scheduler) = Scheduler::for_kind(config.kind) else {
            // Registry only routes remote kinds here.
            return Err(RegistryError::MissingHost(config.name.clone()));
        };
        let Some(host) = config.host.clone() else {
            return Err(RegistryError::MissingHost(config.name.clone()));
        };
        let session = SshSession::from_config(&config, &host);
        Ok(Self { config, scheduler, session, store })
    }

    #[cfg(test)]
    pub fn with_session(mut self, session: SshSession) -> Self {
        self.session = session;
        self
    }

    fn remote_base(&self) -> &str {
        self.config.working_directory_base.as_deref().unwrap_or(DEFAULT_REMOTE_BASE)
    }

    fn remote_dir(&self, id: MoleQueueId) -> String {
        format!("{}/{}", self.remote_base(), id)
    }

    fn launch_script_name(&self) -> &str {
        self.config.launch_script_name.as_deref().unwrap_or(self.scheduler.launch_script_name)
    }

    fn submission_command(&self) -> &str {
        self.config.submission_command.as_deref().unwrap_or(self.scheduler.submission_command)
    }

    fn kill_command(&self) -> &str {
        self.config.kill_command.as_deref().unwrap_or(self.scheduler.kill_command)
    }

    fn request_queue_command(&self) -> &str {
        self.config
            .request_queue_command
            .as_deref()
            .unwrap_or(self.scheduler.request_queue_command)
    }

    /// Render the launch script for a job from the queue's template.
    fn render_launch_script(&self, job: &Job) -> Result<String, QueueError> {
        let program = resolve_program(&self.config, job)?;
        let command = render_command(program, job);
        let template =
            self.config.launch_template.as_deref().unwrap_or(self.scheduler.default_template);
        let mut vars = submission_vars(job);
        vars.insert("programExecution".to_string(), command);
        Ok(expand_template(template, mq_core::DEFAULT_TEMPLATE_DELIMITER, &vars))
    }

    /// Owned in-flight jobs: on this queue, with an acked queue id.
    fn owned_jobs(&self) -> Vec<(QueueId, MoleQueueId, JobState)> {
        self.store
            .active_jobs_on_queue(&self.config.name)
            .into_iter()
            .filter(|job| {
                matches!(
                    job.state,
                    JobState::Submitted | JobState::RemoteQueued | JobState::RunningRemote
                )
            })
            .filter_map(|job| job.queue_id.map(|qid| (qid, job.mole_queue_id, job.state)))
            .collect()
    }

    /// Apply one reported scheduler state to a job.
    async fn reconcile(&self, id: MoleQueueId, current: JobState, reported: JobState) {
        if reported == current {
            return;
        }
        match reported {
            JobState::Finished => self.finalize(id).await,
            JobState::Error => {
                if let Err(e) = self.store.fail(id, "scheduler reported an error state") {
                    warn!(job = %id, error = %e, "cannot fail job");
                }
            }
            _ => {
                // Includes transitions the graph forbids (e.g. OAR
                // re-reporting W after the job started): log and ignore.
                if let Err(e) = self.store.transition(id, reported) {
                    debug!(job = %id, %current, %reported, error = %e, "poll transition rejected");
                }
            }
        }
    }

    /// Terminal handling: retrieve outputs, clean up, mark finished.
    async fn finalize(&self, id: MoleQueueId) {
        let Some(job) = self.store.lookup(id) else { return };
        if job.is_terminal() {
            return;
        }

        if job.spec.retrieve_output {
            if let Err(e) = self.retrieve_impl(&job).await {
                if let Err(e) = self.store.fail(id, format!("output retrieval failed: {e}")) {
                    warn!(job = %id, error = %e, "cannot fail job");
                }
                return;
            }
        }

        // Deliver outputs to the caller's directory when one was named.
        if let Some(dest) = &job.spec.output_directory {
            if let Err(e) = copy_dir_contents(&job.local_working_directory, dest) {
                if let Err(e) = self.store.fail(id, format!("output delivery failed: {e}")) {
                    warn!(job = %id, error = %e, "cannot fail job");
                }
                return;
            }
        }

        if job.spec.clean_remote_files {
            let command = format!("rm -rf {}", self.remote_dir(id));
            if let Err(e) = self.session.run_remote(&command, &[]).await {
                warn!(job = %id, error = %e, "remote cleanup failed");
            }
        }

        if job.spec.clean_local_working_directory {
            if let Err(e) = std::fs::remove_dir_all(&job.local_working_directory) {
                warn!(job = %id, error = %e, "local cleanup failed");
            }
        }

        if let Err(e) = self.store.transition(id, JobState::Finished) {
            debug!(job = %id, error = %e, "finish transition rejected");
        }
    }

    async fn retrieve_impl(&self, job: &Job) -> Result<(), QueueError> {
        // Copying base/<id> under local/ merges into the existing local
        // working directory (both are named after the MoleQueue id).
        let Some(parent) = job.local_working_directory.parent() else {
            return Ok(());
        };
        self.session.copy_from_remote(&self.remote_dir(job.mole_queue_id), parent).await?;
        Ok(())
    }
}

/// Recursively copy the contents of `from` into `to`, creating `to`.
fn copy_dir_contents(from: &std::path::Path, to: &std::path::Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_contents(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[async_trait]
impl QueueBackend for RemoteQueue {
    fn type_name(&self) -> &'static str {
        self.scheduler.type_name
    }

    fn settings_snapshot(&self) -> QueueConfig {
        self.config.clone()
    }

    async fn submit(&self, job: &Job) -> Result<(), QueueError> {
        let id = job.mole_queue_id;
        let script = self.render_launch_script(job)?;
        let script_name = self.launch_script_name();
        std::fs::write(job.local_working_directory.join(script_name), script)
            .map_err(QueueError::LaunchScript)?;

        // Stage in.
        let remote_dir = self.remote_dir(id);
        self.session.run_remote(&format!("mkdir -p {remote_dir}"), &[]).await?;
        self.session.copy_to_remote(&job.local_working_directory, &remote_dir).await?;

        // Submit and parse the scheduler's id from the output.
        let command = format!("cd {remote_dir} && {} {script_name}", self.submission_command());
        let output = self.session.run_remote(&command, &[]).await?;
        let queue_id = self
            .scheduler
            .parse_queue_id(&output.stdout)
            .ok_or_else(|| QueueError::SubmitParse(output.stdout.trim().to_string()))?;

        // queue id lands before the Submitted transition commits.
        self.store.set_queue_id(id, queue_id)?;
        self.store.transition(id, JobState::Submitted)?;
        debug!(job = %id, %queue_id, queue = %self.config.name, "submitted to scheduler");
        Ok(())
    }

    async fn cancel(&self, id: MoleQueueId) -> Result<(), QueueError> {
        let Some(job) = self.store.lookup(id) else { return Ok(()) };
        if job.is_terminal() {
            return Ok(());
        }

        if let Some(queue_id) = job.queue_id {
            let command = format!("{} {queue_id}", self.kill_command());
            self.session.run_remote(&command, &[]).await?;
        }
        if let Err(e) = self.store.transition(id, JobState::Canceled) {
            debug!(job = %id, error = %e, "cancel raced a transition");
        }
        Ok(())
    }

    async fn update(&self) {
        let owned = self.owned_jobs();
        if owned.is_empty() {
            return;
        }
        let ids: Vec<QueueId> = owned.iter().map(|(qid, _, _)| *qid).collect();
        let command = self.scheduler.request_command(self.request_queue_command(), &ids);

        let output = match self
            .session
            .run_remote(&command, self.scheduler.allowed_poll_exit_codes)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                // Retries and backoff are exhausted; surface the connection
                // failure on every owned job.
                warn!(queue = %self.config.name, error = %e, "status poll failed");
                for (_, id, _) in owned {
                    if let Err(e) = self.store.fail(id, format!("connection error: {e}")) {
                        warn!(job = %id, error = %e, "cannot fail job");
                    }
                }
                return;
            }
        };

        let mut seen: HashSet<QueueId> = HashSet::new();
        for line in output.stdout.lines() {
            match self.scheduler.parse_queue_line(line) {
                QueueLine::Status { queue_id, state } => {
                    let Some((_, id, current)) =
                        owned.iter().find(|(qid, _, _)| *qid == queue_id)
                    else {
                        continue;
                    };
                    seen.insert(queue_id);
                    self.reconcile(*id, *current, state).await;
                }
                QueueLine::UnknownState { queue_id, token } => {
                    seen.insert(queue_id);
                    warn!(
                        queue = %self.config.name,
                        %queue_id,
                        token,
                        "unrecognized queue state; leaving job state unchanged"
                    );
                }
                QueueLine::Unparseable => {}
            }
        }

        // Jobs that vanished from the listing are done; retrieve them.
        for (queue_id, id, state) in owned {
            if !seen.contains(&queue_id) && state.is_remote_inflight() {
                debug!(job = %id, %queue_id, "job left the scheduler listing; finalizing");
                self.finalize(id).await;
            }
        }
    }

    async fn retrieve(&self, id: MoleQueueId) -> Result<(), QueueError> {
        match self.store.lookup(id) {
            Some(job) => self.retrieve_impl(&job).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
