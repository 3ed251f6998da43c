// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Queue backends and the registry that routes jobs to them.
//!
//! The registry maps queue names to backends in configuration order; each
//! backend drives its jobs through the store's typed methods and never
//! touches record fields directly.

pub mod local;
pub mod remote;

use async_trait::async_trait;
use indexmap::IndexMap;
use mq_core::{Job, MoleQueueId, Program, QueueConfig};
use mq_store::{JobStore, StoreError};
use mq_wire::ListQueuesResult;
use remote::session::SessionError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("unknown program: {0}")]
    UnknownProgram(String),

    #[error("cannot write launch script: {0}")]
    LaunchScript(#[source] std::io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("cannot parse queue id from submission output: {0:?}")]
    SubmitParse(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The uniform contract between the server core and a concrete queue.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Stable backend type name (e.g. `"remote-slurm"`).
    fn type_name(&self) -> &'static str;

    /// Configuration snapshot for introspection.
    fn settings_snapshot(&self) -> QueueConfig;

    /// Take ownership of an `Accepted` job and hand it to the backend.
    /// Transitions the job to `Submitted` on success.
    async fn submit(&self, job: &Job) -> Result<(), QueueError>;

    /// Best-effort, idempotent cancellation.
    async fn cancel(&self, id: MoleQueueId) -> Result<(), QueueError>;

    /// Poll the backend for the status of all owned jobs.
    async fn update(&self);

    /// Fetch output files into the local working directory (remote only).
    async fn retrieve(&self, id: MoleQueueId) -> Result<(), QueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate queue name: {0}")]
    DuplicateQueue(String),

    #[error("remote queue {0} has no host configured")]
    MissingHost(String),
}

/// Named, typed queues in configuration order.
pub struct QueueRegistry {
    queues: IndexMap<String, Arc<dyn QueueBackend>>,
}

impl std::fmt::Debug for QueueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueRegistry").field("queues", &self.queues.keys().collect::<Vec<_>>()).finish()
    }
}

impl QueueRegistry {
    /// Build one backend per configuration entry.
    pub fn build(configs: &[QueueConfig], store: &Arc<JobStore>) -> Result<Self, RegistryError> {
        let mut queues: IndexMap<String, Arc<dyn QueueBackend>> = IndexMap::new();
        for config in configs {
            let backend: Arc<dyn QueueBackend> = if config.kind.is_remote() {
                Arc::new(remote::RemoteQueue::new(config.clone(), Arc::clone(store))?)
            } else {
                Arc::new(local::LocalQueue::new(config.clone(), Arc::clone(store)))
            };
            if queues.insert(config.name.clone(), backend).is_some() {
                return Err(RegistryError::DuplicateQueue(config.name.clone()));
            }
        }
        Ok(Self { queues })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn QueueBackend>> {
        self.queues.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// `listQueues` view: queue name -> program names, insertion-ordered.
    pub fn listing(&self) -> ListQueuesResult {
        let mut listing = IndexMap::new();
        for (name, backend) in &self.queues {
            listing.insert(name.clone(), backend.settings_snapshot().program_names());
        }
        ListQueuesResult(listing)
    }

    /// Spawn one periodic poll task per remote queue.
    pub fn start_pollers(&self, shutdown: CancellationToken) {
        for (name, backend) in &self.queues {
            let config = backend.settings_snapshot();
            if !config.kind.is_remote() {
                continue;
            }
            let backend = Arc::clone(backend);
            let name = name.clone();
            let shutdown = shutdown.clone();
            let period = Duration::from_secs(config.poll_interval_secs.max(1));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // The first tick fires immediately: restart-resumed jobs
                // get reconciled without waiting a full period.
                loop {
                    tokio::select! {
                        _ = ticker.tick() => backend.update().await,
                        _ = shutdown.cancelled() => break,
                    }
                }
                tracing::debug!(queue = %name, "poller stopped");
            });
        }
    }
}

/// Per-submission template bindings shared by every backend.
///
/// Keys match the launch-template placeholders: `$$moleQueueId$$`,
/// `$$numberOfCores$$`, `$$maxWallTime$$`.
pub fn submission_vars(job: &Job) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("moleQueueId".to_string(), job.mole_queue_id.to_string());
    vars.insert("numberOfCores".to_string(), job.spec.number_of_processors.to_string());
    let minutes = job.spec.max_wall_time_minutes.unwrap_or(24 * 60).max(1);
    vars.insert("maxWallTime".to_string(), format!("{:02}:{:02}:00", minutes / 60, minutes % 60));
    vars
}

/// Expand a program's run command for one job.
pub fn render_command(program: &Program, job: &Job) -> String {
    program.expand_with(&submission_vars(job))
}

/// Resolve a job's program from the queue configuration.
pub fn resolve_program<'a>(
    config: &'a QueueConfig,
    job: &Job,
) -> Result<&'a Program, QueueError> {
    config.program(&job.spec.program).ok_or_else(|| {
        warn!(job = %job.mole_queue_id, program = %job.spec.program, "program vanished from queue");
        QueueError::UnknownProgram(job.spec.program.clone())
    })
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
