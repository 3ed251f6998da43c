// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! The job store: id assignment, lookups, state transitions, observers.
//!
//! All access goes through typed methods; backends never touch job fields
//! directly. Transitions are committed (validated, applied, persisted)
//! under one lock, so per-job state history is totally ordered. Observers
//! run synchronously after the commit and must only enqueue — they are
//! called with the store lock held and must never call back into the store.

use crate::persist::{self, PersistError};
use mq_core::{Clock, IllegalTransition, Job, JobSpec, JobState, MoleQueueId, QueueId, StateChange};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Error message recorded on jobs interrupted by a daemon restart.
pub const RESTART_ERROR_MESSAGE: &str = "interrupted by restart";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown moleQueueId: {0}")]
    UnknownJob(MoleQueueId),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("job {0} is not in a terminal state")]
    NotTerminal(MoleQueueId),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

type Observer = Box<dyn Fn(&StateChange) + Send + Sync>;

struct Inner {
    jobs: BTreeMap<MoleQueueId, Job>,
    next_id: u64,
    observers: Vec<Observer>,
}

/// Authoritative mapping of `MoleQueueId -> Job`.
pub struct JobStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    jobs_dir: PathBuf,
}

impl JobStore {
    /// Open the store, reloading persisted records and applying the restart
    /// policy: local-side in-flight jobs whose processes died with the old
    /// daemon go to `Error`; remote in-flight jobs resume polling.
    ///
    /// Returns the store and the restart transitions, for the caller to log.
    pub fn open(
        jobs_dir: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, Vec<StateChange>), StoreError> {
        let jobs_dir = jobs_dir.into();
        let loaded = persist::load_jobs(&jobs_dir)?;

        let mut jobs = BTreeMap::new();
        let mut next_id = 1;
        let mut interrupted = Vec::new();
        for mut job in loaded {
            next_id = next_id.max(job.mole_queue_id.value() + 1);
            if !job.state.is_terminal() && !job.state.is_remote_inflight() {
                // Accepted / Submitted / RunningLocal (or half-created None):
                // the process died with the previous daemon instance.
                let now = clock.now_utc();
                job.error_message = Some(RESTART_ERROR_MESSAGE.to_string());
                match job.apply_transition(JobState::Error, now) {
                    Ok(change) => interrupted.push(change),
                    Err(e) => warn!(job = %job.mole_queue_id, error = %e, "restart fixup failed"),
                }
                persist::write_job(&jobs_dir, &job)?;
            }
            jobs.insert(job.mole_queue_id, job);
        }

        if !interrupted.is_empty() {
            info!(count = interrupted.len(), "failed jobs interrupted by restart");
        }

        let store = Self {
            inner: Mutex::new(Inner { jobs, next_id, observers: Vec::new() }),
            clock,
            jobs_dir,
        };
        Ok((store, interrupted))
    }

    /// Register a synchronous change observer. Observers run after each
    /// commit, in registration order, and must only enqueue.
    pub fn subscribe(&self, observer: impl Fn(&StateChange) + Send + Sync + 'static) {
        self.inner.lock().observers.push(Box::new(observer));
    }

    /// Create a new record in state `None`, assigning the next id.
    pub fn create(&self, spec: JobSpec) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock();
        let id = MoleQueueId(inner.next_id);
        inner.next_id += 1;

        let job = Job::new(id, spec, self.clock.as_ref());
        persist::write_job(&self.jobs_dir, &job)?;
        persist::write_index(&self.jobs_dir, inner.jobs.keys().copied().chain([id]))?;
        inner.jobs.insert(id, job.clone());
        Ok(job)
    }

    /// Snapshot of one job.
    pub fn lookup(&self, id: MoleQueueId) -> Option<Job> {
        self.inner.lock().jobs.get(&id).cloned()
    }

    /// Snapshot of all jobs, in id order.
    pub fn jobs(&self) -> Vec<Job> {
        self.inner.lock().jobs.values().cloned().collect()
    }

    /// Jobs on the named queue that are not terminal, in id order.
    pub fn active_jobs_on_queue(&self, queue: &str) -> Vec<Job> {
        self.inner
            .lock()
            .jobs
            .values()
            .filter(|j| j.spec.queue == queue && !j.is_terminal())
            .cloned()
            .collect()
    }

    /// Commit a state transition: validate, apply, persist, then notify.
    pub fn transition(&self, id: MoleQueueId, to: JobState) -> Result<StateChange, StoreError> {
        let mut inner = self.inner.lock();
        let now = self.clock.now_utc();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::UnknownJob(id))?;
        let change = job.apply_transition(to, now)?;
        persist::write_job(&self.jobs_dir, job)?;

        for observer in &inner.observers {
            observer(&change);
        }
        Ok(change)
    }

    /// Transition to `Error` with a message; the usual path for backend and
    /// staging failures.
    pub fn fail(
        &self,
        id: MoleQueueId,
        message: impl Into<String>,
    ) -> Result<StateChange, StoreError> {
        let mut inner = self.inner.lock();
        let now = self.clock.now_utc();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::UnknownJob(id))?;
        // Validate before touching the record so a rejected transition
        // leaves the message untouched.
        job.state.check_transition(JobState::Error)?;
        job.error_message = Some(message.into());
        let change = job.apply_transition(JobState::Error, now)?;
        persist::write_job(&self.jobs_dir, job)?;

        for observer in &inner.observers {
            observer(&change);
        }
        Ok(change)
    }

    /// Set the backend-assigned queue id (required before `RemoteQueued`).
    pub fn set_queue_id(&self, id: MoleQueueId, queue_id: QueueId) -> Result<(), StoreError> {
        self.update(id, |job| job.queue_id = Some(queue_id))
    }

    /// Record the exit code of a finished or failed job.
    pub fn set_exit_code(&self, id: MoleQueueId, exit_code: i32) -> Result<(), StoreError> {
        self.update(id, |job| job.exit_code = Some(exit_code))
    }

    /// Set the per-job working directory (assigned at submission time).
    pub fn set_local_working_directory(
        &self,
        id: MoleQueueId,
        dir: impl Into<PathBuf>,
    ) -> Result<(), StoreError> {
        let dir = dir.into();
        self.update(id, move |job| job.local_working_directory = dir)
    }

    fn update(
        &self,
        id: MoleQueueId,
        mutate: impl FnOnce(&mut Job),
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::UnknownJob(id))?;
        mutate(job);
        persist::write_job(&self.jobs_dir, job)?;
        Ok(())
    }

    /// Remove a terminal job and its persisted record.
    pub fn remove(&self, id: MoleQueueId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.get(&id).ok_or(StoreError::UnknownJob(id))?;
        if !job.is_terminal() {
            return Err(StoreError::NotTerminal(id));
        }
        persist::remove_job(&self.jobs_dir, id)?;
        inner.jobs.remove(&id);
        persist::write_index(&self.jobs_dir, inner.jobs.keys().copied())?;
        Ok(())
    }

    /// Directory holding the persisted records.
    pub fn jobs_dir(&self) -> &Path {
        &self.jobs_dir
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
