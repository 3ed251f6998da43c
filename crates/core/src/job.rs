// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Job records and their lifecycle bookkeeping.
//!
//! A [`Job`] is the value stored by the job store; clients hold only the
//! [`MoleQueueId`] key. State changes go through [`Job::apply_transition`]
//! so the legal-transition table and the per-job event log are enforced in
//! one place.

use crate::clock::Clock;
use crate::id::{MoleQueueId, QueueId};
use crate::state::{IllegalTransition, JobState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cap on the per-job transition history. The full history also lands in the
/// daemon's append-only event log; the in-record copy is for quick lookup.
pub const MAX_TRANSITION_HISTORY: usize = 32;

/// Content of one input file: inline payload or a path to copy from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSource {
    /// Literal file contents supplied by the client.
    Contents(String),
    /// Path on the local filesystem to copy into the working directory.
    Path(PathBuf),
}

/// An input file for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub filename: String,
    pub source: FileSource,
}

impl FileSpec {
    pub fn from_contents(filename: impl Into<String>, contents: impl Into<String>) -> Self {
        Self { filename: filename.into(), source: FileSource::Contents(contents.into()) }
    }

    pub fn from_path(filename: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { filename: filename.into(), source: FileSource::Path(path.into()) }
    }
}

/// Client-supplied description of a job, as accepted by `submitJob`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub queue: String,
    pub program: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_files: Vec<FileSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<PathBuf>,
    #[serde(default = "default_processors")]
    pub number_of_processors: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wall_time_minutes: Option<i64>,
    #[serde(default)]
    pub clean_remote_files: bool,
    #[serde(default = "default_true")]
    pub retrieve_output: bool,
    #[serde(default)]
    pub clean_local_working_directory: bool,
    #[serde(default)]
    pub hide_from_gui: bool,
    #[serde(default)]
    pub popup_on_state_change: bool,
}

fn default_processors() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl JobSpec {
    pub fn new(queue: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            program: program.into(),
            description: String::new(),
            input_files: Vec::new(),
            output_directory: None,
            number_of_processors: 1,
            max_wall_time_minutes: None,
            clean_remote_files: false,
            retrieve_output: true,
            clean_local_working_directory: false,
            hide_from_gui: false,
            popup_on_state_change: false,
        }
    }
}

/// One committed state transition, as recorded in the job and broadcast to
/// clients as a `jobStateChanged` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub mole_queue_id: MoleQueueId,
    pub from: JobState,
    pub to: JobState,
    pub at: DateTime<Utc>,
}

/// Per-job event log entry (bounded; see [`MAX_TRANSITION_HISTORY`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub at: DateTime<Utc>,
    pub from: JobState,
    pub to: JobState,
}

/// A job record: immutable identity, client-supplied spec, runtime fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub mole_queue_id: MoleQueueId,
    pub submit_time: DateTime<Utc>,
    #[serde(flatten)]
    pub spec: JobSpec,
    /// Backend-assigned id; absent until the scheduler acks submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<QueueId>,
    pub local_working_directory: PathBuf,
    pub state: JobState,
    pub last_state_change: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
}

impl Job {
    /// Create a new record in state `None`. The store assigns the id; the
    /// server fills `local_working_directory` before accepting the job.
    pub fn new(mole_queue_id: MoleQueueId, spec: JobSpec, clock: &dyn Clock) -> Self {
        let now = clock.now_utc();
        Self {
            mole_queue_id,
            submit_time: now,
            spec,
            queue_id: None,
            local_working_directory: PathBuf::new(),
            state: JobState::None,
            last_state_change: now,
            exit_code: None,
            error_message: None,
            transitions: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply a state transition, validating it against the lifecycle graph.
    ///
    /// On success the record's state, timestamp, and transition history are
    /// updated and the committed [`StateChange`] is returned for broadcast.
    pub fn apply_transition(
        &mut self,
        to: JobState,
        now: DateTime<Utc>,
    ) -> Result<StateChange, IllegalTransition> {
        self.state.check_transition(to)?;
        let change =
            StateChange { mole_queue_id: self.mole_queue_id, from: self.state, to, at: now };
        self.state = to;
        self.last_state_change = now;
        if self.transitions.len() == MAX_TRANSITION_HISTORY {
            self.transitions.remove(0);
        }
        self.transitions.push(TransitionRecord { at: now, from: change.from, to });
        Ok(change)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
