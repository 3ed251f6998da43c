// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Parameter and result DTOs for the broker's JSON-RPC methods.
//!
//! Wire field names are camelCase (the de-facto MoleQueue client protocol);
//! conversion to and from the snake_case domain model happens here.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use mq_core::{FileSpec, Job, JobSpec, JobState, MoleQueueId, QueueId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An input file on the wire: inline contents or a client-local path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl WireFile {
    /// Resolve into a [`FileSpec`]; `None` when neither contents nor path
    /// was supplied or no filename can be derived.
    pub fn into_file_spec(self) -> Option<FileSpec> {
        if let Some(contents) = self.contents {
            let filename = self.filename?;
            return Some(FileSpec::from_contents(filename, contents));
        }
        let path = self.path?;
        let filename = match self.filename {
            Some(name) => name,
            None => path.file_name()?.to_string_lossy().into_owned(),
        };
        Some(FileSpec::from_path(filename, path))
    }
}

fn default_processors() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// `submitJob` params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobParams {
    pub queue: String,
    pub program: String,
    #[serde(default)]
    pub description: String,
    /// Main input file supplied inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_as_string: Option<String>,
    /// Main input file supplied as a file spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_file: Option<WireFile>,
    /// Additional input files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<WireFile>,
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

/// Filename used when the main input arrives as `inputAsString`.
pub const INLINE_INPUT_FILENAME: &str = "input.in";

impl SubmitJobParams {
    pub fn new(queue: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            program: program.into(),
            description: String::new(),
            input_as_string: None,
            input_file: None,
            files: Vec::new(),
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

    /// Lower the wire params into the domain [`JobSpec`].
    pub fn into_spec(self) -> JobSpec {
        let mut input_files = Vec::new();
        if let Some(contents) = self.input_as_string {
            input_files.push(FileSpec::from_contents(INLINE_INPUT_FILENAME, contents));
        }
        if let Some(file) = self.input_file.and_then(WireFile::into_file_spec) {
            input_files.push(file);
        }
        input_files.extend(self.files.into_iter().filter_map(WireFile::into_file_spec));

        JobSpec {
            queue: self.queue,
            program: self.program,
            description: self.description,
            input_files,
            output_directory: self.output_directory,
            number_of_processors: self.number_of_processors.max(1),
            max_wall_time_minutes: self.max_wall_time_minutes,
            clean_remote_files: self.clean_remote_files,
            retrieve_output: self.retrieve_output,
            clean_local_working_directory: self.clean_local_working_directory,
            hide_from_gui: self.hide_from_gui,
            popup_on_state_change: self.popup_on_state_change,
        }
    }
}

/// `submitJob` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResult {
    pub mole_queue_id: MoleQueueId,
    pub local_working_directory: PathBuf,
}

/// `cancelJob` params.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelJobParams {
    pub mole_queue_id: MoleQueueId,
}

/// `cancelJob` result (success only).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelJobResult {
    pub mole_queue_id: MoleQueueId,
}

/// `lookupJob` params.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupJobParams {
    pub mole_queue_id: MoleQueueId,
}

/// `listQueues` result: queue name -> program names, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ListQueuesResult(pub IndexMap<String, Vec<String>>);

/// Full job record as returned by `lookupJob`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    pub mole_queue_id: MoleQueueId,
    pub queue: String,
    pub program: String,
    pub description: String,
    pub state: JobState,
    pub submit_time: DateTime<Utc>,
    pub last_state_change: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<QueueId>,
    pub local_working_directory: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<PathBuf>,
    pub number_of_processors: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wall_time_minutes: Option<i64>,
    pub clean_remote_files: bool,
    pub retrieve_output: bool,
    pub clean_local_working_directory: bool,
    pub hide_from_gui: bool,
    pub popup_on_state_change: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&Job> for JobDetail {
    fn from(job: &Job) -> Self {
        Self {
            mole_queue_id: job.mole_queue_id,
            queue: job.spec.queue.clone(),
            program: job.spec.program.clone(),
            description: job.spec.description.clone(),
            state: job.state,
            submit_time: job.submit_time,
            last_state_change: job.last_state_change,
            queue_id: job.queue_id,
            local_working_directory: job.local_working_directory.clone(),
            output_directory: job.spec.output_directory.clone(),
            number_of_processors: job.spec.number_of_processors,
            max_wall_time_minutes: job.spec.max_wall_time_minutes,
            clean_remote_files: job.spec.clean_remote_files,
            retrieve_output: job.spec.retrieve_output,
            clean_local_working_directory: job.spec.clean_local_working_directory,
            hide_from_gui: job.spec.hide_from_gui,
            popup_on_state_change: job.spec.popup_on_state_change,
            exit_code: job.exit_code,
            error_message: job.error_message.clone(),
        }
    }
}

/// `jobStateChanged` notification payload (server -> client).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStateChangeNotification {
    pub mole_queue_id: MoleQueueId,
    pub old_state: JobState,
    pub new_state: JobState,
}

#[cfg(test)]
#[path = "methods_tests.rs"]
mod tests;
