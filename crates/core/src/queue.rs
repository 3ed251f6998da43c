// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Queue configuration model.
//!
//! Queues are defined in the daemon's configuration file and are immutable
//! at runtime; the daemon builds one backend per entry.

use crate::program::Program;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which backend drives a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueKind {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "remote-sge")]
    Sge,
    #[serde(rename = "remote-pbs")]
    Pbs,
    #[serde(rename = "remote-slurm")]
    Slurm,
    #[serde(rename = "remote-oar")]
    Oar,
}

crate::simple_display! {
    QueueKind {
        Local => "local",
        Sge => "remote-sge",
        Pbs => "remote-pbs",
        Slurm => "remote-slurm",
        Oar => "remote-oar",
    }
}

impl QueueKind {
    pub fn is_remote(self) -> bool {
        !matches!(self, QueueKind::Local)
    }
}

fn default_ssh_port() -> u16 {
    22
}

fn default_poll_interval() -> u64 {
    60
}

/// Configuration for one queue. Remote-only fields are ignored by the local
/// backend; command overrides default to the scheduler's stock commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: QueueKind,
    #[serde(default)]
    pub programs: Vec<Program>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_script_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kill_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_queue_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory_base: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Local queue only: process-pool cap. Defaults to the host core count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>, kind: QueueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            programs: Vec::new(),
            launch_template: None,
            launch_script_name: None,
            submission_command: None,
            kill_command: None,
            request_queue_command: None,
            host: None,
            user: None,
            ssh_port: default_ssh_port(),
            identity_file: None,
            working_directory_base: None,
            poll_interval_secs: default_poll_interval(),
            concurrency: None,
        }
    }

    pub fn with_program(mut self, program: Program) -> Self {
        self.programs.push(program);
        self
    }

    pub fn program(&self, name: &str) -> Option<&Program> {
        self.programs.iter().find(|p| p.name == name)
    }

    /// Program names in definition order (the `listQueues` contract).
    pub fn program_names(&self) -> Vec<String> {
        self.programs.iter().map(|p| p.name.clone()).collect()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
