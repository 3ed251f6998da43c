// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Settings file and on-disk workdir layout.
//!
//! ```text
//! <workdir>/
//!   config/config.toml      settings
//!   local/<id>/             per-job working directories
//!   jobs/job-<id>.json      persisted job records
//!   log/log-YYYYMMDD.jsonl  append-only event log
//!   molequeue.lock          instance lock (holds the PID)
//! ```

use mq_core::QueueConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default socket name; the listener binds `<tmp>/<socket_name>`.
pub const DEFAULT_SOCKET_NAME: &str = "MoleQueue";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Daemon settings, loaded from `config/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_name: Option<String>,
    /// Queue definitions, in listing order.
    #[serde(default, rename = "queue")]
    pub queues: Vec<QueueConfig>,
}

impl Settings {
    /// Load settings, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn socket_name(&self) -> &str {
        self.socket_name.as_deref().unwrap_or(DEFAULT_SOCKET_NAME)
    }
}

/// Paths inside a broker workdir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Platform default: the local data dir, e.g. `~/.local/share/molequeue`.
    pub fn default_root() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("molequeue")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config").join("config.toml")
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join("jobs")
    }

    pub fn local_dir(&self) -> PathBuf {
        self.root.join("local")
    }

    pub fn job_working_dir(&self, id: mq_core::MoleQueueId) -> PathBuf {
        self.local_dir().join(id.to_string())
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join("molequeue.lock")
    }

    /// Create the directory skeleton.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        for dir in [
            self.root.join("config"),
            self.jobs_dir(),
            self.local_dir(),
            self.log_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Resolve the socket path for a socket name under the platform temp area.
pub fn socket_path(socket_name: &str) -> PathBuf {
    std::env::temp_dir().join(socket_name)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
