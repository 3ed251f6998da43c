// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Structured event-log entries.
//!
//! The daemon appends these as JSON lines to `log/log-YYYYMMDD.jsonl`;
//! entries tagged with a job id support per-job filtering.

use crate::id::MoleQueueId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

crate::simple_display! {
    LogLevel {
        Info => "info",
        Warn => "warn",
        Error => "error",
    }
}

/// One line of the append-only event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mole_queue_id: Option<MoleQueueId>,
    pub message: String,
}

impl EventEntry {
    fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self { at: Utc::now(), level, mole_queue_id: None, message: message.into() }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn for_job(mut self, id: MoleQueueId) -> Self {
        self.mole_queue_id = Some(id);
        self
    }

    /// Pin the timestamp (entries default to wall-clock time at creation).
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }
}
