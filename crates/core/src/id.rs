// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Identifier newtypes.
//!
//! A [`MoleQueueId`] is assigned exactly once by the job store and is unique
//! for the lifetime of a broker instance. A [`QueueId`] is whatever integer
//! the remote scheduler hands back on submission (e.g. a SLURM batch id).

use serde::{Deserialize, Serialize};

/// Broker-assigned job identifier. Monotonic, positive, never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct MoleQueueId(pub u64);

impl MoleQueueId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MoleQueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MoleQueueId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Backend-assigned job identifier, absent until the scheduler acks submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(pub u64);

impl QueueId {
    pub fn value(self) -> u64 {
        self.0
    }

    /// Parse a scheduler id from its decimal form. The inverse of `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse::<u64>().ok().map(Self)
    }
}

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for QueueId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
