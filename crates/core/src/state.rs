// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Job lifecycle states and the legal-transition table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a job.
///
/// Serialized with the variant name as the wire string (`"RemoteQueued"`,
/// `"RunningLocal"`, ...), which is what clients and the persisted job
/// records use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum JobState {
    /// Record exists but has not been accepted yet.
    #[default]
    None,
    /// Record committed, working directory created, input files written.
    Accepted,
    /// Handed to a backend queue, awaiting its ack.
    Submitted,
    /// Remote scheduler assigned a queue id; waiting for resources.
    RemoteQueued,
    /// Executing on the remote host.
    RunningRemote,
    /// Executing as a local child process.
    RunningLocal,
    /// Exited with code 0 (outputs retrieved for remote jobs).
    Finished,
    /// Canceled before or during execution at the user's request.
    Canceled,
    /// Forcibly terminated while running.
    Killed,
    /// Failed: non-zero exit, backend error, or staging error.
    Error,
}

crate::simple_display! {
    JobState {
        None => "None",
        Accepted => "Accepted",
        Submitted => "Submitted",
        RemoteQueued => "RemoteQueued",
        RunningRemote => "RunningRemote",
        RunningLocal => "RunningLocal",
        Finished => "Finished",
        Canceled => "Canceled",
        Killed => "Killed",
        Error => "Error",
    }
}

impl JobState {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Finished | JobState::Canceled | JobState::Killed | JobState::Error
        )
    }

    /// True for states where a remote scheduler owns the job; such jobs
    /// survive a broker restart and resume polling.
    pub fn is_remote_inflight(self) -> bool {
        matches!(self, JobState::RemoteQueued | JobState::RunningRemote)
    }
}

/// Whether `from -> to` is an edge of the lifecycle graph.
pub fn legal_transition(from: JobState, to: JobState) -> bool {
    use JobState::*;
    matches!(
        (from, to),
        (None, Accepted)
            | (Accepted, Submitted)
            | (Submitted, RemoteQueued)
            | (Submitted, RunningLocal)
            | (Submitted, RunningRemote)
            | (RemoteQueued, RunningRemote)
            // a remote job can finish (or disappear) between polls
            | (RemoteQueued, Finished)
            | (RunningLocal, Finished)
            | (RunningRemote, Finished)
            // staging can fail before the record is accepted
            | (None, Error)
            | (Accepted, Error)
            | (Submitted, Error)
            | (RemoteQueued, Error)
            | (RunningLocal, Error)
            | (RunningRemote, Error)
            | (None, Canceled)
            | (Accepted, Canceled)
            | (Submitted, Canceled)
            | (RemoteQueued, Canceled)
            | (RunningLocal, Canceled)
            | (RunningRemote, Canceled)
            | (RunningLocal, Killed)
            | (RunningRemote, Killed)
    )
}

/// A transition that is not an edge of the lifecycle graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal job state transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: JobState,
    pub to: JobState,
}

impl JobState {
    /// Validate a transition out of `self`, refusing terminal exits and
    /// edges not in the lifecycle graph.
    pub fn check_transition(self, to: JobState) -> Result<(), IllegalTransition> {
        if self.is_terminal() || !legal_transition(self, to) {
            return Err(IllegalTransition { from: self, to });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
