// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Per-scheduler data: literal commands, submission-output regexes, and
//! status-line parsing for SGE, PBS/Torque, SLURM, and OAR.
//!
//! Backend differences live entirely here; the remote queue skeleton is
//! shared. Note the SLURM quirk inherited from long-observed behavior:
//! terminal letters (CA/CD/CG/F/NF/TO/...) map to `RunningRemote` and the
//! job is finalized when its row disappears from `squeue` output.

use mq_core::{JobState, QueueId, QueueKind};
use regex::Regex;

/// Result of parsing one line of queue-status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueLine {
    /// A known id/state pair.
    Status { queue_id: QueueId, state: JobState },
    /// The id parsed but the state letter is not in the table; the job's
    /// state is left unchanged (and the caller logs a warning).
    UnknownState { queue_id: QueueId, token: String },
    /// Headers, separators, anything else.
    Unparseable,
}

/// Literal commands and parsers for one scheduler family.
pub struct Scheduler {
    pub kind: QueueKind,
    pub type_name: &'static str,
    pub submission_command: &'static str,
    pub kill_command: &'static str,
    pub request_queue_command: &'static str,
    pub launch_script_name: &'static str,
    pub default_template: &'static str,
    /// Exit codes of the poll command that mean "nothing to report", not
    /// failure. PBS/Torque returns 153 when stat-ing a completed job.
    pub allowed_poll_exit_codes: &'static [i32],
    submit_id_regex: Regex,
    status_line_regex: Regex,
}

impl Scheduler {
    pub fn for_kind(kind: QueueKind) -> Option<Self> {
        match kind {
            QueueKind::Local => None,
            QueueKind::Sge => Some(Self::sge()),
            QueueKind::Pbs => Some(Self::pbs()),
            QueueKind::Slurm => Some(Self::slurm()),
            QueueKind::Oar => Some(Self::oar()),
        }
    }

    pub fn sge() -> Self {
        Self {
            kind: QueueKind::Sge,
            type_name: "remote-sge",
            submission_command: "qsub",
            kill_command: "qdel",
            request_queue_command: "qstat",
            launch_script_name: "job.sge",
            default_template: SGE_TEMPLATE,
            allowed_poll_exit_codes: &[],
            // "Your job 1234 ("name") has been submitted"
            submit_id_regex: compile(r"Your job (\d+)"),
            // job-ID  prior  name  user  state  submit/start ...
            status_line_regex: compile(r"^\s*(\d+)\s+\S+\s+\S+\s+\S+\s+(\S+)"),
        }
    }

    pub fn pbs() -> Self {
        Self {
            kind: QueueKind::Pbs,
            type_name: "remote-pbs",
            submission_command: "qsub",
            kill_command: "qdel",
            request_queue_command: "qstat",
            launch_script_name: "job.pbs",
            default_template: PBS_TEMPLATE,
            // qstat exits 153 when asked about a completed job.
            allowed_poll_exit_codes: &[153],
            // "4807.host.domain"
            submit_id_regex: compile(r"(\d+)\."),
            // Job id  Name  User  Time Use  S  Queue
            status_line_regex: compile(r"^\s*(\d+)\.\S*\s+\S+\s+\S+\s+\S+\s+(\S+)"),
        }
    }

    pub fn slurm() -> Self {
        Self {
            kind: QueueKind::Slurm,
            type_name: "remote-slurm",
            submission_command: "sbatch",
            kill_command: "scancel",
            request_queue_command: "squeue",
            launch_script_name: "job.slurm",
            default_template: SLURM_TEMPLATE,
            allowed_poll_exit_codes: &[],
            // "Submitted batch job 1234"
            submit_id_regex: compile(r"(?m)^Submitted batch job (\d+)$"),
            // JOBID  PARTITION  NAME  USER  ST  TIME  NODES  NODELIST(REASON)
            status_line_regex: compile(r"^\s*(\d+)\s+\S+\s+\S+\s+\S+\s+(\w+)"),
        }
    }

    pub fn oar() -> Self {
        Self {
            kind: QueueKind::Oar,
            type_name: "remote-oar",
            submission_command: "oarsub -S",
            kill_command: "oardel",
            request_queue_command: "oarstat",
            launch_script_name: "job-oar.sh",
            default_template: OAR_TEMPLATE,
            allowed_poll_exit_codes: &[],
            // Transcripts end with "OAR_JOB_ID=8160421"
            submit_id_regex: compile(r"OAR_JOB_ID=(\d+)"),
            // Job id  S  User  Duration  System message
            status_line_regex: compile(r"^\s*(\d+)\s+(\w+)\s+\S+"),
        }
    }

    /// Extract the scheduler's job id from submission output. Searches the
    /// whole (possibly multi-line) transcript.
    pub fn parse_queue_id(&self, submission_output: &str) -> Option<QueueId> {
        let captures = self.submit_id_regex.captures(submission_output)?;
        QueueId::parse(captures.get(1)?.as_str())
    }

    /// Parse one line of queue-status output into `(queueId, JobState)`.
    pub fn parse_queue_line(&self, line: &str) -> QueueLine {
        let Some(captures) = self.status_line_regex.captures(line) else {
            return QueueLine::Unparseable;
        };
        let Some(queue_id) = captures.get(1).and_then(|m| QueueId::parse(m.as_str())) else {
            return QueueLine::Unparseable;
        };
        let token = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        match self.map_state_token(&token.to_lowercase()) {
            Some(state) => QueueLine::Status { queue_id, state },
            None => QueueLine::UnknownState { queue_id, token: token.to_string() },
        }
    }

    fn map_state_token(&self, token: &str) -> Option<JobState> {
        match self.kind {
            QueueKind::Local => None,
            QueueKind::Sge => match token {
                "qw" => Some(JobState::RemoteQueued),
                "r" => Some(JobState::RunningRemote),
                "eqw" => Some(JobState::Error),
                "dr" => Some(JobState::Canceled),
                _ => None,
            },
            QueueKind::Pbs => match token {
                "q" => Some(JobState::RemoteQueued),
                "r" => Some(JobState::RunningRemote),
                "c" => Some(JobState::Finished),
                "e" => Some(JobState::Error),
                _ => None,
            },
            // SLURM terminal letters deliberately map to RunningRemote;
            // completion is reconciled when the row disappears.
            QueueKind::Slurm => match token {
                "cf" | "pd" => Some(JobState::RemoteQueued),
                "ca" | "cd" | "cg" | "f" | "nf" | "pr" | "r" | "s" | "to" => {
                    Some(JobState::RunningRemote)
                }
                _ => None,
            },
            QueueKind::Oar => match token {
                "l" => Some(JobState::Accepted),
                "w" => Some(JobState::Submitted),
                "r" => Some(JobState::RunningRemote),
                "e" => Some(JobState::Error),
                "t" | "f" => Some(JobState::Finished),
                _ => None,
            },
        }
    }

    /// Build the poll command restricted to the owned ids.
    pub fn request_command(&self, base: &str, ids: &[QueueId]) -> String {
        let joined: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        match self.kind {
            // squeue -j 1,2,3
            QueueKind::Slurm => format!("{base} -j {}", joined.join(",")),
            // oarstat 1 -j 2 -j 3
            QueueKind::Oar => format!("{base} {}", joined.join(" -j ")),
            // qstat 1 2 3
            _ => format!("{base} {}", joined.join(" ")),
        }
    }
}

#[allow(clippy::unwrap_used)] // patterns are literals, covered by tests
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

const SGE_TEMPLATE: &str = "#!/bin/sh\n\
#\n\
#$ -S /bin/sh\n\
#$ -N MoleQueueJob-$$moleQueueId$$\n\
#$ -l h_rt=$$maxWallTime$$\n\
#$ -pe smp $$numberOfCores$$\n\
#$ -cwd\n\
\n\
$$programExecution$$\n";

const PBS_TEMPLATE: &str = "#!/bin/sh\n\
#\n\
#PBS -N MoleQueueJob-$$moleQueueId$$\n\
#PBS -l walltime=$$maxWallTime$$\n\
#PBS -l nodes=1:ppn=$$numberOfCores$$\n\
\n\
cd $PBS_O_WORKDIR\n\
$$programExecution$$\n";

const SLURM_TEMPLATE: &str = "#!/bin/sh\n\
#\n\
#SBATCH --job-name=\"MoleQueueJob-$$moleQueueId$$\"\n\
#SBATCH --time=$$maxWallTime$$\n\
#SBATCH --nodes=1\n\
#SBATCH --ntasks-per-node=$$numberOfCores$$\n\
\n\
cd $SLURM_SUBMIT_DIR\n\
$$programExecution$$\n";

const OAR_TEMPLATE: &str = "#!/bin/sh\n\
#OAR -n MoleQueueJob-$$moleQueueId$$\n\
#OAR -l core=$$numberOfCores$$,walltime=$$maxWallTime$$\n\
\n\
cd $OAR_WORKDIR\n\
$$programExecution$$\n";

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
