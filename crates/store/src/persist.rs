// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! On-disk layout: one `job-<id>.json` per record plus `index.json`.
//!
//! Writes are atomic (write-temp-then-rename) so a crash mid-write leaves
//! the previous version intact. Both file formats carry a schema version
//! integer for future migrations.

use mq_core::{Job, MoleQueueId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Schema version of a persisted job file.
pub const JOB_FILE_VERSION: u32 = 1;

/// Schema version of the store index.
pub const STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct JobFile {
    version: u32,
    job: Job,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    ids: Vec<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported schema version {found} in {path} (supported: {supported})")]
    BadVersion { path: PathBuf, found: u32, supported: u32 },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io { path: path.to_path_buf(), source }
}

fn json_err(path: &Path) -> impl FnOnce(serde_json::Error) -> PersistError + '_ {
    move |source| PersistError::Json { path: path.to_path_buf(), source }
}

pub fn job_path(dir: &Path, id: MoleQueueId) -> PathBuf {
    dir.join(format!("job-{id}.json"))
}

fn index_path(dir: &Path) -> PathBuf {
    dir.join("index.json")
}

/// Atomically write `bytes` to `path` via a temp file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp).map_err(io_err(&tmp))?;
        file.write_all(bytes).map_err(io_err(&tmp))?;
        file.sync_all().map_err(io_err(&tmp))?;
    }
    fs::rename(&tmp, path).map_err(io_err(path))
}

/// Persist one job record.
pub fn write_job(dir: &Path, job: &Job) -> Result<(), PersistError> {
    let path = job_path(dir, job.mole_queue_id);
    let file = JobFile { version: JOB_FILE_VERSION, job: job.clone() };
    let bytes = serde_json::to_vec_pretty(&file).map_err(json_err(&path))?;
    write_atomic(&path, &bytes)
}

/// Remove one job record file.
pub fn remove_job(dir: &Path, id: MoleQueueId) -> Result<(), PersistError> {
    let path = job_path(dir, id);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(&path)(e)),
    }
}

/// Persist the index of known ids.
pub fn write_index(dir: &Path, ids: impl Iterator<Item = MoleQueueId>) -> Result<(), PersistError> {
    let path = index_path(dir);
    let file = IndexFile {
        version: STORE_SCHEMA_VERSION,
        ids: ids.map(MoleQueueId::value).collect(),
    };
    let bytes = serde_json::to_vec_pretty(&file).map_err(json_err(&path))?;
    write_atomic(&path, &bytes)
}

/// Load every `job-*.json` in `dir`. The directory is created if missing.
///
/// The file scan is the source of truth; the index is cross-checked and a
/// mismatch only warns (a crash between job write and index write is fine).
pub fn load_jobs(dir: &Path) -> Result<Vec<Job>, PersistError> {
    fs::create_dir_all(dir).map_err(io_err(dir))?;

    let mut jobs = Vec::new();
    let entries = fs::read_dir(dir).map_err(io_err(dir))?;
    for entry in entries {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if !name.starts_with("job-") || !name.ends_with(".json") {
            continue;
        }

        let bytes = fs::read(&path).map_err(io_err(&path))?;
        let file: JobFile = serde_json::from_slice(&bytes).map_err(json_err(&path))?;
        if file.version > JOB_FILE_VERSION {
            return Err(PersistError::BadVersion {
                path,
                found: file.version,
                supported: JOB_FILE_VERSION,
            });
        }
        jobs.push(file.job);
    }

    check_index(dir, &jobs)?;
    jobs.sort_by_key(|j| j.mole_queue_id);
    Ok(jobs)
}

fn check_index(dir: &Path, jobs: &[Job]) -> Result<(), PersistError> {
    let path = index_path(dir);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_err(&path)(e)),
    };
    let index: IndexFile = serde_json::from_slice(&bytes).map_err(json_err(&path))?;
    if index.version > STORE_SCHEMA_VERSION {
        return Err(PersistError::BadVersion {
            path,
            found: index.version,
            supported: STORE_SCHEMA_VERSION,
        });
    }

    let mut indexed: Vec<u64> = index.ids;
    let mut found: Vec<u64> = jobs.iter().map(|j| j.mole_queue_id.value()).collect();
    indexed.sort_unstable();
    found.sort_unstable();
    if indexed != found {
        warn!(path = %path.display(), "job index out of sync with job files; rebuilding");
    }
    Ok(())
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
