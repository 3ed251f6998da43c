// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Working-directory preparation: create `local/<id>/` and write the job's
//! input files before the job is accepted.

use crate::config::WorkDir;
use mq_core::{FileSource, Job};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("invalid input filename: {0:?}")]
    BadFilename(String),

    #[error("cannot create working directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write input file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot copy input file {from} to {to}: {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A filename must be a single plain path component.
fn check_filename(name: &str) -> Result<(), StagingError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StagingError::BadFilename(name.to_string())),
    }
}

/// Create the job's working directory and write its input files into it.
/// Returns the directory path.
pub fn prepare_working_directory(workdir: &WorkDir, job: &Job) -> Result<PathBuf, StagingError> {
    let dir = workdir.job_working_dir(job.mole_queue_id);
    std::fs::create_dir_all(&dir)
        .map_err(|source| StagingError::CreateDir { path: dir.clone(), source })?;

    for file in &job.spec.input_files {
        check_filename(&file.filename)?;
        let target = dir.join(&file.filename);
        match &file.source {
            FileSource::Contents(contents) => {
                std::fs::write(&target, contents)
                    .map_err(|source| StagingError::WriteFile { path: target.clone(), source })?;
            }
            FileSource::Path(from) => {
                std::fs::copy(from, &target).map_err(|source| StagingError::CopyFile {
                    from: from.clone(),
                    to: target.clone(),
                    source,
                })?;
            }
        }
    }
    Ok(dir)
}

#[cfg(test)]
#[path = "staging_tests.rs"]
mod tests;
