// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

use super::*;
use mq_core::{FakeClock, FileSpec, Job, JobSpec, MoleQueueId};
use yare::parameterized;

fn job_with_files(files: Vec<FileSpec>) -> Job {
    let clock = FakeClock::new();
    let mut spec = JobSpec::new("local", "p");
    spec.input_files = files;
    Job::new(MoleQueueId(12), spec, &clock)
}

#[test]
fn creates_directory_and_writes_contents() {
    let dir = tempfile::tempdir().unwrap();
    let workdir = WorkDir::new(dir.path());
    let job = job_with_files(vec![FileSpec::from_contents("input.in", "2\n\nH 0 0 0\n")]);

    let path = prepare_working_directory(&workdir, &job).unwrap();
    assert_eq!(path, dir.path().join("local").join("12"));
    assert_eq!(std::fs::read_to_string(path.join("input.in")).unwrap(), "2\n\nH 0 0 0\n");
}

#[test]
fn copies_path_sources() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("benzene.inp");
    std::fs::write(&source, "geometry").unwrap();

    let workdir = WorkDir::new(dir.path());
    let job = job_with_files(vec![FileSpec::from_path("benzene.inp", &source)]);

    let path = prepare_working_directory(&workdir, &job).unwrap();
    assert_eq!(std::fs::read_to_string(path.join("benzene.inp")).unwrap(), "geometry");
}

#[parameterized(
    parent_escape = { "../evil.sh" },
    nested = { "a/b.in" },
    absolute = { "/etc/passwd" },
    empty = { "" },
    dot = { "." },
)]
fn rejects_unsafe_filenames(filename: &str) {
    let dir = tempfile::tempdir().unwrap();
    let workdir = WorkDir::new(dir.path());
    let job = job_with_files(vec![FileSpec::from_contents(filename, "x")]);

    let err = prepare_working_directory(&workdir, &job).unwrap_err();
    assert!(matches!(err, StagingError::BadFilename(_)), "{filename:?} must be rejected");
}

#[test]
fn missing_source_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let workdir = WorkDir::new(dir.path());
    let job = job_with_files(vec![FileSpec::from_path("gone.in", dir.path().join("gone.in"))]);

    let err = prepare_working_directory(&workdir, &job).unwrap_err();
    assert!(matches!(err, StagingError::CopyFile { .. }));
}

#[test]
fn empty_file_list_still_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let workdir = WorkDir::new(dir.path());
    let job = job_with_files(Vec::new());

    let path = prepare_working_directory(&workdir, &job).unwrap();
    assert!(path.is_dir());
}
