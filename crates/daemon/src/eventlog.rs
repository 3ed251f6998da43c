// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Structured append-only event log.
//!
//! One JSON object per line in `log/log-YYYYMMDD.jsonl`, rotated by date.
//! Appends go through a channel to a writer task so store observers never
//! block on disk I/O.

use chrono::NaiveDate;
use mq_core::{EventEntry, MoleQueueId};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

fn log_file_name(date: NaiveDate) -> String {
    format!("log-{}.jsonl", date.format("%Y%m%d"))
}

/// Cheap cloneable handle; appends are fire-and-forget.
#[derive(Clone)]
pub struct EventLog {
    tx: mpsc::UnboundedSender<EventEntry>,
    dir: PathBuf,
}

/// Owns the writer task; dropping the last [`EventLog`] and calling
/// [`EventLogWriter::shutdown`] flushes outstanding entries.
pub struct EventLogWriter {
    handle: JoinHandle<()>,
}

impl EventLog {
    /// Open the log directory and spawn the writer task.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<(Self, EventLogWriter)> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(writer_task(dir.clone(), rx));
        Ok((Self { tx, dir }, EventLogWriter { handle }))
    }

    /// Append an entry. Never blocks; a failure to enqueue (writer gone)
    /// falls back to tracing so the entry is not silently lost.
    pub fn append(&self, entry: EventEntry) {
        if let Err(e) = self.tx.send(entry) {
            error!(entry = ?e.0, "event log writer gone; entry dropped");
        }
    }

    /// All entries for one job, oldest first, across every log file.
    pub fn job_log(&self, id: MoleQueueId) -> std::io::Result<Vec<EventEntry>> {
        read_job_log(&self.dir, id)
    }
}

/// All entries for one job, oldest first, across every log file in `dir`.
pub fn read_job_log(dir: &Path, id: MoleQueueId) -> std::io::Result<Vec<EventEntry>> {
    read_filtered(dir, |entry| entry.mole_queue_id == Some(id))
}

impl EventLogWriter {
    /// Wait for the writer to drain. All `EventLog` handles must be dropped
    /// first or this waits forever.
    pub async fn shutdown(self) {
        let _ = self.handle.await;
    }
}

async fn writer_task(dir: PathBuf, mut rx: mpsc::UnboundedReceiver<EventEntry>) {
    let mut current: Option<(NaiveDate, std::fs::File)> = None;
    while let Some(entry) = rx.recv().await {
        let date = entry.at.date_naive();
        if current.as_ref().map(|(d, _)| *d != date).unwrap_or(true) {
            match open_for_date(&dir, date) {
                Ok(file) => current = Some((date, file)),
                Err(e) => {
                    error!(error = %e, "cannot open event log file");
                    continue;
                }
            }
        }
        if let Some((_, file)) = current.as_mut() {
            if let Err(e) = append_line(file, &entry) {
                error!(error = %e, "event log write failed");
            }
        }
    }
}

fn open_for_date(dir: &Path, date: NaiveDate) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new().create(true).append(true).open(dir.join(log_file_name(date)))
}

fn append_line(file: &mut std::fs::File, entry: &EventEntry) -> std::io::Result<()> {
    let line = serde_json::to_string(entry)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")
}

fn read_filtered(
    dir: &Path,
    keep: impl Fn(&EventEntry) -> bool,
) -> std::io::Result<Vec<EventEntry>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("log-") && n.ends_with(".jsonl"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    let mut entries = Vec::new();
    for path in files {
        let text = std::fs::read_to_string(&path)?;
        for line in text.lines() {
            // Tolerate torn trailing lines from a crash mid-append.
            if let Ok(entry) = serde_json::from_str::<EventEntry>(line) {
                if keep(&entry) {
                    entries.push(entry);
                }
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
#[path = "eventlog_tests.rs"]
mod tests;
