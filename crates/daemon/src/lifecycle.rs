// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Daemon startup and shutdown.
//!
//! Startup order: workdir layout, instance lock, settings, event log, job
//! store (restart policy applied), queue registry, socket bind. Anything
//! failing before the bind aborts startup with a readable error.

use crate::config::{self, Settings, WorkDir};
use crate::eventlog::{EventLog, EventLogWriter};
use crate::listener::{ListenError, Listener};
use crate::queues::{QueueRegistry, RegistryError};
use crate::rpc::Dispatcher;
use crate::server::{hub::ClientHub, Server, ServerCtx};
use fs2::FileExt;
use mq_core::{EventEntry, SystemClock};
use mq_store::{JobStore, StoreError};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot prepare workdir {path}: {source}")]
    Workdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("another instance holds {path}")]
    Locked { path: PathBuf },

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("cannot open event log: {0}")]
    EventLog(#[source] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Listen(#[from] ListenError),
}

/// Daemon invocation options (from the CLI).
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub workdir: PathBuf,
    /// Socket-name override; defaults to the settings file, then "MoleQueue".
    pub socket_name: Option<String>,
    /// Register the test-only `rpcKill` method.
    pub rpc_kill: bool,
}

/// A started daemon, ready to serve.
pub struct Daemon {
    server: Server,
    listener: Listener,
    log_writer: EventLogWriter,
    shutdown: CancellationToken,
    // Held for the daemon's lifetime; dropping releases the flock.
    _lock_file: std::fs::File,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon").finish_non_exhaustive()
    }
}

impl Daemon {
    /// Bring the broker up. On success the socket is bound and the store
    /// has been reloaded with the restart policy applied.
    pub async fn startup(config: &DaemonConfig) -> Result<Self, LifecycleError> {
        let workdir = WorkDir::new(&config.workdir);
        workdir
            .ensure_layout()
            .map_err(|source| LifecycleError::Workdir { path: config.workdir.clone(), source })?;

        let lock_file = acquire_lock(&workdir)?;
        let settings = Settings::load(&workdir.config_file())?;

        let (eventlog, log_writer) =
            EventLog::open(workdir.log_dir()).map_err(LifecycleError::EventLog)?;

        let clock = Arc::new(SystemClock);
        let (store, interrupted) = JobStore::open(workdir.jobs_dir(), clock)?;
        let store = Arc::new(store);
        for change in &interrupted {
            eventlog.append(
                EventEntry::warn(format!(
                    "interrupted by restart ({} -> {})",
                    change.from, change.to
                ))
                .for_job(change.mole_queue_id)
                .at(change.at),
            );
        }

        let registry = Arc::new(QueueRegistry::build(&settings.queues, &store)?);
        if registry.is_empty() {
            warn!("no queues configured; submitJob will refuse everything");
        }

        let shutdown = CancellationToken::new();
        let hub = ClientHub::new();
        let server = Server::new(ServerCtx {
            store,
            registry: Arc::clone(&registry),
            hub: Arc::clone(&hub),
            eventlog,
            workdir: workdir.clone(),
            shutdown: shutdown.clone(),
        });
        server.wire_store_observer();

        let dispatcher = Arc::new(Dispatcher::new());
        server.register_methods(&dispatcher, config.rpc_kill);

        let socket_name =
            config.socket_name.clone().unwrap_or_else(|| settings.socket_name().to_string());
        let socket = config::socket_path(&socket_name);
        let listener = Listener::bind(&socket, dispatcher, hub).await?;

        info!(workdir = %workdir.root().display(), socket = %socket.display(), "broker started");
        Ok(Self { server, listener, log_writer, shutdown, _lock_file: lock_file })
    }

    pub fn socket_path(&self) -> PathBuf {
        self.listener.socket_path().to_path_buf()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until a signal (or `rpcKill`) stops the broker.
    pub async fn run(self) {
        let Daemon { server, listener, log_writer, shutdown, _lock_file } = self;
        server.ctx().registry.start_pollers(shutdown.clone());

        let accept = tokio::spawn(listener.run(shutdown.clone()));

        wait_for_stop(&shutdown).await;
        shutdown.cancel();
        let _ = accept.await;

        // Release the event log and give the writer a moment to drain.
        drop(server);
        if tokio::time::timeout(Duration::from_secs(2), log_writer.shutdown()).await.is_err() {
            warn!("event log writer did not drain in time");
        }
        info!("broker stopped");
    }
}

fn acquire_lock(workdir: &WorkDir) -> Result<std::fs::File, LifecycleError> {
    let path = workdir.lock_file();
    // Open without truncating: the file may belong to a running instance
    // and truncation would wipe its PID before we know we hold the lock.
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|source| LifecycleError::Workdir { path: path.clone(), source })?;
    file.try_lock_exclusive().map_err(|_| LifecycleError::Locked { path: path.clone() })?;

    file.set_len(0).map_err(|source| LifecycleError::Workdir { path: path.clone(), source })?;
    writeln!(file, "{}", std::process::id())
        .map_err(|source| LifecycleError::Workdir { path, source })?;
    Ok(file)
}

async fn wait_for_stop(shutdown: &CancellationToken) {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(signal) => signal,
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("interrupt received"),
                    _ = shutdown.cancelled() => {}
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("interrupt received"),
            _ = sigterm.recv() => info!("SIGTERM received"),
            _ = shutdown.cancelled() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        _ = shutdown.cancelled() => {}
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
