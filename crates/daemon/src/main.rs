// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! `molequeue` binary: argument parsing, tracing setup, daemon lifecycle.
//!
//! Exit codes: 0 success, 1 startup error, 2 bad arguments (clap).

use clap::Parser;
use mq_daemon::config::WorkDir;
use mq_daemon::{Daemon, DaemonConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "molequeue",
    about = "Job broker between desktop applications and compute queues",
    disable_version_flag = true
)]
struct Cli {
    /// Broker state directory (default: the platform data dir)
    #[arg(long, value_name = "PATH")]
    workdir: Option<PathBuf>,

    /// Socket name under the platform temp area (default: MoleQueue)
    #[arg(long, value_name = "NAME")]
    socketname: Option<String>,

    /// Register the test-only rpcKill method
    #[arg(long = "rpc-kill")]
    rpc_kill: bool,

    /// Print version information and exit
    #[arg(short = 'v', long = "version")]
    version: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.version {
        println!("molequeue {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let workdir = cli.workdir.clone().unwrap_or_else(WorkDir::default_root);
    let config = DaemonConfig {
        workdir: workdir.clone(),
        socket_name: cli.socketname.clone(),
        rpc_kill: cli.rpc_kill,
    };

    // Diagnostics go to a rolling file under the workdir; the structured
    // event log (log-YYYYMMDD.jsonl) is separate and always on.
    let _guard = match std::fs::create_dir_all(workdir.join("log")) {
        Ok(()) => Some(init_tracing(&workdir.join("log"))),
        Err(e) => {
            eprintln!("molequeue: cannot prepare workdir {}: {e}", workdir.display());
            std::process::exit(1);
        }
    };

    let daemon = match Daemon::startup(&config).await {
        Ok(daemon) => daemon,
        Err(e) => {
            eprintln!("molequeue: {e}");
            std::process::exit(1);
        }
    };
    daemon.run().await;
}

fn init_tracing(log_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    let appender = tracing_appender::rolling::daily(log_dir, "molequeue.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("MOLEQUEUE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}
