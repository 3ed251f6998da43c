// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Shared fixture: an in-process broker on a unique socket, plus a framed
//! JSON-RPC client.

use mq_daemon::{Daemon, DaemonConfig};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

static SOCKET_SEQ: AtomicU64 = AtomicU64::new(0);

/// Settings file with the two reference queues: a SLURM cluster (never
/// polled in these tests) and a local queue with shell-runnable programs.
pub const REFERENCE_CONFIG: &str = r#"
[[queue]]
name = "Some big ol' cluster"
type = "remote-slurm"
host = "bigcluster.example.org"

[[queue.programs]]
name = "Quantum Tater"
run_template = "qt input.in"

[[queue.programs]]
name = "Crystal Math"
run_template = "cm input.in"

[[queue.programs]]
name = "Nebulous Nucleus"
run_template = "nn input.in"

[[queue]]
name = "Puny local queue"
type = "local"

[[queue.programs]]
name = "SpectroCrunch"
run_template = "/bin/true"
run_direct = true

[[queue.programs]]
name = "FastFocker"
run_template = "/bin/false"
run_direct = true

[[queue.programs]]
name = "SpeedSlater"
run_template = "sleep 30"
run_direct = true
"#;

pub struct Broker {
    pub socket: PathBuf,
    shutdown: tokio_util::sync::CancellationToken,
    server: Option<tokio::task::JoinHandle<()>>,
    _dir: tempfile::TempDir,
}

impl Broker {
    /// Start a broker with the reference configuration.
    pub async fn start() -> Broker {
        Self::start_with(REFERENCE_CONFIG, false).await
    }

    pub async fn start_with(config_toml: &str, rpc_kill: bool) -> Broker {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("config")).expect("config dir");
        std::fs::write(dir.path().join("config").join("config.toml"), config_toml)
            .expect("settings");

        let seq = SOCKET_SEQ.fetch_add(1, Ordering::Relaxed);
        let config = DaemonConfig {
            workdir: dir.path().to_path_buf(),
            socket_name: Some(format!("mq-spec-{}-{seq}", std::process::id())),
            rpc_kill,
        };
        let daemon = Daemon::startup(&config).await.expect("broker startup");
        let socket = daemon.socket_path();
        let shutdown = daemon.shutdown_token();
        let server = tokio::spawn(daemon.run());
        Broker { socket, shutdown, server: Some(server), _dir: dir }
    }

    pub async fn client(&self) -> Client {
        let stream = UnixStream::connect(&self.socket).await.expect("connect");
        Client { stream }
    }

    /// Wait for the in-process daemon task to end (e.g. after rpcKill).
    pub async fn wait_stopped(mut self) {
        if let Some(server) = self.server.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), server).await;
        }
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(server) = self.server.take() {
            server.abort();
        }
        let _ = std::fs::remove_file(&self.socket);
    }
}

pub struct Client {
    stream: UnixStream,
}

impl Client {
    /// Send one framed JSON value.
    pub async fn send(&mut self, frame: &Value) {
        let body = serde_json::to_vec(frame).expect("serialize");
        self.send_raw(&body).await;
    }

    /// Send raw bytes as one framed packet.
    pub async fn send_raw(&mut self, body: &[u8]) {
        let len = (body.len() as u32).to_be_bytes();
        self.stream.write_all(&len).await.expect("write len");
        self.stream.write_all(body).await.expect("write body");
        self.stream.flush().await.expect("flush");
    }

    /// Read one framed JSON value.
    pub async fn recv(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(10), self.read_frame())
            .await
            .expect("timed out waiting for a packet");
        serde_json::from_slice(&frame).expect("parse packet")
    }

    /// Read one framed JSON value within `limit`; None on timeout.
    pub async fn try_recv(&mut self, limit: Duration) -> Option<Value> {
        match tokio::time::timeout(limit, self.read_frame()).await {
            Ok(frame) => Some(serde_json::from_slice(&frame).expect("parse packet")),
            Err(_) => None,
        }
    }

    async fn read_frame(&mut self) -> Vec<u8> {
        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf).await.expect("read len");
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body).await.expect("read body");
        body
    }

    /// Round-trip one request.
    pub async fn call(&mut self, id: u64, method: &str, params: Value) -> Value {
        self.send(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await;
        self.recv().await
    }

    /// Collect `jobStateChanged` notifications until `newState` matches a
    /// terminal state, returning the observed states in order.
    pub async fn collect_states_until_terminal(&mut self, mole_queue_id: u64) -> Vec<String> {
        let mut states = Vec::new();
        loop {
            let frame = self.recv().await;
            assert_eq!(frame["method"], "jobStateChanged", "unexpected frame: {frame}");
            let params = &frame["params"];
            assert_eq!(params["moleQueueId"], json!(mole_queue_id));
            let new_state = params["newState"].as_str().expect("newState").to_string();
            let terminal = matches!(new_state.as_str(), "Finished" | "Canceled" | "Killed" | "Error");
            states.push(new_state);
            if terminal {
                return states;
            }
        }
    }
}
