// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Socket listener: accepts client connections and runs one reader and one
//! writer task per connection without blocking the rest of the daemon.

pub mod connection;

use crate::rpc::{ClientCtx, Dispatcher};
use crate::server::hub::ClientHub;
use connection::{
    writer_task, ClientAddr, ConnectionId, EndpointId, OutboundQueue, SendHandle,
    DEFAULT_OUTBOUND_CAPACITY,
};
use mq_wire::ProtocolError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("socket {path} is in use by a running broker")]
    AddressInUse { path: PathBuf },

    #[error("cannot bind {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Listener task for accepting socket connections.
pub struct Listener {
    unix: UnixListener,
    path: PathBuf,
    dispatcher: Arc<Dispatcher>,
    hub: Arc<ClientHub>,
    next_conn: AtomicU64,
}

impl Listener {
    /// Bind the named local endpoint.
    ///
    /// A leftover socket file from a crashed instance is removed only after
    /// probing that nothing answers on it; a live listener is an error.
    pub async fn bind(
        path: impl Into<PathBuf>,
        dispatcher: Arc<Dispatcher>,
        hub: Arc<ClientHub>,
    ) -> Result<Self, ListenError> {
        let path = path.into();
        if path.exists() {
            if UnixStream::connect(&path).await.is_ok() {
                return Err(ListenError::AddressInUse { path });
            }
            debug!(path = %path.display(), "removing stale socket file");
            let _ = std::fs::remove_file(&path);
        }

        let unix = UnixListener::bind(&path)
            .map_err(|source| ListenError::Bind { path: path.clone(), source })?;
        info!(path = %path.display(), "listening");
        Ok(Self { unix, path, dispatcher, hub, next_conn: AtomicU64::new(1) })
    }

    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `shutdown` fires, spawning tasks for each.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                result = self.unix.accept() => match result {
                    Ok((stream, _)) => {
                        let conn = ConnectionId(self.next_conn.fetch_add(1, Ordering::Relaxed));
                        spawn_connection(
                            stream,
                            conn,
                            Arc::clone(&self.dispatcher),
                            Arc::clone(&self.hub),
                            shutdown.clone(),
                        );
                    }
                    Err(e) => error!(error = %e, "accept error"),
                },
                _ = shutdown.cancelled() => break,
            }
        }
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Spawn the reader and writer tasks for one accepted connection.
fn spawn_connection(
    stream: UnixStream,
    conn: ConnectionId,
    dispatcher: Arc<Dispatcher>,
    hub: Arc<ClientHub>,
    shutdown: CancellationToken,
) {
    debug!(%conn, "client connected");
    let (mut reader, writer) = stream.into_split();
    let queue = OutboundQueue::new(DEFAULT_OUTBOUND_CAPACITY);
    let sender = SendHandle::new(conn, Arc::clone(&queue));

    hub.register_connection(conn, sender.clone());
    let client = ClientCtx {
        // Unix stream transport: exactly one peer, empty endpoint id.
        addr: ClientAddr { conn, endpoint: EndpointId::default() },
        sender,
    };

    tokio::spawn(writer_task(queue, writer));
    tokio::spawn(async move {
        loop {
            tokio::select! {
                packet = mq_wire::read_packet(&mut reader) => match packet {
                    Ok(bytes) => dispatcher.handle_packet(&bytes, &client).await,
                    Err(ProtocolError::ConnectionClosed) => {
                        debug!(%conn, "client disconnected");
                        break;
                    }
                    Err(e) => {
                        debug!(%conn, error = %e, "read error; closing connection");
                        break;
                    }
                },
                _ = shutdown.cancelled() => break,
            }
            if client.sender.is_closed() {
                break;
            }
        }
        client.sender.close();
        hub.connection_closed(conn);
        dispatcher.connection_closed(conn);
    });
}
