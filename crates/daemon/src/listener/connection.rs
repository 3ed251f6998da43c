// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Per-connection outbound queue and send handles.
//!
//! Each connection has one writer task draining a bounded queue. Responses
//! are never dropped: if the queue cannot take one, the connection is torn
//! down. `jobStateChanged` notifications are coalesced newest-per-job on
//! overflow, oldest notification dropped as a last resort.

use mq_core::MoleQueueId;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Default bound on a connection's outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;

/// Monotonic connection identifier, assigned by the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opaque routing key for multiplexed transports. Empty on plain stream
/// transports (one peer per connection) and ignored by the writer there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct EndpointId(pub Vec<u8>);

impl EndpointId {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Address of one logical peer: connection plus endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientAddr {
    pub conn: ConnectionId,
    pub endpoint: EndpointId,
}

/// One outbound frame.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A response or error reply. Never dropped.
    Response(Value),
    /// A notification; `job` marks `jobStateChanged` frames as coalescible.
    Notification { job: Option<MoleQueueId>, frame: Value },
}

impl Outbound {
    fn frame(&self) -> &Value {
        match self {
            Outbound::Response(frame) | Outbound::Notification { frame, .. } => frame,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("outbound queue full")]
    Full,
}

/// Bounded outbound queue shared by the senders and the writer task.
pub struct OutboundQueue {
    items: Mutex<VecDeque<Outbound>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Enqueue a response. Fails with `Full` when the queue cannot take it;
    /// the caller must then close the connection.
    pub fn push_response(&self, frame: Value) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return Err(SendError::Full);
        }
        items.push_back(Outbound::Response(frame));
        drop(items);
        self.notify.notify_one();
        Ok(())
    }

    /// Enqueue a notification, coalescing on overflow:
    /// an older `jobStateChanged` for the same job is replaced first, then
    /// the oldest notification of any kind is dropped (and logged).
    pub fn push_notification(&self, job: Option<MoleQueueId>, frame: Value) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            if let Some(job) = job {
                if let Some(pos) = items.iter().position(
                    |o| matches!(o, Outbound::Notification { job: Some(j), .. } if *j == job),
                ) {
                    debug!(%job, "coalescing jobStateChanged notification");
                    items.remove(pos);
                }
            }
            if items.len() >= self.capacity {
                match items.iter().position(|o| matches!(o, Outbound::Notification { .. })) {
                    Some(pos) => {
                        warn!("outbound queue full; dropping oldest notification");
                        items.remove(pos);
                    }
                    // Queue is all responses; notifications lose.
                    None => {
                        warn!("outbound queue full of responses; dropping notification");
                        return Err(SendError::Full);
                    }
                }
            }
        }
        items.push_back(Outbound::Notification { job, frame });
        drop(items);
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next frame. Returns `None` once closed and drained.
    pub async fn pop(&self) -> Option<Outbound> {
        loop {
            if let Some(item) = self.items.lock().pop_front() {
                return Some(item);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue; pending sends fail and the writer drains out.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        // Store a permit for a consumer that has not started waiting yet.
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[cfg(test)]
    pub fn drain(&self) -> Vec<Outbound> {
        self.items.lock().drain(..).collect()
    }
}

/// Cloneable sender for one connection, safe to call from any task.
///
/// `send(packet, endpoint)`: the endpoint parameter exists for router-style
/// transports; the stream writer has exactly one peer and ignores it.
#[derive(Clone)]
pub struct SendHandle {
    pub conn: ConnectionId,
    queue: Arc<OutboundQueue>,
}

impl SendHandle {
    pub fn new(conn: ConnectionId, queue: Arc<OutboundQueue>) -> Self {
        Self { conn, queue }
    }

    pub fn send_response(&self, frame: Value, _endpoint: &EndpointId) -> Result<(), SendError> {
        self.queue.push_response(frame)
    }

    pub fn send_notification(
        &self,
        job: Option<MoleQueueId>,
        frame: Value,
        _endpoint: &EndpointId,
    ) -> Result<(), SendError> {
        self.queue.push_notification(job, frame)
    }

    pub fn close(&self) {
        self.queue.close();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

/// Writer task: drains the queue onto the socket, preserving enqueue order.
pub async fn writer_task<W>(queue: Arc<OutboundQueue>, mut writer: W)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(item) = queue.pop().await {
        let bytes = match serde_json::to_vec(item.frame()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "unserializable outbound frame dropped");
                continue;
            }
        };
        if let Err(e) = mq_wire::write_packet(&mut writer, &bytes).await {
            debug!(error = %e, "write failed; closing connection");
            queue.close();
            return;
        }
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
