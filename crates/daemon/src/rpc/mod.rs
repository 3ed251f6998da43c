// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! RPC dispatcher: method routing, reply framing, and correlation of
//! server-originated requests with out-of-order responses.
//!
//! `internalPing` is answered here and never reaches application handlers.

use crate::listener::connection::{ClientAddr, ConnectionId, SendHandle};
use async_trait::async_trait;
use mq_wire::{
    decode_packet, error_frame, request_frame, response_frame, Decoded, Message, RpcError,
};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// One connected peer as seen by handlers.
#[derive(Clone)]
pub struct ClientCtx {
    pub addr: ClientAddr,
    pub sender: SendHandle,
}

/// Work to run after the reply has been enqueued.
///
/// `submitJob` uses this to guarantee its response is written before the
/// first `jobStateChanged` notification for the new job.
pub type AfterReply = Box<dyn FnOnce() + Send + 'static>;

/// Successful handler outcome.
pub struct Reply {
    pub result: Value,
    pub after_reply: Option<AfterReply>,
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reply")
            .field("result", &self.result)
            .field("after_reply", &self.after_reply.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Reply {
    pub fn new(result: Value) -> Self {
        Self { result, after_reply: None }
    }

    /// Attach a post-reply hook.
    pub fn then(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.after_reply = Some(Box::new(hook));
        self
    }
}

/// An application method, registered by name.
#[async_trait]
pub trait Method: Send + Sync {
    async fn call(&self, params: Option<Value>, client: &ClientCtx) -> Result<Reply, RpcError>;
}

struct Pending {
    method: String,
    tx: oneshot::Sender<Result<Value, RpcError>>,
}

/// Routes incoming messages and correlates outgoing requests.
pub struct Dispatcher {
    methods: RwLock<HashMap<String, Arc<dyn Method>>>,
    pending: Mutex<HashMap<(ConnectionId, String), Pending>>,
    next_outbound_id: AtomicU64,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            methods: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_outbound_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for a method name. Last registration wins.
    pub fn register(&self, name: impl Into<String>, method: Arc<dyn Method>) {
        self.methods.write().insert(name.into(), method);
    }

    /// Process one inbound packet: dispatch every message, enqueue the
    /// reply (batch replies grouped in order), then run post-reply hooks.
    pub async fn handle_packet(&self, bytes: &[u8], client: &ClientCtx) {
        let packet = decode_packet(bytes);
        let mut replies: Vec<Value> = Vec::new();
        let mut hooks: Vec<AfterReply> = Vec::new();
        // Duplicate request ids within one transmission are refused.
        let mut seen_ids: HashSet<String> = HashSet::new();

        for item in packet.items {
            match item {
                Decoded::Invalid { id, error } => replies.push(error_frame(id, &error)),
                Decoded::Message(Message::Request { id, method, params }) => {
                    if !seen_ids.insert(id.to_string()) {
                        replies.push(error_frame(id, &RpcError::invalid_request()));
                        continue;
                    }
                    match self.call_method(&method, params, client).await {
                        Ok(mut reply) => {
                            replies.push(response_frame(id, reply.result.take()));
                            if let Some(hook) = reply.after_reply {
                                hooks.push(hook);
                            }
                        }
                        Err(error) => replies.push(error_frame(id, &error)),
                    }
                }
                Decoded::Message(Message::Notification { method, params }) => {
                    // No reply, but handlers (and their hooks) still run.
                    match self.call_method(&method, params, client).await {
                        Ok(reply) => {
                            if let Some(hook) = reply.after_reply {
                                hooks.push(hook);
                            }
                        }
                        Err(error) => {
                            debug!(method, error = %error, "notification handler failed")
                        }
                    }
                }
                Decoded::Message(Message::Response { id, result }) => {
                    self.resolve_pending(client.addr.conn, &id, Ok(result));
                }
                Decoded::Message(Message::Error { id, error }) => {
                    self.resolve_pending(client.addr.conn, &id, Err(error));
                }
            }
        }

        let outcome = if packet.batch {
            // An all-notification batch produces no reply at all.
            if replies.is_empty() {
                Ok(())
            } else {
                client.sender.send_response(Value::Array(replies), &client.addr.endpoint)
            }
        } else if let Some(reply) = replies.pop() {
            client.sender.send_response(reply, &client.addr.endpoint)
        } else {
            Ok(())
        };
        if let Err(e) = outcome {
            // Responses are never dropped: a full queue tears the
            // connection down (the caller closes on send failure).
            warn!(conn = %client.addr.conn, error = %e, "cannot enqueue reply");
            client.sender.close();
            return;
        }

        for hook in hooks {
            hook();
        }
    }

    async fn call_method(
        &self,
        method: &str,
        params: Option<Value>,
        client: &ClientCtx,
    ) -> Result<Reply, RpcError> {
        // Liveness probe, answered inside the dispatcher.
        if method == "internalPing" {
            return Ok(Reply::new(json!("pong")));
        }
        let handler = self.methods.read().get(method).cloned();
        match handler {
            Some(handler) => handler.call(params, client).await,
            None => Err(RpcError::method_not_found(method)),
        }
    }

    /// Send a request to a client and await its response.
    ///
    /// The outbound id is drawn from a monotonic counter; the pending entry
    /// stores the method name so late responses are attributed in logs.
    pub async fn call_client(
        &self,
        client: &ClientCtx,
        method: &str,
        params: Option<Value>,
        deadline: Option<Duration>,
    ) -> Result<Value, RpcError> {
        let id = self.next_outbound_id.fetch_add(1, Ordering::Relaxed);
        let key = (client.addr.conn, json!(id).to_string());
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(key.clone(), Pending { method: method.to_string(), tx });

        let frame = request_frame(json!(id), method, params);
        // Requests ride the non-droppable path; losing one would leak the
        // pending entry until the connection closes.
        if let Err(e) = client.sender.send_response(frame, &client.addr.endpoint) {
            self.pending.lock().remove(&key);
            return Err(RpcError::internal(format!("cannot send request: {e}")));
        }

        let wait = async {
            rx.await
                .unwrap_or_else(|_| Err(RpcError::internal("connection closed")))
        };
        match deadline {
            None => wait.await,
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => {
                    self.pending.lock().remove(&key);
                    Err(RpcError::internal(format!("no response to {method} within {limit:?}")))
                }
            },
        }
    }

    fn resolve_pending(&self, conn: ConnectionId, id: &Value, result: Result<Value, RpcError>) {
        let key = (conn, id.to_string());
        match self.pending.lock().remove(&key) {
            Some(entry) => {
                debug!(conn = %conn, method = %entry.method, "response correlated");
                let _ = entry.tx.send(result);
            }
            None => warn!(conn = %conn, id = %id, "response with unknown id ignored"),
        }
    }

    /// Drop all state for a closed connection; outstanding calls fail.
    pub fn connection_closed(&self, conn: ConnectionId) {
        self.pending.lock().retain(|(c, _), _| *c != conn);
    }

    /// Number of in-flight outbound requests (diagnostics).
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
