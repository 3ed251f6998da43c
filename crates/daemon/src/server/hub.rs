// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Client hub: connection table and notification fan-out.
//!
//! Every connection that submitted a job is subscribed to its
//! `jobStateChanged` notifications; the owning endpoint is the submitter's
//! address. Closed connections are scrubbed atomically.

use crate::listener::connection::{ClientAddr, ConnectionId, SendHandle};
use mq_core::{MoleQueueId, StateChange};
use mq_wire::{notification_frame, JobStateChangeNotification};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

struct HubInner {
    clients: HashMap<ConnectionId, SendHandle>,
    subscribers: HashMap<MoleQueueId, Vec<ClientAddr>>,
}

/// Connection table owned by the server facade.
pub struct ClientHub {
    inner: Mutex<HubInner>,
}

impl ClientHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(HubInner {
                clients: HashMap::new(),
                subscribers: HashMap::new(),
            }),
        })
    }

    pub fn register_connection(&self, conn: ConnectionId, sender: SendHandle) {
        self.inner.lock().clients.insert(conn, sender);
    }

    /// Remove the connection and its subscriptions in one step.
    pub fn connection_closed(&self, conn: ConnectionId) {
        let mut inner = self.inner.lock();
        inner.clients.remove(&conn);
        for addrs in inner.subscribers.values_mut() {
            addrs.retain(|addr| addr.conn != conn);
        }
        inner.subscribers.retain(|_, addrs| !addrs.is_empty());
    }

    /// Subscribe a client to a job's notifications (idempotent).
    pub fn subscribe_job(&self, job: MoleQueueId, addr: ClientAddr) {
        let mut inner = self.inner.lock();
        let addrs = inner.subscribers.entry(job).or_default();
        if !addrs.contains(&addr) {
            addrs.push(addr);
        }
    }

    /// Fan a committed state change out to the job's subscribers.
    ///
    /// Runs inside the store's observer path: pushes onto the per
    /// connection outbound queues and never blocks.
    pub fn notify_state_change(&self, change: &StateChange) {
        let payload = JobStateChangeNotification {
            mole_queue_id: change.mole_queue_id,
            old_state: change.from,
            new_state: change.to,
        };
        let frame = match serde_json::to_value(payload) {
            Ok(params) => notification_frame("jobStateChanged", Some(params)),
            Err(e) => {
                warn!(error = %e, "cannot serialize state change");
                return;
            }
        };

        let inner = self.inner.lock();
        let Some(addrs) = inner.subscribers.get(&change.mole_queue_id) else { return };
        for addr in addrs {
            let Some(sender) = inner.clients.get(&addr.conn) else { continue };
            if let Err(e) =
                sender.send_notification(Some(change.mole_queue_id), frame.clone(), &addr.endpoint)
            {
                debug!(conn = %addr.conn, error = %e, "notification not delivered");
            }
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, job: MoleQueueId) -> usize {
        self.inner.lock().subscribers.get(&job).map(|a| a.len()).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
