// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Server facade: owns the job store, queue registry, and client hub, and
//! wires the JSON-RPC methods into the dispatcher.

pub mod handlers;
pub mod hub;
pub mod staging;

use crate::config::WorkDir;
use crate::eventlog::EventLog;
use crate::queues::QueueRegistry;
use crate::rpc::Dispatcher;
use hub::ClientHub;
use mq_core::EventEntry;
use mq_store::JobStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared context handed to every method handler.
pub struct ServerCtx {
    pub store: Arc<JobStore>,
    pub registry: Arc<QueueRegistry>,
    pub hub: Arc<ClientHub>,
    pub eventlog: EventLog,
    pub workdir: WorkDir,
    pub shutdown: CancellationToken,
}

/// The composed server. No global state: everything the handlers need is
/// owned here and passed by `Arc`.
pub struct Server {
    ctx: Arc<ServerCtx>,
}

impl Server {
    pub fn new(ctx: ServerCtx) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn ctx(&self) -> &Arc<ServerCtx> {
        &self.ctx
    }

    /// Register the JSON-RPC methods. `rpc_kill` gates the test-only
    /// `rpcKill` method behind the daemon's `--rpc-kill` flag.
    pub fn register_methods(&self, dispatcher: &Dispatcher, rpc_kill: bool) {
        let ctx = &self.ctx;
        dispatcher
            .register("listQueues", Arc::new(handlers::ListQueuesMethod { ctx: Arc::clone(ctx) }));
        dispatcher
            .register("submitJob", Arc::new(handlers::SubmitJobMethod { ctx: Arc::clone(ctx) }));
        dispatcher
            .register("cancelJob", Arc::new(handlers::CancelJobMethod { ctx: Arc::clone(ctx) }));
        dispatcher
            .register("lookupJob", Arc::new(handlers::LookupJobMethod { ctx: Arc::clone(ctx) }));
        if rpc_kill {
            dispatcher
                .register("rpcKill", Arc::new(handlers::RpcKillMethod { ctx: Arc::clone(ctx) }));
        }
    }

    /// Hook the store's change stream into notifications and the event log.
    ///
    /// Both sinks only enqueue, honoring the store's observer contract.
    pub fn wire_store_observer(&self) {
        let hub = Arc::clone(&self.ctx.hub);
        let eventlog = self.ctx.eventlog.clone();
        self.ctx.store.subscribe(move |change| {
            hub.notify_state_change(change);
            eventlog.append(
                EventEntry::info(format!("state changed: {} -> {}", change.from, change.to))
                    .for_job(change.mole_queue_id)
                    .at(change.at),
            );
        });
    }
}
