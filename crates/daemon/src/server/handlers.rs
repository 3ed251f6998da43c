// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! JSON-RPC method handlers: `listQueues`, `submitJob`, `cancelJob`,
//! `lookupJob`, and the test-only `rpcKill`.

use super::{staging, ServerCtx};
use crate::rpc::{ClientCtx, Method, Reply};
use async_trait::async_trait;
use mq_core::{EventEntry, JobState, MoleQueueId};
use mq_wire::{
    codes, CancelJobParams, CancelJobResult, JobDetail, LookupJobParams, RpcError, SubmitJobParams,
    SubmitJobResult,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(e.to_string()))
}

/// `listQueues` -> `{queueName: [programName, ...]}` in definition order.
pub struct ListQueuesMethod {
    pub ctx: Arc<ServerCtx>,
}

#[async_trait]
impl Method for ListQueuesMethod {
    async fn call(&self, _params: Option<Value>, _client: &ClientCtx) -> Result<Reply, RpcError> {
        Ok(Reply::new(to_result(&self.ctx.registry.listing())?))
    }
}

/// `submitJob`: validate, persist, stage, reply, then dispatch.
///
/// The reply carries the assigned id and working directory; acceptance and
/// backend dispatch happen in the post-reply hook so the response is always
/// written before the first `jobStateChanged` notification.
pub struct SubmitJobMethod {
    pub ctx: Arc<ServerCtx>,
}

#[async_trait]
impl Method for SubmitJobMethod {
    async fn call(&self, params: Option<Value>, client: &ClientCtx) -> Result<Reply, RpcError> {
        let params: SubmitJobParams = parse_params(params)?;
        let ctx = &self.ctx;

        let Some(backend) = ctx.registry.get(&params.queue) else {
            return Err(RpcError::new(
                codes::UNKNOWN_QUEUE,
                format!("Unknown queue: {}", params.queue),
            ));
        };
        if backend.settings_snapshot().program(&params.program).is_none() {
            return Err(RpcError::new(
                codes::UNKNOWN_PROGRAM,
                format!("Unknown program: {}", params.program),
            ));
        }

        let job = ctx
            .store
            .create(params.into_spec())
            .map_err(|e| RpcError::internal(e.to_string()))?;
        let id = job.mole_queue_id;

        let dir = match staging::prepare_working_directory(&ctx.workdir, &job) {
            Ok(dir) => dir,
            Err(e) => {
                // Filesystem errors abort the job, never the server.
                error!(job = %id, error = %e, "staging failed");
                if let Err(e) = ctx.store.fail(id, e.to_string()) {
                    warn!(job = %id, error = %e, "cannot fail job");
                }
                return Err(RpcError::internal(e.to_string()));
            }
        };
        ctx.store
            .set_local_working_directory(id, &dir)
            .map_err(|e| RpcError::internal(e.to_string()))?;

        ctx.hub.subscribe_job(id, client.addr.clone());
        ctx.eventlog.append(
            EventEntry::info(format!(
                "job submitted to queue {:?}, program {:?}",
                job.spec.queue, job.spec.program
            ))
            .for_job(id),
        );

        let result =
            to_result(&SubmitJobResult { mole_queue_id: id, local_working_directory: dir })?;
        let ctx = Arc::clone(ctx);
        Ok(Reply::new(result).then(move || {
            if let Err(e) = ctx.store.transition(id, JobState::Accepted) {
                warn!(job = %id, error = %e, "accept transition rejected");
                return;
            }
            tokio::spawn(async move {
                dispatch_to_backend(&ctx, id).await;
            });
        }))
    }
}

/// Hand an accepted job to its backend; failures land on the job.
async fn dispatch_to_backend(ctx: &Arc<ServerCtx>, id: MoleQueueId) {
    let Some(job) = ctx.store.lookup(id) else { return };
    if job.state != JobState::Accepted {
        debug!(job = %id, state = %job.state, "not dispatching");
        return;
    }
    let Some(backend) = ctx.registry.get(&job.spec.queue) else {
        if let Err(e) = ctx.store.fail(id, format!("queue vanished: {}", job.spec.queue)) {
            warn!(job = %id, error = %e, "cannot fail job");
        }
        return;
    };
    if let Err(e) = backend.submit(&job).await {
        error!(job = %id, error = %e, "backend submission failed");
        if let Err(e) = ctx.store.fail(id, e.to_string()) {
            warn!(job = %id, error = %e, "cannot fail job");
        }
    }
}

/// `cancelJob`: reply success immediately; the backend cancel runs after.
/// Canceling a terminal job is a no-op success (idempotent).
pub struct CancelJobMethod {
    pub ctx: Arc<ServerCtx>,
}

#[async_trait]
impl Method for CancelJobMethod {
    async fn call(&self, params: Option<Value>, _client: &ClientCtx) -> Result<Reply, RpcError> {
        let params: CancelJobParams = parse_params(params)?;
        let id = params.mole_queue_id;
        let ctx = &self.ctx;

        let Some(job) = ctx.store.lookup(id) else {
            return Err(RpcError::new(codes::UNKNOWN_JOB, format!("Unknown moleQueueId: {id}")));
        };

        let result = to_result(&CancelJobResult { mole_queue_id: id })?;
        if job.is_terminal() {
            return Ok(Reply::new(result));
        }

        let ctx = Arc::clone(ctx);
        Ok(Reply::new(result).then(move || {
            tokio::spawn(async move {
                let Some(job) = ctx.store.lookup(id) else { return };
                match ctx.registry.get(&job.spec.queue) {
                    Some(backend) => {
                        if let Err(e) = backend.cancel(id).await {
                            warn!(job = %id, error = %e, "cancel failed");
                        }
                    }
                    None => {
                        // Queue no longer configured; cancel in the store.
                        if let Err(e) = ctx.store.transition(id, JobState::Canceled) {
                            debug!(job = %id, error = %e, "cancel raced a transition");
                        }
                    }
                }
            });
        }))
    }
}

/// `lookupJob` -> the full job record, camelCase.
pub struct LookupJobMethod {
    pub ctx: Arc<ServerCtx>,
}

#[async_trait]
impl Method for LookupJobMethod {
    async fn call(&self, params: Option<Value>, _client: &ClientCtx) -> Result<Reply, RpcError> {
        let params: LookupJobParams = parse_params(params)?;
        let id = params.mole_queue_id;
        match self.ctx.store.lookup(id) {
            Some(job) => Ok(Reply::new(to_result(&JobDetail::from(&job))?)),
            None => {
                Err(RpcError::new(codes::UNKNOWN_JOB, format!("Unknown moleQueueId: {id}")))
            }
        }
    }
}

/// `rpcKill`: acknowledge, then shut the daemon down. Registered only when
/// the daemon was started with `--rpc-kill`.
pub struct RpcKillMethod {
    pub ctx: Arc<ServerCtx>,
}

#[async_trait]
impl Method for RpcKillMethod {
    async fn call(&self, _params: Option<Value>, _client: &ClientCtx) -> Result<Reply, RpcError> {
        let shutdown = self.ctx.shutdown.clone();
        Ok(Reply::new(json!({ "success": true })).then(move || {
            warn!("shutdown requested via rpcKill");
            shutdown.cancel();
        }))
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
