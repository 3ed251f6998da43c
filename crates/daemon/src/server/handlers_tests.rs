// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

use super::*;
use crate::config::WorkDir;
use crate::eventlog::EventLog;
use crate::listener::connection::{ClientAddr, ConnectionId, EndpointId, Outbound, OutboundQueue, SendHandle};
use crate::queues::QueueRegistry;
use crate::rpc::{ClientCtx, Method};
use crate::server::hub::ClientHub;
use mq_core::{FakeClock, Program, QueueConfig, QueueKind};
use mq_store::JobStore;
use mq_wire::codes;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Fixture {
    ctx: Arc<ServerCtx>,
    client: ClientCtx,
    queue: Arc<OutboundQueue>,
    _dir: tempfile::TempDir,
}

fn queue_configs() -> Vec<QueueConfig> {
    let mut programs = QueueConfig::new("Puny local queue", QueueKind::Local);
    let mut run_true = Program::new("true", "/bin/true");
    run_true.run_direct = true;
    let mut run_false = Program::new("false", "/bin/false");
    run_false.run_direct = true;
    let mut run_sleep = Program::new("sleep", "sleep 30");
    run_sleep.run_direct = true;
    programs.programs = vec![run_true, run_false, run_sleep];
    vec![programs]
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let workdir = WorkDir::new(dir.path());
    workdir.ensure_layout().unwrap();

    let clock = Arc::new(FakeClock::new());
    let (store, _) = JobStore::open(workdir.jobs_dir(), clock).unwrap();
    let store = Arc::new(store);
    let registry = Arc::new(QueueRegistry::build(&queue_configs(), &store).unwrap());
    let (eventlog, _writer) = EventLog::open(workdir.log_dir()).unwrap();
    let hub = ClientHub::new();

    let server = crate::server::Server::new(ServerCtx {
        store,
        registry,
        hub: Arc::clone(&hub),
        eventlog,
        workdir,
        shutdown: CancellationToken::new(),
    });
    server.wire_store_observer();
    let ctx = Arc::clone(server.ctx());

    let out = OutboundQueue::new(64);
    let conn = ConnectionId(1);
    let sender = SendHandle::new(conn, Arc::clone(&out));
    hub.register_connection(conn, sender.clone());
    let client = ClientCtx { addr: ClientAddr { conn, endpoint: EndpointId::default() }, sender };

    Fixture { ctx, client, queue: out, _dir: dir }
}

fn submit_method(f: &Fixture) -> SubmitJobMethod {
    SubmitJobMethod { ctx: Arc::clone(&f.ctx) }
}

async fn wait_for_terminal(f: &Fixture, id: MoleQueueId) -> JobState {
    for _ in 0..300 {
        if let Some(job) = f.ctx.store.lookup(id) {
            if job.is_terminal() {
                return job.state;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    f.ctx.store.lookup(id).map(|j| j.state).unwrap_or(JobState::None)
}

#[tokio::test]
async fn list_queues_returns_programs_in_order() {
    let f = fixture().await;
    let method = ListQueuesMethod { ctx: Arc::clone(&f.ctx) };

    let reply = method.call(Some(json!({})), &f.client).await.unwrap();
    assert_eq!(
        reply.result,
        json!({ "Puny local queue": ["true", "false", "sleep"] })
    );
}

#[tokio::test]
async fn submit_to_unknown_queue_creates_no_job() {
    let f = fixture().await;
    let method = submit_method(&f);

    let err = method
        .call(Some(json!({ "queue": "missingQueue", "program": "any" })), &f.client)
        .await
        .unwrap_err();

    assert_eq!(err.code, codes::UNKNOWN_QUEUE);
    assert_eq!(err.message, "Unknown queue: missingQueue");
    assert!(f.ctx.store.jobs().is_empty(), "no job record may exist");
}

#[tokio::test]
async fn submit_to_unknown_program_is_32001() {
    let f = fixture().await;
    let method = submit_method(&f);

    let err = method
        .call(Some(json!({ "queue": "Puny local queue", "program": "missing" })), &f.client)
        .await
        .unwrap_err();

    assert_eq!(err.code, codes::UNKNOWN_PROGRAM);
    assert_eq!(err.message, "Unknown program: missing");
    assert!(f.ctx.store.jobs().is_empty());
}

#[tokio::test]
async fn submit_with_bad_params_is_32602() {
    let f = fixture().await;
    let method = submit_method(&f);
    let err = method.call(Some(json!({ "program": "true" })), &f.client).await.unwrap_err();
    assert_eq!(err.code, codes::INVALID_PARAMS);
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_replies_then_runs_the_job() {
    let f = fixture().await;
    let method = submit_method(&f);

    let reply = method
        .call(
            Some(json!({
                "queue": "Puny local queue",
                "program": "true",
                "inputAsString": "data"
            })),
            &f.client,
        )
        .await
        .unwrap();

    let id = MoleQueueId(reply.result["moleQueueId"].as_u64().unwrap());
    let workdir = reply.result["localWorkingDirectory"].as_str().unwrap().to_string();
    assert!(std::path::Path::new(&workdir).is_dir());
    assert_eq!(
        std::fs::read_to_string(std::path::Path::new(&workdir).join("input.in")).unwrap(),
        "data"
    );

    // Before the hook runs nothing has been dispatched.
    assert_eq!(f.ctx.store.lookup(id).unwrap().state, JobState::None);

    let hook = reply.after_reply.expect("submit must defer dispatch");
    hook();
    assert_eq!(wait_for_terminal(&f, id).await, JobState::Finished);

    // Submitter observed the whole lifecycle, in commit order.
    let states: Vec<serde_json::Value> = f
        .queue
        .drain()
        .into_iter()
        .map(|o| match o {
            Outbound::Response(v) | Outbound::Notification { frame: v, .. } => {
                v["params"]["newState"].clone()
            }
        })
        .collect();
    assert_eq!(
        states,
        vec![json!("Accepted"), json!("Submitted"), json!("RunningLocal"), json!("Finished")]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_job_reports_error_state() {
    let f = fixture().await;
    let method = submit_method(&f);
    let reply = method
        .call(Some(json!({ "queue": "Puny local queue", "program": "false" })), &f.client)
        .await
        .unwrap();
    let id = MoleQueueId(reply.result["moleQueueId"].as_u64().unwrap());
    reply.after_reply.map(|hook| hook());

    assert_eq!(wait_for_terminal(&f, id).await, JobState::Error);
    let job = f.ctx.store.lookup(id).unwrap();
    assert_eq!(job.exit_code, Some(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_twice_yields_same_terminal_state() {
    let f = fixture().await;
    let submit = submit_method(&f);
    let reply = submit
        .call(Some(json!({ "queue": "Puny local queue", "program": "sleep" })), &f.client)
        .await
        .unwrap();
    let id = MoleQueueId(reply.result["moleQueueId"].as_u64().unwrap());
    reply.after_reply.map(|hook| hook());

    // Wait for the job to start.
    for _ in 0..300 {
        if f.ctx.store.lookup(id).unwrap().state == JobState::RunningLocal {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let cancel = CancelJobMethod { ctx: Arc::clone(&f.ctx) };
    let first = cancel
        .call(Some(json!({ "moleQueueId": id.value() })), &f.client)
        .await
        .unwrap();
    assert_eq!(first.result, json!({ "moleQueueId": id.value() }));
    first.after_reply.map(|hook| hook());

    let terminal = wait_for_terminal(&f, id).await;
    assert_eq!(terminal, JobState::Killed);

    // Second cancel: same reply, state unchanged.
    let second = cancel
        .call(Some(json!({ "moleQueueId": id.value() })), &f.client)
        .await
        .unwrap();
    assert_eq!(second.result, json!({ "moleQueueId": id.value() }));
    assert!(second.after_reply.is_none(), "terminal cancel is a pure no-op");
    assert_eq!(f.ctx.store.lookup(id).unwrap().state, JobState::Killed);
}

#[tokio::test]
async fn cancel_unknown_job_is_32002() {
    let f = fixture().await;
    let cancel = CancelJobMethod { ctx: Arc::clone(&f.ctx) };
    let err = cancel.call(Some(json!({ "moleQueueId": 404 })), &f.client).await.unwrap_err();
    assert_eq!(err.code, codes::UNKNOWN_JOB);
    assert_eq!(err.message, "Unknown moleQueueId: 404");
}

#[tokio::test(flavor = "multi_thread")]
async fn lookup_returns_full_record() {
    let f = fixture().await;
    let submit = submit_method(&f);
    let reply = submit
        .call(
            Some(json!({
                "queue": "Puny local queue",
                "program": "true",
                "description": "smoke test",
                "numberOfProcessors": 2
            })),
            &f.client,
        )
        .await
        .unwrap();
    let id = MoleQueueId(reply.result["moleQueueId"].as_u64().unwrap());
    reply.after_reply.map(|hook| hook());
    wait_for_terminal(&f, id).await;

    let lookup = LookupJobMethod { ctx: Arc::clone(&f.ctx) };
    let detail =
        lookup.call(Some(json!({ "moleQueueId": id.value() })), &f.client).await.unwrap();
    assert_eq!(detail.result["moleQueueId"], json!(id.value()));
    assert_eq!(detail.result["queue"], json!("Puny local queue"));
    assert_eq!(detail.result["program"], json!("true"));
    assert_eq!(detail.result["description"], json!("smoke test"));
    assert_eq!(detail.result["numberOfProcessors"], json!(2));
    assert_eq!(detail.result["state"], json!("Finished"));
    assert_eq!(detail.result["exitCode"], json!(0));
}

#[tokio::test]
async fn lookup_unknown_job_is_32002() {
    let f = fixture().await;
    let lookup = LookupJobMethod { ctx: Arc::clone(&f.ctx) };
    let err = lookup.call(Some(json!({ "moleQueueId": 9 })), &f.client).await.unwrap_err();
    assert_eq!(err.code, codes::UNKNOWN_JOB);
}

#[tokio::test]
async fn rpc_kill_acks_then_cancels() {
    let f = fixture().await;
    let kill = RpcKillMethod { ctx: Arc::clone(&f.ctx) };

    let reply = kill.call(None, &f.client).await.unwrap();
    assert_eq!(reply.result, json!({ "success": true }));
    assert!(!f.ctx.shutdown.is_cancelled(), "shutdown only after the reply");

    reply.after_reply.map(|hook| hook());
    assert!(f.ctx.shutdown.is_cancelled());
}
