// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Full job lifecycle specs against the local queue.

use super::prelude::*;
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn local_job_walks_the_whole_lifecycle() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    client
        .send(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "submitJob",
            "params": {
                "queue": "Puny local queue",
                "program": "SpectroCrunch",
                "inputAsString": "dummy input"
            }
        }))
        .await;

    // The submit response always precedes the first notification.
    let response = client.recv().await;
    assert_eq!(response["id"], json!(1), "first frame is the response, got {response}");
    let id = response["result"]["moleQueueId"].as_u64().expect("moleQueueId");
    assert!(id >= 1);
    let workdir = response["result"]["localWorkingDirectory"].as_str().expect("workdir");
    assert!(std::path::Path::new(workdir).is_dir());

    let states = client.collect_states_until_terminal(id).await;
    assert_eq!(states, vec!["Accepted", "Submitted", "RunningLocal", "Finished"]);

    // The record reflects the terminal state and exit code.
    let detail = client.call(2, "lookupJob", json!({ "moleQueueId": id })).await;
    assert_eq!(detail["result"]["state"], json!("Finished"));
    assert_eq!(detail["result"]["exitCode"], json!(0));

    // Captured stdout/stderr files exist in the working directory.
    assert!(std::path::Path::new(workdir).join("stdout").exists());
    assert!(std::path::Path::new(workdir).join("stderr").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_program_ends_in_error() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    client
        .send(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "submitJob",
            "params": { "queue": "Puny local queue", "program": "FastFocker" }
        }))
        .await;
    let response = client.recv().await;
    let id = response["result"]["moleQueueId"].as_u64().expect("moleQueueId");

    let states = client.collect_states_until_terminal(id).await;
    assert_eq!(states.last().map(String::as_str), Some("Error"));

    let detail = client.call(2, "lookupJob", json!({ "moleQueueId": id })).await;
    assert_eq!(detail["result"]["exitCode"], json!(1));
    assert!(detail["result"]["errorMessage"].as_str().unwrap_or_default().contains("code 1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_twice_is_idempotent() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    client
        .send(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "submitJob",
            "params": { "queue": "Puny local queue", "program": "SpeedSlater" }
        }))
        .await;
    let response = client.recv().await;
    let id = response["result"]["moleQueueId"].as_u64().expect("moleQueueId");

    // Let the long-running job reach a running state.
    let mut running = false;
    for _ in 0..3 {
        let frame = client.recv().await;
        if frame["params"]["newState"] == json!("RunningLocal") {
            running = true;
            break;
        }
    }
    assert!(running, "job never started running");

    let first = client.call(2, "cancelJob", json!({ "moleQueueId": id })).await;
    assert_eq!(first["result"], json!({ "moleQueueId": id }));

    // Drain frames until the terminal notification shows up.
    let mut terminal = None;
    while terminal.is_none() {
        let frame = client.recv().await;
        if frame.get("method").is_some() {
            let state = frame["params"]["newState"].as_str().unwrap_or_default().to_string();
            if matches!(state.as_str(), "Killed" | "Canceled") {
                terminal = Some(state);
            }
        }
    }
    let terminal = terminal.expect("terminal state");

    // Second cancel succeeds and nothing changes.
    let second = client.call(3, "cancelJob", json!({ "moleQueueId": id })).await;
    assert_eq!(second["result"], json!({ "moleQueueId": id }));

    let detail = client.call(4, "lookupJob", json!({ "moleQueueId": id })).await;
    assert_eq!(detail["result"]["state"], json!(terminal.as_str()));
}

#[tokio::test(flavor = "multi_thread")]
async fn rpc_kill_stops_the_broker_when_enabled() {
    let broker = Broker::start_with(REFERENCE_CONFIG, true).await;
    let mut client = broker.client().await;

    let reply = client.call(1, "rpcKill", json!({})).await;
    assert_eq!(reply["result"], json!({ "success": true }));
    broker.wait_stopped().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rpc_kill_is_absent_without_the_flag() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    let reply = client.call(1, "rpcKill", json!({})).await;
    assert_eq!(reply["error"]["code"], json!(-32601));
}
