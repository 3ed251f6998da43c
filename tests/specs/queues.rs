// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Queue listing and submit validation specs.

use super::prelude::*;
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn list_queues_returns_exact_mapping_in_order() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    client.send(&json!({ "jsonrpc": "2.0", "id": 1, "method": "listQueues" })).await;
    let reply = client.recv().await;

    assert_eq!(
        reply["result"],
        json!({
            "Some big ol' cluster": ["Quantum Tater", "Crystal Math", "Nebulous Nucleus"],
            "Puny local queue": ["SpectroCrunch", "FastFocker", "SpeedSlater"]
        })
    );

    // Insertion order is part of the contract.
    let text = reply["result"].to_string();
    let big = text.find("Some big ol' cluster").expect("cluster queue");
    let puny = text.find("Puny local queue").expect("local queue");
    assert!(big < puny);
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_to_unknown_queue_creates_no_job() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    let reply =
        client.call(1, "submitJob", json!({ "queue": "missingQueue", "program": "any" })).await;
    assert_eq!(reply["error"]["code"], json!(-32000));
    assert_eq!(reply["error"]["message"], json!("Unknown queue: missingQueue"));

    // No job was created: id 1 does not resolve.
    let lookup = client.call(2, "lookupJob", json!({ "moleQueueId": 1 })).await;
    assert_eq!(lookup["error"]["code"], json!(-32002));
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_to_unknown_program_is_rejected() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    let reply = client
        .call(1, "submitJob", json!({ "queue": "Puny local queue", "program": "TurboTater" }))
        .await;
    assert_eq!(reply["error"]["code"], json!(-32001));
    assert_eq!(reply["error"]["message"], json!("Unknown program: TurboTater"));
}
