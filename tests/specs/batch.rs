// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! JSON-RPC batch specs.

use super::prelude::*;
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn batch_replies_arrive_as_one_array_in_order() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    client
        .send(&json!([
            { "jsonrpc": "2.0", "id": 1, "method": "internalPing" },
            { "jsonrpc": "2.0", "id": 2, "method": "listQueues" },
            { "jsonrpc": "2.0", "id": 3, "method": "noSuchMethod" }
        ]))
        .await;

    let reply = client.recv().await;
    let batch = reply.as_array().expect("batch reply is an array");
    assert_eq!(batch.len(), 3);
    assert_eq!(batch[0]["id"], json!(1));
    assert_eq!(batch[0]["result"], json!("pong"));
    assert_eq!(batch[1]["id"], json!(2));
    assert!(batch[1]["result"].is_object());
    assert_eq!(batch[2]["id"], json!(3));
    assert_eq!(batch[2]["error"]["code"], json!(-32601));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_batch_is_invalid_request() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    client.send(&json!([])).await;
    let reply = client.recv().await;
    assert_eq!(reply["error"]["code"], json!(-32600));
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_ids_within_a_batch_are_refused() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    client
        .send(&json!([
            { "jsonrpc": "2.0", "id": 7, "method": "internalPing" },
            { "jsonrpc": "2.0", "id": 7, "method": "internalPing" }
        ]))
        .await;

    let reply = client.recv().await;
    let batch = reply.as_array().expect("batch reply");
    assert_eq!(batch[0]["result"], json!("pong"));
    assert_eq!(batch[1]["error"]["code"], json!(-32600));
}
