// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Wire-protocol specs: ping, malformed input, error taxonomy.

use super::prelude::*;
use serde_json::json;
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread")]
async fn internal_ping_answers_pong_quickly() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    let started = Instant::now();
    client.send(&json!({ "jsonrpc": "2.0", "id": 1, "method": "internalPing" })).await;
    let reply = client.recv().await;
    let elapsed = started.elapsed();

    assert_eq!(reply, json!({ "jsonrpc": "2.0", "id": 1, "result": "pong" }));
    assert!(elapsed < Duration::from_millis(100), "ping took {elapsed:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_packet_gets_exactly_one_parse_error() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    client.send_raw(b"{ not json at all").await;
    let reply = client.recv().await;
    assert_eq!(reply["error"]["code"], json!(-32700));
    assert_eq!(reply["error"]["message"], json!("Parse error"));
    assert_eq!(reply["id"], json!(null));

    // No second reply for the same packet...
    assert!(client.try_recv(Duration::from_millis(100)).await.is_none());

    // ...and the connection stays open and serviceable.
    let pong = client.call(2, "internalPing", json!({})).await;
    assert_eq!(pong["result"], json!("pong"));
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_shape_gets_invalid_request() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    client.send(&json!({ "jsonrpc": "2.0", "id": 3 })).await;
    let reply = client.recv().await;
    assert_eq!(reply["error"]["code"], json!(-32600));
    assert_eq!(reply["id"], json!(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_method_gets_method_not_found() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    let reply = client.call(4, "fetchCoffee", json!({})).await;
    assert_eq!(reply["error"]["code"], json!(-32601));
}

#[tokio::test(flavor = "multi_thread")]
async fn lookup_unknown_job_is_application_error() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    let reply = client.call(5, "lookupJob", json!({ "moleQueueId": 12345 })).await;
    assert_eq!(reply["error"]["code"], json!(-32002));
    assert_eq!(reply["error"]["message"], json!("Unknown moleQueueId: 12345"));
}

#[tokio::test(flavor = "multi_thread")]
async fn each_request_gets_exactly_one_reply() {
    let broker = Broker::start().await;
    let mut client = broker.client().await;

    for id in 1..=20u64 {
        client.send(&json!({ "jsonrpc": "2.0", "id": id, "method": "internalPing" })).await;
    }
    for id in 1..=20u64 {
        let reply = client.recv().await;
        assert_eq!(reply["id"], json!(id), "replies arrive in request order");
        assert_eq!(reply["result"], json!("pong"));
    }
    assert!(client.try_recv(Duration::from_millis(100)).await.is_none());
}
