// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Concurrent-client specs: many clients submitting in parallel.

use super::prelude::*;
use serde_json::json;
use std::collections::HashSet;

const CLIENTS: usize = 10;
const JOBS_PER_CLIENT: usize = 20;

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_submitters_get_distinct_ids_and_terminal_notifications() {
    let broker = Broker::start().await;

    let mut tasks = Vec::new();
    for client_index in 0..CLIENTS {
        let mut client = broker.client().await;
        tasks.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            let mut terminal: HashSet<u64> = HashSet::new();

            for n in 0..JOBS_PER_CLIENT {
                let request_id = (client_index * JOBS_PER_CLIENT + n + 1) as u64;
                client
                    .send(&json!({
                        "jsonrpc": "2.0",
                        "id": request_id,
                        "method": "submitJob",
                        "params": {
                            "queue": "Puny local queue",
                            "program": "SpectroCrunch"
                        }
                    }))
                    .await;
            }

            // Responses and notifications interleave; a frame with an id
            // is a response, one with a method is a notification.
            let mut responses = 0;
            while responses < JOBS_PER_CLIENT || terminal.len() < JOBS_PER_CLIENT {
                let frame = client.recv().await;
                if frame.get("method").is_some() {
                    let state = frame["params"]["newState"].as_str().unwrap_or_default();
                    if matches!(state, "Finished" | "Canceled" | "Killed" | "Error") {
                        terminal
                            .insert(frame["params"]["moleQueueId"].as_u64().expect("job id"));
                    }
                } else {
                    responses += 1;
                    let id = frame["result"]["moleQueueId"].as_u64().expect("moleQueueId");
                    ids.push(id);
                }
            }
            (ids, terminal)
        }));
    }

    let mut all_ids: Vec<u64> = Vec::new();
    for task in tasks {
        let (ids, terminal) = task.await.expect("client task");
        assert_eq!(ids.len(), JOBS_PER_CLIENT, "every submit got exactly one response");
        for id in &ids {
            assert!(terminal.contains(id), "job {id} reached a terminal state");
        }
        all_ids.extend(ids);
    }

    // Ids are globally distinct.
    let unique: HashSet<u64> = all_ids.iter().copied().collect();
    assert_eq!(unique.len(), CLIENTS * JOBS_PER_CLIENT);
}
