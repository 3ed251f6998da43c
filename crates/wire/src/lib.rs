// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! JSON-RPC 2.0 wire codec for the MoleQueue broker.
//!
//! Wire format: 4-byte length prefix (big-endian) + UTF-8 JSON payload.
//! One transmission is one JSON value; arrays are batches and expand into
//! independent messages.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod error;
mod message;
mod methods;

pub use codec::{decode_packet, read_packet, write_packet, Decoded, Packet, MAX_PACKET_BYTES};
pub use error::{codes, ProtocolError, RpcError};
pub use message::{
    error_frame, notification_frame, request_frame, response_frame, Message,
};
pub use methods::{
    CancelJobParams, CancelJobResult, JobDetail, JobStateChangeNotification, ListQueuesResult,
    LookupJobParams, SubmitJobParams, SubmitJobResult, WireFile,
};

#[cfg(test)]
mod property_tests;
