// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Length-prefixed framing and packet decoding.
//!
//! A packet is one JSON value. A top-level array is a JSON-RPC batch; its
//! elements become independent messages whose replies are collected back
//! into an array in the same order.

use crate::error::{ProtocolError, RpcError};
use crate::message::Message;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single framed packet. Protects the reader from a
/// corrupt or hostile length prefix.
pub const MAX_PACKET_BYTES: usize = 128 * 1024 * 1024;

/// Read one length-prefixed packet.
pub async fn read_packet<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(eof_is_closed)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_PACKET_BYTES {
        return Err(ProtocolError::PacketTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(eof_is_closed)?;
    Ok(body)
}

/// Write one length-prefixed packet and flush.
pub async fn write_packet<W>(writer: &mut W, body: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_PACKET_BYTES {
        return Err(ProtocolError::PacketTooLarge(body.len()));
    }
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

fn eof_is_closed(e: std::io::Error) -> ProtocolError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::ConnectionClosed
    } else {
        ProtocolError::Io(e)
    }
}

/// One decoded item of a packet: either a classified message or a shape
/// failure carrying the error to reply with.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Message(Message),
    Invalid { id: Value, error: RpcError },
}

/// A decoded packet. `batch` records whether the transmission was a JSON
/// array, in which case replies are grouped into an array in item order.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub batch: bool,
    pub items: Vec<Decoded>,
}

/// Decode one transmission into messages.
///
/// Never fails: malformed input decodes to `Decoded::Invalid` items so the
/// caller always has a well-formed error reply to send.
pub fn decode_packet(bytes: &[u8]) -> Packet {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(_) => {
            return Packet {
                batch: false,
                items: vec![Decoded::Invalid { id: Value::Null, error: RpcError::parse_error() }],
            }
        }
    };

    match value {
        Value::Array(elements) => {
            // An empty batch is itself an invalid request.
            if elements.is_empty() {
                return Packet {
                    batch: false,
                    items: vec![Decoded::Invalid {
                        id: Value::Null,
                        error: RpcError::invalid_request(),
                    }],
                };
            }
            Packet { batch: true, items: elements.into_iter().map(decode_one).collect() }
        }
        other => Packet { batch: false, items: vec![decode_one(other)] },
    }
}

fn decode_one(value: Value) -> Decoded {
    match Message::classify(value) {
        Ok(message) => Decoded::Message(message),
        Err(id) => Decoded::Invalid { id, error: RpcError::invalid_request() },
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
