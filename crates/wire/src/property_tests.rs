// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Property tests: framing round-trips and decode never panics.

use super::*;
use proptest::prelude::*;

proptest! {
    #[test]
    fn framing_roundtrips_arbitrary_bodies(body in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let mut buffer = Vec::new();
            write_packet(&mut buffer, &body).await.unwrap();
            let mut cursor = std::io::Cursor::new(buffer);
            let read_back = read_packet(&mut cursor).await.unwrap();
            prop_assert_eq!(read_back, body);
            Ok(())
        })?;
    }

    #[test]
    fn decode_packet_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let packet = decode_packet(&bytes);
        // Every item is either a message or carries a ready error reply.
        prop_assert!(!packet.items.is_empty());
    }

    #[test]
    fn malformed_json_always_gets_exactly_one_parse_error(s in "[^\\[{]{0,64}") {
        // Strings that cannot open a JSON object/array mostly fail to parse;
        // when they do fail, the reply is a single -32700 with null id.
        let packet = decode_packet(s.as_bytes());
        if let [Decoded::Invalid { id, error }] = packet.items.as_slice() {
            if error.code == codes::PARSE_ERROR {
                prop_assert_eq!(id, &serde_json::Value::Null);
                prop_assert!(!packet.batch);
            }
        }
    }
}
