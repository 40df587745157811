#![no_main]

use libfuzzer_sys::fuzz_target;
use packet_node::core::codec::MessageCodec;
use packet_node::core::packet::{JsonPacket, PacketId};
use packet_node::core::registry::PacketRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Chat {
    author: String,
    text: String,
    sequence: i64,
}

impl JsonPacket for Chat {
    const ID: PacketId = 1;
}

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary text must never panic, registered id or not
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    let registry = Arc::new(PacketRegistry::new());
    let _ = registry.register::<Chat>();
    let codec = MessageCodec::new(registry);
    let _ = codec.decode(raw);
});
