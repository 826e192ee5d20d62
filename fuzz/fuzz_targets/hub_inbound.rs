//! Decoded frames from a handful of connections through the hub.
//!
//! Input is split into lines; each line is read from connection
//! `first byte % 4`. The registry must stay consistent throughout.

#![no_main]

use courier_core::Hub;
use courier_proto::InboundMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut hub = Hub::new();
    for conn in 0..4 {
        hub.register(conn);
    }

    for line in data.split(|b| *b == b'\n') {
        let Some((&selector, rest)) = line.split_first() else {
            continue;
        };
        let conn = u64::from(selector % 4);
        if selector == 0xff {
            hub.unregister(conn);
            continue;
        }
        if let Ok(message) = InboundMessage::decode(rest) {
            let _ = hub.handle_inbound(conn, &message);
        }
        assert!(hub.is_consistent());
    }
});
