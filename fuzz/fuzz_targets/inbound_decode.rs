//! Arbitrary bytes through the inbound decoder.
//!
//! Decoding must never panic, and anything that decodes must survive a
//! re-encode and decode unchanged.

#![no_main]

use courier_proto::InboundMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(message) = InboundMessage::decode(data) else {
        return;
    };
    let encoded = message.encode().expect("decoded message encodes");
    let again = InboundMessage::decode(&encoded).expect("encoded message decodes");
    assert_eq!(message, again);
});
