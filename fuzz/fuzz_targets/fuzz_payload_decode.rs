//! Fuzz target for protocol payload decoding.
//!
//! Tests that the message decoder handles arbitrary input without panicking,
//! and that anything it accepts encodes again.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = strata_codec::Message::decode(data) {
        let _ = message.encode();
        let _ = message.message_type();
    }
});
