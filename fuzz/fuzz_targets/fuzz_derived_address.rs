//! Fuzz target for address parsing.
//!
//! Tests that both address encodings reject arbitrary strings without
//! panicking, and that an accepted address survives conversion.

#![no_main]

use libfuzzer_sys::fuzz_target;
use strata_types::{BaseAddress, Network};

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);
    for network in [Network::Main, Network::Test, Network::Regtest] {
        if let Ok((address, _form)) = BaseAddress::parse_any(&s, network) {
            let derived = address
                .encode_derived(network)
                .expect("parsed address has a derived form");
            assert_eq!(
                BaseAddress::decode_derived(&derived, network).ok(),
                Some(address)
            );
        }
    }
});
