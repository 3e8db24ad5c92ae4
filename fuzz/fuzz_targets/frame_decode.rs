//! Fuzz target for Frame::decode.
//!
//! Frame::decode must never panic on arbitrary bytes: malformed headers,
//! truncated payloads, and CRC mismatches should all surface as `None`.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::time::Instant;
use uavcan_serial_proto::Frame;

fuzz_target!(|data: &[u8]| {
    let _ = Frame::decode(data, Instant::now());
});
