//! Fuzz target for StreamParser::feed.
//!
//! Arbitrary byte streams — including ones that interleave delimiters,
//! escapes, and valid frames in any order — must never panic and must
//! resynchronise: every `OutOfBand` span handed back is non-empty and the
//! parser always returns to a byte-consuming state afterwards.

#![no_main]

use std::time::Instant;

use libfuzzer_sys::fuzz_target;
use uavcan_serial_proto::{ParserEvent, StreamParser};

const MAX_FRAME_LEN: usize = 4096;

fuzz_target!(|chunks: Vec<Vec<u8>>| {
    let mut parser = StreamParser::new(MAX_FRAME_LEN);
    for chunk in chunks {
        parser.feed(&chunk, Instant::now(), |event, _| {
            if let ParserEvent::OutOfBand(bytes) = event {
                assert!(!bytes.is_empty(), "an out-of-band span must never be flushed empty");
            }
        });
    }
});
