//! Resynchronising stream parser: turns a noisy byte stream into frames and
//! out-of-band spans.
//!
//! Byte-at-a-time state machine with two states (spec.md §4.3):
//!
//! - **Between**: outside a frame. `0x9E` flushes any accumulated
//!   out-of-band bytes and opens a frame. Anything else accumulates as OOB.
//! - **Inside**: collecting frame bytes. `0x9E` closes the frame (attempting
//!   a decode); `0x8E` escapes the next byte; anything else accumulates.
//!   An oversized in-progress frame is aborted to OOB and the triggering
//!   byte is re-processed as if freshly arrived in `Between`.
//!
//! The parser never allocates per byte — it reuses one scratch buffer for
//! whichever span (OOB or frame body) is currently accumulating.

use std::time::Instant;

use crate::{
    frame::Frame,
    framing::{DELIMITER, ESCAPE, ESCAPE_XOR},
};

/// One thing the parser can hand back: a decoded frame, or a span of bytes
/// that was not protocol traffic.
#[derive(Debug)]
pub enum ParserEvent<'a> {
    /// A frame whose framing, header CRC, and payload CRC all verified.
    Frame(Frame<'a>),
    /// Bytes that arrived between frames, or the contents of a frame that
    /// failed to decode, or a frame aborted for exceeding the size limit.
    OutOfBand(&'a [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Between,
    Inside,
}

/// Resynchronising byte-stuffed frame parser.
pub struct StreamParser {
    state: State,
    escaping: bool,
    buffer: Vec<u8>,
    max_frame_len: usize,
}

impl StreamParser {
    /// Create a parser that aborts any in-progress frame exceeding
    /// `max_frame_len` unescaped bytes (the engine's MTU plus header and
    /// CRC overhead).
    #[must_use]
    pub fn new(max_frame_len: usize) -> Self {
        Self { state: State::Between, escaping: false, buffer: Vec::new(), max_frame_len }
    }

    /// Feed a chunk of bytes, invoking `sink` once per completed frame or
    /// out-of-band span. `timestamp` is the arrival time of the whole
    /// chunk and is what gets attached to any frame closed while processing
    /// it (spec.md §4.3: "timestamp = arrival time of its closing
    /// delimiter" — since this core reads in chunks rather than bytes, the
    /// chunk's arrival time is the closest available approximation).
    pub fn feed<F>(&mut self, bytes: &[u8], timestamp: Instant, mut sink: F)
    where
        F: for<'b> FnMut(ParserEvent<'b>, Instant),
    {
        for &byte in bytes {
            self.feed_byte(byte, timestamp, &mut sink);
        }
    }

    fn feed_byte<F>(&mut self, byte: u8, timestamp: Instant, sink: &mut F)
    where
        F: for<'b> FnMut(ParserEvent<'b>, Instant),
    {
        match self.state {
            State::Between => self.process_between(byte, timestamp, sink),
            State::Inside => self.process_inside(byte, timestamp, sink),
        }
    }

    fn process_between<F>(&mut self, byte: u8, timestamp: Instant, sink: &mut F)
    where
        F: for<'b> FnMut(ParserEvent<'b>, Instant),
    {
        if byte == DELIMITER {
            self.flush_oob(timestamp, sink);
            self.state = State::Inside;
            self.escaping = false;
        } else {
            self.buffer.push(byte);
        }
    }

    fn process_inside<F>(&mut self, byte: u8, timestamp: Instant, sink: &mut F)
    where
        F: for<'b> FnMut(ParserEvent<'b>, Instant),
    {
        if self.escaping {
            self.escaping = false;
            self.push_frame_byte(byte ^ ESCAPE_XOR, byte, timestamp, sink);
            return;
        }
        match byte {
            DELIMITER => self.close_frame(timestamp, sink),
            ESCAPE => self.escaping = true,
            _ => self.push_frame_byte(byte, byte, timestamp, sink),
        }
    }

    /// Append `value` to the in-progress frame body, or — if that would
    /// exceed `max_frame_len` — abort the frame to OOB and re-process
    /// `raw_incoming` as a fresh byte in `Between`.
    fn push_frame_byte<F>(&mut self, value: u8, raw_incoming: u8, timestamp: Instant, sink: &mut F)
    where
        F: for<'b> FnMut(ParserEvent<'b>, Instant),
    {
        if self.buffer.len() + 1 > self.max_frame_len {
            tracing::debug!(len = self.buffer.len(), "aborting oversized frame");
            self.flush_oob(timestamp, sink);
            self.state = State::Between;
            self.escaping = false;
            self.process_between(raw_incoming, timestamp, sink);
            return;
        }
        self.buffer.push(value);
    }

    fn close_frame<F>(&mut self, timestamp: Instant, sink: &mut F)
    where
        F: for<'b> FnMut(ParserEvent<'b>, Instant),
    {
        if self.buffer.is_empty() {
            // Delimiter collapse: this closing delimiter doubles as the
            // opening delimiter of the next frame.
            self.escaping = false;
            return;
        }
        match Frame::decode(&self.buffer, timestamp) {
            Some(frame) => sink(ParserEvent::Frame(frame), timestamp),
            None => sink(ParserEvent::OutOfBand(&self.buffer), timestamp),
        }
        self.buffer.clear();
        // This closing delimiter doubles as the next frame's opening
        // delimiter (spec.md §4.3 delimiter collapse) — stay in `Inside`
        // rather than falling back to `Between`, or the very next byte
        // would be mistaken for out-of-band data instead of frame body.
        self.state = State::Inside;
        self.escaping = false;
    }

    fn flush_oob<F>(&mut self, timestamp: Instant, sink: &mut F)
    where
        F: for<'b> FnMut(ParserEvent<'b>, Instant),
    {
        if !self.buffer.is_empty() {
            sink(ParserEvent::OutOfBand(&self.buffer), timestamp);
            self.buffer.clear();
        }
    }
}
