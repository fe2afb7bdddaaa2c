//! Incremental sensor frame extraction.
//!
//! Serial reads hand over arbitrary slices of the sensor byte stream: half a
//! frame, three frames, or line noise followed by a frame. [`StreamParser`]
//! accumulates those chunks and yields validated frames in arrival order.
//!
//! # Framing modes
//!
//! ```text
//! LengthPrefixed   STX LEN ............ ETX     candidate = LEN + 3 bytes
//! Delimited        STX ............... ETX      candidate = STX ..= next ETX
//! ```
//!
//! Length prefixed framing is immune to `0x03` bytes inside the float
//! payload. Delimited framing matches the older firmware revision that
//! sometimes sends a wrong LEN.
//!
//! # Usage
//!
//! ```
//! use elocker_protocol::{StreamParser, build_sensor_request};
//!
//! let bytes = build_sensor_request(5, 0x00, &[]).unwrap().to_bytes();
//!
//! let mut parser = StreamParser::new();
//! parser.feed(&bytes[..3]);
//! assert!(parser.next_frame().is_none());
//!
//! parser.feed(&bytes[3..]);
//! let parsed = parser.next_frame().unwrap();
//! assert_eq!(parsed.frame.id(), 5);
//! ```

use bytes::{Buf, BytesMut};
use elocker_core::constants::{END_BYTE, SENSOR_FRAME_OVERHEAD, START_BYTE};
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::sensor::{ParsedFrame, parse_sensor_frame};

/// Maximum buffered bytes before the accumulator is discarded.
const MAX_BUFFER_SIZE: usize = 4 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 512;

const INITIAL_FRAME_QUEUE_CAPACITY: usize = 4;

/// How a candidate frame is delimited in the byte stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FramingMode {
    /// Candidate spans `LEN + 3` bytes from STX.
    #[default]
    LengthPrefixed,

    /// Candidate spans from STX to the first following ETX.
    Delimited,
}

/// Outcome of one extraction step.
enum Step {
    /// A candidate was consumed (valid or not); try again.
    Progress,
    /// The buffer needs more bytes.
    NeedMore,
}

/// Stateful demultiplexer for one sensor link.
#[derive(Debug)]
pub struct StreamParser {
    buffer: BytesMut,
    mode: FramingMode,
    frames: VecDeque<ParsedFrame>,

    /// Candidates rejected since creation.
    rejected: u64,
}

impl StreamParser {
    /// Parser in [`FramingMode::LengthPrefixed`] mode.
    pub fn new() -> Self {
        Self::with_mode(FramingMode::default())
    }

    pub fn with_mode(mode: FramingMode) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            mode,
            frames: VecDeque::with_capacity(INITIAL_FRAME_QUEUE_CAPACITY),
            rejected: 0,
        }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    /// Append a chunk and extract every frame it completes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        while let Step::Progress = self.step() {}

        // only an unfinished candidate is left; it can never complete
        // once it outgrows the cap
        if self.buffer.len() > MAX_BUFFER_SIZE {
            warn!(
                buffered = self.buffer.len(),
                max = MAX_BUFFER_SIZE,
                "Sensor stream buffer overflow, discarding"
            );
            self.buffer.clear();
        }
    }

    /// Next validated frame, oldest first.
    pub fn next_frame(&mut self) -> Option<ParsedFrame> {
        self.frames.pop_front()
    }

    pub fn frames_available(&self) -> usize {
        self.frames.len()
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of candidates that failed validation.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Drop buffered bytes and queued frames.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.frames.clear();
    }

    /// Iterator over the frames queued so far.
    ///
    /// Does not consume more of the buffer; call [`feed()`] first.
    ///
    /// [`feed()`]: StreamParser::feed
    pub fn drain_frames(&mut self) -> DrainFrames<'_> {
        DrainFrames { parser: self }
    }

    fn step(&mut self) -> Step {
        let Some(stx) = self.buffer.iter().position(|&b| b == START_BYTE) else {
            // no frame can start inside these bytes
            if !self.buffer.is_empty() {
                debug!(discarded = self.buffer.len(), "Skipping bytes without STX");
                self.buffer.clear();
            }
            return Step::NeedMore;
        };
        if stx > 0 {
            debug!(discarded = stx, "Skipping bytes before STX");
            self.buffer.advance(stx);
        }

        let candidate_len = match self.mode {
            FramingMode::LengthPrefixed => {
                let Some(&len) = self.buffer.get(1) else {
                    return Step::NeedMore;
                };
                usize::from(len) + SENSOR_FRAME_OVERHEAD
            }
            FramingMode::Delimited => {
                match self.buffer.iter().skip(1).position(|&b| b == END_BYTE) {
                    Some(offset) => offset + 2,
                    None => return Step::NeedMore,
                }
            }
        };
        if self.buffer.len() < candidate_len {
            return Step::NeedMore;
        }

        let candidate = &self.buffer[..candidate_len];
        match parse_sensor_frame(candidate) {
            Ok(parsed) => {
                if let Some(mismatch) = &parsed.length_mismatch {
                    debug!(device_id = parsed.frame.id(), %mismatch, "Accepting frame with bad LEN");
                }
                self.frames.push_back(parsed);
                self.buffer.advance(candidate_len);
            }
            Err(err) => {
                // Stop at an STX inside the rejected candidate so a frame
                // behind a stray STX is not swallowed.
                let consumed = candidate
                    .iter()
                    .skip(1)
                    .position(|&b| b == START_BYTE)
                    .map_or(candidate_len, |offset| offset + 1);
                warn!(
                    error = %err,
                    candidate_len,
                    consumed,
                    "Dropping invalid sensor frame"
                );
                self.rejected += 1;
                self.buffer.advance(consumed);
            }
        }
        Step::Progress
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Draining iterator returned by [`StreamParser::drain_frames`].
pub struct DrainFrames<'a> {
    parser: &'a mut StreamParser,
}

impl Iterator for DrainFrames<'_> {
    type Item = ParsedFrame;

    fn next(&mut self) -> Option<Self::Item> {
        self.parser.next_frame()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.parser.frames_available();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for DrainFrames<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::crc16_modbus;
    use crate::sensor::build_sensor_request;

    fn request(id: u8, data: &[u8]) -> Vec<u8> {
        build_sensor_request(id, 0x00, data).unwrap().to_bytes().to_vec()
    }

    /// Reply with a deliberately wrong LEN, CRC over the bytes actually sent.
    fn reply_with_len(id: u8, len: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![START_BYTE, len, id];
        out.extend_from_slice(payload);
        let crc = crc16_modbus(&out[1..]);
        out.extend_from_slice(&crc.to_be_bytes());
        out.push(END_BYTE);
        out
    }

    #[test]
    fn test_single_frame() {
        let mut parser = StreamParser::new();
        parser.feed(&request(5, &[]));

        assert_eq!(parser.frames_available(), 1);
        assert_eq!(parser.next_frame().unwrap().frame.id(), 5);
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_byte_by_byte() {
        let bytes = request(6, &[1, 2, 3]);
        let mut parser = StreamParser::new();
        for (i, b) in bytes.iter().enumerate() {
            parser.feed(&[*b]);
            let expected = usize::from(i == bytes.len() - 1);
            assert_eq!(parser.frames_available(), expected);
        }
    }

    #[test]
    fn test_waits_for_len_byte() {
        let mut parser = StreamParser::new();
        parser.feed(&[START_BYTE]);
        assert_eq!(parser.buffered_len(), 1);
        assert_eq!(parser.frames_available(), 0);
    }

    #[test]
    fn test_multiple_frames_in_order() {
        let mut data = request(5, &[]);
        data.extend(request(6, &[0x10]));
        data.extend(request(7, &[0x20, 0x03]));

        let mut parser = StreamParser::new();
        parser.feed(&data);

        let ids: Vec<u8> = parser.drain_frames().map(|p| p.frame.id()).collect();
        assert_eq!(ids, vec![5, 6, 7]);
    }

    #[test]
    fn test_garbage_before_frame() {
        let mut data = vec![0xFF, 0x00, 0x7E];
        data.extend(request(8, &[]));

        let mut parser = StreamParser::new();
        parser.feed(&data);
        assert_eq!(parser.next_frame().unwrap().frame.id(), 8);
        assert_eq!(parser.rejected(), 0);
    }

    #[test]
    fn test_garbage_without_stx_is_dropped() {
        let mut parser = StreamParser::new();
        parser.feed(&[0x11, 0x22, 0x33]);
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_long_noise_then_frame() {
        let mut parser = StreamParser::new();
        parser.feed(&[0xFF; MAX_BUFFER_SIZE - 4]);
        parser.feed(&request(5, &[]));

        assert_eq!(parser.next_frame().unwrap().frame.id(), 5);
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_chunk_larger_than_cap_yields_every_frame() {
        let mut data = Vec::new();
        for i in 0..600u32 {
            data.extend(request((i % 200) as u8 + 1, &[]));
        }
        assert!(data.len() > MAX_BUFFER_SIZE);

        let mut parser = StreamParser::new();
        parser.feed(&data);
        assert_eq!(parser.drain_frames().count(), 600);
        assert_eq!(parser.rejected(), 0);
    }

    #[test]
    fn test_stray_stx_before_frame() {
        // Stray STX makes the real STX look like LEN=2; the candidate fails
        // and consumption stops at the real frame.
        let mut data = vec![START_BYTE];
        data.extend(request(5, &[]));

        let mut parser = StreamParser::new();
        parser.feed(&data);

        assert_eq!(parser.rejected(), 1);
        assert_eq!(parser.next_frame().unwrap().frame.id(), 5);
    }

    #[test]
    fn test_corrupt_frame_then_valid() {
        let mut bad = request(5, &[0x42]);
        bad[3] ^= 0x55;
        let mut data = bad;
        data.extend(request(6, &[]));

        let mut parser = StreamParser::new();
        parser.feed(&data);

        assert_eq!(parser.rejected(), 1);
        let frames: Vec<_> = parser.drain_frames().collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame.id(), 6);
    }

    #[test]
    fn test_zero_len_candidate_makes_progress() {
        let mut data = vec![START_BYTE, 0x00, 0x00];
        data.extend(request(7, &[]));

        let mut parser = StreamParser::new();
        parser.feed(&data);
        assert_eq!(parser.next_frame().unwrap().frame.id(), 7);
    }

    #[test]
    fn test_overflow_clears_buffer() {
        let mut parser = StreamParser::with_mode(FramingMode::Delimited);
        // no ETX ever arrives, so the candidate keeps growing
        parser.feed(&[START_BYTE, 0x10]);
        parser.feed(&vec![0u8; MAX_BUFFER_SIZE]);
        assert_eq!(parser.buffered_len(), 0);

        parser.feed(&request(5, &[]));
        assert_eq!(parser.frames_available(), 1);
    }

    #[test]
    fn test_delimited_accepts_wrong_len() {
        let payload = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80];
        let bytes = reply_with_len(5, 0x20, &payload);

        let mut parser = StreamParser::with_mode(FramingMode::Delimited);
        parser.feed(&bytes);

        let parsed = parser.next_frame().unwrap();
        assert_eq!(parsed.frame.body(), &payload);
        assert!(parsed.length_mismatch.is_some());
    }

    #[test]
    fn test_delimited_waits_for_etx() {
        let bytes = request(5, &[]);
        let mut parser = StreamParser::with_mode(FramingMode::Delimited);
        parser.feed(&bytes[..bytes.len() - 1]);
        assert_eq!(parser.frames_available(), 0);

        parser.feed(&bytes[bytes.len() - 1..]);
        assert_eq!(parser.frames_available(), 1);
    }

    #[test]
    fn test_clear() {
        let mut parser = StreamParser::new();
        parser.feed(&request(5, &[]));
        parser.feed(&[START_BYTE, 0x10]);
        parser.clear();

        assert_eq!(parser.frames_available(), 0);
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_drain_is_exact_size() {
        let mut data = request(1, &[]);
        data.extend(request(2, &[]));

        let mut parser = StreamParser::new();
        parser.feed(&data);
        assert_eq!(parser.drain_frames().len(), 2);
    }
}
