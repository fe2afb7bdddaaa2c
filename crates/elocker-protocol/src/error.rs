//! Frame level errors.
//!
//! A `FrameError` never escalates beyond the link that produced it: the
//! stream parser logs it, drops the offending bytes and keeps going.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Fewer bytes than the smallest possible frame.
    #[error("Frame too short: {len} bytes (min {min})")]
    TooShort { len: usize, min: usize },

    /// Missing STX at the start or ETX at the end.
    #[error("Bad delimiters: start 0x{start:02X}, end 0x{end:02X}")]
    BadDelimiters { start: u8, end: u8 },

    /// Recomputed CRC differs from the transmitted one.
    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// LEN field disagrees with the frame size.
    ///
    /// Reported as an annotation on an accepted frame, never as a failure.
    #[error("Length mismatch: LEN declares {declared} bytes, frame has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Request data too long for the one byte LEN field.
    #[error("Data too long: {len} bytes (max {max})")]
    DataTooLong { len: usize, max: usize },

    /// CU controller address does not fit in a nibble.
    #[error("Controller id {0} out of range (0-15)")]
    ControllerOutOfRange(u8),

    /// Lock number outside 1..=16.
    #[error("Lock id {0} out of range (1-16)")]
    LockOutOfRange(u8),

    /// Sensor reply body too short for the requested fields.
    #[error("Reply payload too short: {len} bytes (need {need})")]
    ShortPayload { len: usize, need: usize },
}
