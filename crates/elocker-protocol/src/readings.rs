//! Decoded current/voltage samples.
//!
//! Samples arrive in two shapes:
//!
//! - a sensor reply body: `mA:f32le V:f32le [smoke:u8] [fire:u8]`
//! - a counted readings payload (network tunnel):
//!   `count:u8 { id:u8 mA:f32le V:f32le } * count`
//!
//! Floating point values are reported as rounded magnitudes.

use bytes::{BufMut, Bytes, BytesMut};
use elocker_core::DeviceId;
use elocker_core::constants::READING_RECORD_LEN;
use tracing::warn;

use crate::error::FrameError;
use crate::sensor::SensorFrame;

/// Bytes of a reply body holding the two float fields.
const REPLY_FLOATS_LEN: usize = 8;

/// One sample for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceReading {
    pub id: DeviceId,
    pub milliamps: u32,
    pub volts: u32,

    /// `None` when the source does not report alarms.
    pub smoke: Option<bool>,
    pub fire: Option<bool>,
}

impl DeviceReading {
    /// Reading without alarm information.
    pub fn new(id: impl Into<DeviceId>, milliamps: u32, volts: u32) -> Self {
        Self {
            id: id.into(),
            milliamps,
            volts,
            smoke: None,
            fire: None,
        }
    }

    /// Decode the reply to a current query sent to `id`.
    ///
    /// Alarm bytes missing from the body read as `false`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ShortPayload`] if the body cannot hold both floats.
    pub fn from_reply(id: impl Into<DeviceId>, frame: &SensorFrame) -> Result<Self, FrameError> {
        let body = frame.body();
        if body.len() < REPLY_FLOATS_LEN {
            return Err(FrameError::ShortPayload {
                len: body.len(),
                need: REPLY_FLOATS_LEN,
            });
        }

        Ok(Self {
            id: id.into(),
            milliamps: magnitude(read_f32_le(&body[0..4])),
            volts: magnitude(read_f32_le(&body[4..8])),
            smoke: Some(body.get(8).is_some_and(|&b| b != 0)),
            fire: Some(body.get(9).is_some_and(|&b| b != 0)),
        })
    }
}

/// Decode a counted readings payload.
///
/// A record running past the end of `payload` ends the list; the records
/// before it are still returned.
///
/// # Examples
///
/// ```
/// use elocker_protocol::parse_device_readings;
///
/// let mut payload = vec![1u8, 6];
/// payload.extend_from_slice(&120.4f32.to_le_bytes());
/// payload.extend_from_slice(&(-4.6f32).to_le_bytes());
///
/// let readings = parse_device_readings(&payload);
/// assert_eq!(readings.len(), 1);
/// assert_eq!(readings[0].milliamps, 120);
/// assert_eq!(readings[0].volts, 5);
/// ```
pub fn parse_device_readings(payload: &[u8]) -> Vec<DeviceReading> {
    let Some((&count, records)) = payload.split_first() else {
        return Vec::new();
    };

    let mut readings = Vec::with_capacity(usize::from(count));
    for i in 0..usize::from(count) {
        let start = i * READING_RECORD_LEN;
        let Some(record) = records.get(start..start + READING_RECORD_LEN) else {
            warn!(
                declared = count,
                decoded = readings.len(),
                payload_len = payload.len(),
                "Readings payload truncated"
            );
            break;
        };

        readings.push(DeviceReading::new(
            record[0],
            magnitude(read_f32_le(&record[1..5])),
            magnitude(read_f32_le(&record[5..9])),
        ));
    }
    readings
}

/// Encode readings into the counted payload format.
///
/// At most 255 records are written.
pub fn encode_device_readings(readings: &[DeviceReading]) -> Bytes {
    let count = readings.len().min(usize::from(u8::MAX));
    let mut buf = BytesMut::with_capacity(1 + count * READING_RECORD_LEN);
    buf.put_u8(count as u8);
    for reading in &readings[..count] {
        buf.put_u8(reading.id.as_u8());
        buf.put_f32_le(reading.milliamps as f32);
        buf.put_f32_le(reading.volts as f32);
    }
    buf.freeze()
}

fn read_f32_le(bytes: &[u8]) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    f32::from_le_bytes(raw)
}

/// Rounded absolute value; NaN maps to 0 and overflow saturates.
fn magnitude(value: f32) -> u32 {
    value.abs().round() as u32
}
