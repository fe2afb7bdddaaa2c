//! Sensor link frames.
//!
//! ```text
//! STX  LEN  ID  BODY...  CRC_HI  CRC_LO  ETX
//! 0x02 n    id  ...      crc>>8  crc&ff  0x03
//!      └──────── CRC16/Modbus ──┘
//! ```
//!
//! `LEN` counts ID, BODY and both CRC bytes, so a frame spans `LEN + 3`
//! bytes. Requests carry `CMD DATA...` in BODY; sensor replies carry the
//! sample payload directly.
//!
//! Sensor firmware in the field is known to send LEN values that disagree
//! with the actual frame size. Such frames are accepted when the CRC
//! matches and the mismatch is reported on the [`ParsedFrame`].

use bytes::{BufMut, Bytes, BytesMut};
use elocker_core::constants::{
    END_BYTE, MAX_SENSOR_DATA_LEN, MIN_SENSOR_FRAME_LEN, SENSOR_FRAME_OVERHEAD, START_BYTE,
};

use crate::checksum::crc16_modbus;
use crate::error::FrameError;

/// Bytes counted by LEN besides the body: ID plus the two CRC bytes.
const LEN_FIELD_EXTRA: usize = 3;

/// One decoded sensor frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorFrame {
    id: u8,
    body: Bytes,
}

impl SensorFrame {
    /// Create a frame from an address and raw body.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::DataTooLong`] if LEN would not fit in one byte.
    pub fn new(id: u8, body: impl Into<Bytes>) -> Result<Self, FrameError> {
        let body = body.into();
        let max = MAX_SENSOR_DATA_LEN + 1;
        if body.len() > max {
            return Err(FrameError::DataTooLong {
                len: body.len(),
                max,
            });
        }
        Ok(Self { id, body })
    }

    /// Device address.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Everything between ID and the CRC.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Command byte when this frame is a request.
    pub fn command(&self) -> Option<u8> {
        self.body.first().copied()
    }

    /// Request data following the command byte.
    pub fn data(&self) -> &[u8] {
        self.body.get(1..).unwrap_or_default()
    }

    /// Value of the LEN field for this frame.
    pub fn len_field(&self) -> u8 {
        // bounded by the check in `new`
        (self.body.len() + LEN_FIELD_EXTRA) as u8
    }

    /// Total size on the wire.
    pub fn wire_len(&self) -> usize {
        usize::from(self.len_field()) + SENSOR_FRAME_OVERHEAD
    }

    /// Append the framed bytes to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_len());
        let start = dst.len();
        dst.put_u8(START_BYTE);
        dst.put_u8(self.len_field());
        dst.put_u8(self.id);
        dst.put_slice(&self.body);
        let crc = crc16_modbus(&dst[start + 1..]);
        dst.put_u16(crc);
        dst.put_u8(END_BYTE);
    }

    /// Framed bytes ready for transmission.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

/// A validated frame together with any tolerated anomaly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub frame: SensorFrame,

    /// Set to [`FrameError::LengthMismatch`] when LEN disagreed with the
    /// frame size.
    pub length_mismatch: Option<FrameError>,
}

/// Build a sensor request frame.
///
/// # Errors
///
/// Returns [`FrameError::DataTooLong`] when `data` exceeds 251 bytes.
///
/// # Examples
///
/// ```
/// use elocker_protocol::build_sensor_request;
///
/// let frame = build_sensor_request(5, 0x00, &[]).unwrap();
/// let bytes = frame.to_bytes();
/// assert_eq!(bytes.len(), 7);
/// assert_eq!(&bytes[..4], &[0x02, 0x04, 0x05, 0x00]);
/// assert_eq!(bytes[6], 0x03);
/// ```
pub fn build_sensor_request(id: u8, cmd: u8, data: &[u8]) -> Result<SensorFrame, FrameError> {
    if data.len() > MAX_SENSOR_DATA_LEN {
        return Err(FrameError::DataTooLong {
            len: data.len(),
            max: MAX_SENSOR_DATA_LEN,
        });
    }
    let mut body = BytesMut::with_capacity(data.len() + 1);
    body.put_u8(cmd);
    body.put_slice(data);
    SensorFrame::new(id, body.freeze())
}

/// Validate and decode one complete sensor frame.
///
/// # Errors
///
/// - [`FrameError::TooShort`] below six bytes
/// - [`FrameError::BadDelimiters`] without STX/ETX at the ends
/// - [`FrameError::CrcMismatch`] when the CRC over `LEN..BODY` disagrees
pub fn parse_sensor_frame(bytes: &[u8]) -> Result<ParsedFrame, FrameError> {
    let n = bytes.len();
    if n < MIN_SENSOR_FRAME_LEN {
        return Err(FrameError::TooShort {
            len: n,
            min: MIN_SENSOR_FRAME_LEN,
        });
    }

    let (start, end) = (bytes[0], bytes[n - 1]);
    if start != START_BYTE || end != END_BYTE {
        return Err(FrameError::BadDelimiters { start, end });
    }

    let declared = usize::from(bytes[1]) + SENSOR_FRAME_OVERHEAD;
    let length_mismatch = (declared != n).then_some(FrameError::LengthMismatch {
        declared,
        actual: n,
    });

    let actual = u16::from_be_bytes([bytes[n - 3], bytes[n - 2]]);
    let expected = crc16_modbus(&bytes[1..n - 3]);
    if actual != expected {
        return Err(FrameError::CrcMismatch { expected, actual });
    }

    Ok(ParsedFrame {
        frame: SensorFrame {
            id: bytes[2],
            body: Bytes::copy_from_slice(&bytes[3..n - 3]),
        },
        length_mismatch,
    })
}
