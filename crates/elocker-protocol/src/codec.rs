//! Tokio codecs for framed async I/O.
//!
//! - [`SensorCodec`]: sensor frames over any byte stream, built on
//!   [`StreamParser`] so invalid candidates are dropped instead of failing
//!   the stream.
//! - [`ReadingsCodec`]: counted readings payloads sent by the networked
//!   sensor peer.
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use tokio::net::TcpStream;
//! use tokio_util::codec::FramedRead;
//! use elocker_protocol::ReadingsCodec;
//!
//! # async fn example() -> elocker_core::Result<()> {
//! let stream = TcpStream::connect("192.168.1.40:7792").await?;
//! let mut readings = FramedRead::new(stream, ReadingsCodec::new());
//!
//! while let Some(batch) = readings.next().await {
//!     for reading in batch? {
//!         println!("{} -> {} mA", reading.id, reading.milliamps);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use bytes::{Buf, BytesMut};
use elocker_core::constants::READING_RECORD_LEN;
use elocker_core::{Error, Result};
use tokio_util::codec::{Decoder, Encoder};

use crate::readings::{DeviceReading, encode_device_readings, parse_device_readings};
use crate::sensor::{ParsedFrame, SensorFrame};
use crate::stream_parser::{FramingMode, StreamParser};

/// Codec for the sensor request/reply protocol.
#[derive(Debug, Default)]
pub struct SensorCodec {
    parser: StreamParser,
}

impl SensorCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: FramingMode) -> Self {
        Self {
            parser: StreamParser::with_mode(mode),
        }
    }

    /// Candidates dropped so far.
    pub fn rejected(&self) -> u64 {
        self.parser.rejected()
    }
}

impl Decoder for SensorCodec {
    type Item = ParsedFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if !src.is_empty() {
            // the parser owns buffering from here on
            self.parser.feed(src);
            src.clear();
        }
        Ok(self.parser.next_frame())
    }
}

impl Encoder<SensorFrame> for SensorCodec {
    type Error = Error;

    fn encode(&mut self, item: SensorFrame, dst: &mut BytesMut) -> Result<()> {
        item.encode_into(dst);
        Ok(())
    }
}

/// Codec for counted readings payloads: `count { id mA V } * count`.
///
/// A payload is emitted once all `count` records have arrived. A partial
/// payload left when the stream ends is decoded with its complete records.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadingsCodec;

impl ReadingsCodec {
    pub fn new() -> Self {
        ReadingsCodec
    }
}

impl Decoder for ReadingsCodec {
    type Item = Vec<DeviceReading>;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let Some(&count) = src.first() else {
            return Ok(None);
        };

        let needed = 1 + usize::from(count) * READING_RECORD_LEN;
        if src.len() < needed {
            src.reserve(needed - src.len());
            return Ok(None);
        }

        let payload = src.split_to(needed);
        Ok(Some(parse_device_readings(&payload)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(readings) = self.decode(src)? {
            return Ok(Some(readings));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let readings = parse_device_readings(src);
        src.advance(src.len());
        Ok(Some(readings))
    }
}

impl Encoder<&[DeviceReading]> for ReadingsCodec {
    type Error = Error;

    fn encode(&mut self, item: &[DeviceReading], dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(&encode_device_readings(item));
        Ok(())
    }
}
