//! Wire protocols spoken by the eLocker gateway.
//!
//! - [`sensor`]: length/CRC framed request/reply protocol of the charge sensors
//! - [`cu`]: fixed five byte command protocol of the CU lock controller
//! - [`readings`]: decoded sensor samples and the counted readings payload
//! - [`stream_parser`]: incremental frame extraction from noisy byte streams
//! - [`codec`]: tokio-util adapters for framed async I/O

pub mod checksum;
pub mod codec;
pub mod cu;
pub mod error;
pub mod readings;
pub mod sensor;
pub mod stream_parser;

pub use checksum::{additive_checksum, crc16_modbus};
pub use codec::{ReadingsCodec, SensorCodec};
pub use cu::{LockStatus, LockStatusParser, build_lock_open, build_lock_query, parse_lock_status};
pub use error::FrameError;
pub use readings::{DeviceReading, encode_device_readings, parse_device_readings};
pub use sensor::{ParsedFrame, SensorFrame, build_sensor_request, parse_sensor_frame};
pub use stream_parser::{DrainFrames, FramingMode, StreamParser};
