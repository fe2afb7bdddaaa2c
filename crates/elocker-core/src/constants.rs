//! Protocol and policy constants shared across the eLocker gateway.
//!
//! The gateway speaks two serial protocols:
//!
//! ```text
//! Sensor link:  <STX> LEN ID BODY... CRC_HI CRC_LO <ETX>
//! CU link:      <STX> (CU<<4 | LOCK) CMD <ETX> SUM
//! ```
//!
//! Both use `0x02`/`0x03` as start/end markers. The sensor link protects
//! `LEN..BODY` with CRC16/Modbus; the CU link uses an 8-bit additive sum.
//!
//! # Usage
//!
//! ```
//! use elocker_core::constants::*;
//!
//! assert_eq!(START_BYTE, 0x02);
//! assert_eq!(SENSOR_FRAME_OVERHEAD, 3);
//! ```

// ============================================================================
// Framing
// ============================================================================

/// Start of text marker.
pub const START_BYTE: u8 = 0x02;

/// End of text marker.
pub const END_BYTE: u8 = 0x03;

// ============================================================================
// Sensor protocol
// ============================================================================

/// Bytes of a sensor frame not counted by its LEN field (STX, LEN, ETX).
///
/// A complete frame spans `LEN + SENSOR_FRAME_OVERHEAD` bytes.
pub const SENSOR_FRAME_OVERHEAD: usize = 3;

/// Value added to the data length when building the LEN field.
///
/// Covers ID, CMD and the two CRC bytes.
pub const SENSOR_LEN_OFFSET: usize = 4;

/// Shortest byte sequence that can hold a sensor frame.
pub const MIN_SENSOR_FRAME_LEN: usize = 6;

/// Largest data section a request can carry while LEN still fits in one byte.
pub const MAX_SENSOR_DATA_LEN: usize = u8::MAX as usize - SENSOR_LEN_OFFSET;

/// CRC16/Modbus initial register value.
pub const CRC16_INIT: u16 = 0xFFFF;

/// CRC16/Modbus reflected polynomial.
pub const CRC16_POLY: u16 = 0xA001;

/// Sensor command: read current and voltage.
pub const CMD_GET_CURRENT_MA: u8 = 0x00;

/// Size of one record in a readings payload (`id:u8, mA:f32, V:f32`).
pub const READING_RECORD_LEN: usize = 9;

// ============================================================================
// CU lock controller protocol
// ============================================================================

/// Length of every CU command frame.
pub const CU_FRAME_LEN: usize = 5;

/// Length of a CU status reply window.
pub const CU_STATUS_FRAME_LEN: usize = 9;

/// CU command: query lock status.
pub const CU_CMD_QUERY: u8 = 0x30;

/// CU command: open one lock.
pub const CU_CMD_OPEN: u8 = 0x31;

/// CU reply: lock status bitmask.
pub const CU_CMD_STATUS: u8 = 0x35;

/// Number of locks a single controller addresses.
pub const CU_LOCK_COUNT: u8 = 16;

/// Highest controller address that fits in the high nibble.
pub const MAX_CONTROLLER_ID: u8 = 0x0F;

// ============================================================================
// Charge policy
// ============================================================================

/// Consecutive qualifying samples required before a full charge is trusted.
pub const FULL_CHARGE_DEBOUNCE: u32 = 5;

/// Default upper current bound for "fully charged" (mA).
pub const DEFAULT_FULLCHARGED_MA: f64 = 300.0;

/// Default current at or below which a slot is "not charging" (mA).
pub const DEFAULT_NOTCHARGED_MA: f64 = 100.0;

// ============================================================================
// Timing (milliseconds)
// ============================================================================

/// Per-device sensor poll timeout.
pub const DEFAULT_SENSOR_TIMEOUT: u64 = 100;

/// Interval between CU status queries.
pub const DEFAULT_LOCK_POLL_INTERVAL: u64 = 2000;

/// Delay between an open command and the follow-up status query.
pub const DEFAULT_UNLOCK_SETTLE: u64 = 250;

/// Interval between UDP discovery probes.
pub const DEFAULT_DISCOVERY_INTERVAL: u64 = 1000;

/// Initial TCP reconnect delay.
pub const RECONNECT_BASE_DELAY: u64 = 1000;

/// Ceiling for the TCP reconnect delay.
pub const RECONNECT_MAX_DELAY: u64 = 15000;

// ============================================================================
// Network discovery
// ============================================================================

/// UDP port used for both the probe and the reply.
pub const DISCOVERY_PORT: u16 = 7792;

/// Limited broadcast address for discovery probes.
pub const DISCOVERY_BROADCAST_ADDR: &str = "255.255.255.255";

/// Probe text broadcast by the gateway.
pub const DISCOVERY_PROBE: &str = "Where are you, eLocker?";

/// Reply text expected from the sensor peer.
pub const DISCOVERY_REPLY: &str = "Here I am, eLocker";

// ============================================================================
// Hardware defaults
// ============================================================================

/// CU controller address used by the installed cabinets.
pub const DEFAULT_CU_CONTROLLER: u8 = 0;

/// CU serial baud rate.
pub const CU_BAUD_RATE: u32 = 19200;

/// Sensor serial baud rate.
pub const SENSOR_BAUD_RATE: u32 = 115200;

/// Sensor ids wired to the gateway in the serial variant.
pub const WIRED_DEVICE_IDS: [u8; 4] = [5, 6, 7, 8];

/// Default HTTP listen address.
pub const DEFAULT_HTTP_BIND: &str = "0.0.0.0:3000";
