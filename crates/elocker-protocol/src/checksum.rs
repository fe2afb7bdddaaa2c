//! Integrity checks for both serial protocols.

use elocker_core::constants::{CRC16_INIT, CRC16_POLY};

/// CRC16/Modbus over `data`.
///
/// Bitwise (table-free) implementation: init `0xFFFF`, reflected polynomial
/// `0xA001`, no final XOR.
///
/// # Examples
///
/// ```
/// use elocker_protocol::crc16_modbus;
///
/// assert_eq!(crc16_modbus(b"123456789"), 0x4B37);
/// ```
#[must_use]
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// 8-bit additive checksum used by the CU lock controller.
///
/// # Examples
///
/// ```
/// use elocker_protocol::additive_checksum;
///
/// assert_eq!(additive_checksum(&[0x02, 0x00, 0x30, 0x03]), 0x35);
/// assert_eq!(additive_checksum(&[0xFF, 0x02]), 0x01);
/// ```
#[must_use]
pub fn additive_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}
