//! Frame builders shared by the protocol integration tests.

#![allow(dead_code)]

use elocker_protocol::{build_sensor_request, crc16_modbus};

/// Request frame bytes, as the gateway sends them.
pub fn request_bytes(id: u8, data: &[u8]) -> Vec<u8> {
    build_sensor_request(id, 0x00, data)
        .expect("request data fits")
        .to_bytes()
        .to_vec()
}

/// Reply frame bytes, as the sensor firmware sends them.
pub fn reply_bytes(id: u8, milliamps: f32, volts: f32, smoke: bool, fire: bool) -> Vec<u8> {
    let mut out = vec![0x02, 13, id];
    out.extend_from_slice(&milliamps.to_le_bytes());
    out.extend_from_slice(&volts.to_le_bytes());
    out.push(u8::from(smoke));
    out.push(u8::from(fire));
    let crc = crc16_modbus(&out[1..]);
    out.extend_from_slice(&crc.to_be_bytes());
    out.push(0x03);
    out
}

/// One counted readings payload.
pub fn readings_payload(records: &[(u8, f32, f32)]) -> Vec<u8> {
    let mut out = vec![records.len() as u8];
    for &(id, ma, v) in records {
        out.push(id);
        out.extend_from_slice(&ma.to_le_bytes());
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
