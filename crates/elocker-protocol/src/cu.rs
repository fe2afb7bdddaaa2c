//! CU lock controller protocol.
//!
//! Commands are five bytes:
//!
//! ```text
//! STX   ADDR              CMD   ETX   SUM
//! 0x02  (cu<<4 | lock)    0x30  0x03  Σ(bytes 0..4) & 0xFF   query status
//! 0x02  (cu<<4 | lock-1)  0x31  0x03  Σ(bytes 0..4) & 0xFF   open lock
//! ```
//!
//! The controller answers a query with a nine byte window whose first three
//! bytes are `0x02, cu<<4, 0x35`, followed by the 16 bit lock mask in little
//! endian order. Bit *i* set means locker *i+1* is closed.

use bytes::{Buf, BytesMut};
use elocker_core::DeviceId;
use elocker_core::constants::{
    CU_CMD_OPEN, CU_CMD_QUERY, CU_CMD_STATUS, CU_FRAME_LEN, CU_LOCK_COUNT, CU_STATUS_FRAME_LEN,
    END_BYTE, MAX_CONTROLLER_ID, START_BYTE,
};
use std::collections::VecDeque;
use tracing::debug;

use crate::checksum::additive_checksum;
use crate::error::FrameError;

fn build_command(controller: u8, lock_nibble: u8, cmd: u8) -> Result<[u8; CU_FRAME_LEN], FrameError> {
    if controller > MAX_CONTROLLER_ID {
        return Err(FrameError::ControllerOutOfRange(controller));
    }
    let mut frame = [START_BYTE, (controller << 4) | lock_nibble, cmd, END_BYTE, 0];
    frame[4] = additive_checksum(&frame[..4]);
    Ok(frame)
}

/// Status query for every lock on `controller`.
///
/// # Examples
///
/// ```
/// use elocker_protocol::build_lock_query;
///
/// assert_eq!(build_lock_query(0).unwrap(), [0x02, 0x00, 0x30, 0x03, 0x35]);
/// ```
pub fn build_lock_query(controller: u8) -> Result<[u8; CU_FRAME_LEN], FrameError> {
    build_command(controller, 0, CU_CMD_QUERY)
}

/// Open lock `lock_id` (1-based) on `controller`.
///
/// # Examples
///
/// ```
/// use elocker_protocol::build_lock_open;
///
/// assert_eq!(build_lock_open(0, 6).unwrap(), [0x02, 0x05, 0x31, 0x03, 0x3B]);
/// assert!(build_lock_open(0, 0).is_err());
/// ```
pub fn build_lock_open(controller: u8, lock_id: u8) -> Result<[u8; CU_FRAME_LEN], FrameError> {
    let nibble = DeviceId::new(lock_id)
        .lock_nibble()
        .ok_or(FrameError::LockOutOfRange(lock_id))?;
    build_command(controller, nibble, CU_CMD_OPEN)
}

/// Lock state of all sixteen slots of one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockStatus(u16);

impl LockStatus {
    pub fn from_mask(mask: u16) -> Self {
        LockStatus(mask)
    }

    pub fn mask(&self) -> u16 {
        self.0
    }

    /// True when locker `id` (1..=16) reports closed.
    pub fn is_locked(&self, id: DeviceId) -> bool {
        id.lock_nibble()
            .is_some_and(|bit| (self.0 >> bit) & 1 == 1)
    }

    /// `(locker, locked)` pairs for lockers 1..=16.
    pub fn iter(&self) -> impl Iterator<Item = (DeviceId, bool)> + '_ {
        (0..CU_LOCK_COUNT).map(move |bit| (DeviceId::from_lock_bit(bit), (self.0 >> bit) & 1 == 1))
    }
}

/// Decode a status window from `controller`.
///
/// Returns `None` when the window is short or not a status reply.
pub fn parse_lock_status(window: &[u8], controller: u8) -> Option<LockStatus> {
    if window.len() < CU_STATUS_FRAME_LEN {
        return None;
    }
    if window[0] != START_BYTE || window[1] != controller << 4 || window[2] != CU_CMD_STATUS {
        return None;
    }
    Some(LockStatus(u16::from_le_bytes([window[3], window[4]])))
}

/// Incremental parser for the CU reply stream.
///
/// Slides a nine byte window over the accumulated bytes: a window that is
/// a status reply is consumed whole, anything else drops one byte.
#[derive(Debug)]
pub struct LockStatusParser {
    controller: u8,
    buffer: BytesMut,
    statuses: VecDeque<LockStatus>,
}

impl LockStatusParser {
    pub fn new(controller: u8) -> Self {
        Self {
            controller,
            buffer: BytesMut::with_capacity(CU_STATUS_FRAME_LEN * 4),
            statuses: VecDeque::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        while self.buffer.len() >= CU_STATUS_FRAME_LEN {
            match parse_lock_status(&self.buffer[..CU_STATUS_FRAME_LEN], self.controller) {
                Some(status) => {
                    self.statuses.push_back(status);
                    self.buffer.advance(CU_STATUS_FRAME_LEN);
                }
                None => {
                    debug!(byte = self.buffer[0], "CU resync, dropping byte");
                    self.buffer.advance(1);
                }
            }
        }
    }

    pub fn next_status(&mut self) -> Option<LockStatus> {
        self.statuses.pop_front()
    }

    /// Bytes waiting for a complete window.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
