//! Sensor bus polling.
//!
//! A sweep asks every configured device for its current in turn. Each
//! request waits for one reply or the per-device timeout; a device that
//! stays silent keeps its previous values.

use bytes::Bytes;
use elocker_core::DeviceId;
use elocker_core::constants::CMD_GET_CURRENT_MA;
use elocker_protocol::{DeviceReading, FramingMode, StreamParser, build_sensor_request};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::correlator::Correlator;
use crate::error::CorrelatorError;

/// Polls a fixed list of sensors over one correlator.
#[derive(Debug)]
pub struct SensorPoller {
    correlator: Arc<Correlator>,
    device_ids: Vec<DeviceId>,
    timeout: Duration,

    /// Serializes sweeps so requests never overlap.
    sweep: Mutex<()>,
}

impl SensorPoller {
    pub fn new(correlator: Arc<Correlator>, device_ids: Vec<DeviceId>, timeout: Duration) -> Self {
        Self {
            correlator,
            device_ids,
            timeout,
            sweep: Mutex::new(()),
        }
    }

    pub fn device_ids(&self) -> &[DeviceId] {
        &self.device_ids
    }

    /// Query every device once and return the replies that decoded.
    pub async fn sweep(&self) -> Vec<DeviceReading> {
        let _sweep = self.sweep.lock().await;
        let mut readings = Vec::with_capacity(self.device_ids.len());

        for &id in &self.device_ids {
            let request = match build_sensor_request(id.as_u8(), CMD_GET_CURRENT_MA, &[]) {
                Ok(request) => request,
                Err(e) => {
                    warn!(device_id = %id, error = %e, "Cannot build request");
                    continue;
                }
            };

            let reply = match self.correlator.send_and_wait(&request, self.timeout).await {
                Ok(Some(reply)) => reply,
                Ok(None) => {
                    debug!(device_id = %id, "No reply");
                    continue;
                }
                Err(CorrelatorError::Busy) => {
                    warn!(device_id = %id, "Sensor bus busy, skipping");
                    continue;
                }
            };

            if reply.id() != id.as_u8() {
                warn!(
                    device_id = %id,
                    reply_id = reply.id(),
                    "Reply from unexpected device"
                );
            }

            match DeviceReading::from_reply(id, &reply) {
                Ok(reading) => readings.push(reading),
                Err(e) => warn!(device_id = %id, error = %e, "Bad sensor reply"),
            }
        }
        readings
    }
}

/// Demultiplex sensor bytes and hand each frame to the correlator.
pub async fn run_sensor_pump(
    mut chunks: mpsc::Receiver<Bytes>,
    mode: FramingMode,
    correlator: Arc<Correlator>,
) {
    let mut parser = StreamParser::with_mode(mode);

    while let Some(chunk) = chunks.recv().await {
        parser.feed(&chunk);
        for parsed in parser.drain_frames() {
            if let Some(mismatch) = &parsed.length_mismatch {
                debug!(device_id = parsed.frame.id(), %mismatch, "Tolerated frame");
            }
            correlator.resolve(parsed.frame);
        }
    }
    info!(rejected = parser.rejected(), "Sensor link closed");
}
