//! CU lock controller: commands out, status masks in.

use bytes::Bytes;
use elocker_core::DeviceId;
use elocker_protocol::{LockStatusParser, build_lock_open, build_lock_query};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::link::LinkWriter;
use crate::state::GatewayState;

/// Command side of one CU controller.
#[derive(Debug, Clone)]
pub struct LockController {
    writer: LinkWriter,
    controller: u8,
    settle: Duration,
}

impl LockController {
    pub fn new(writer: LinkWriter, controller: u8, settle: Duration) -> Self {
        Self {
            writer,
            controller,
            settle,
        }
    }

    pub fn controller(&self) -> u8 {
        self.controller
    }

    /// Send an open command for one locker.
    pub async fn open(&self, id: DeviceId) -> Result<(), TransportError> {
        let frame = build_lock_open(self.controller, id.as_u8())?;
        debug!(device_id = %id, "Opening lock");
        self.writer.write(frame.to_vec()).await
    }

    /// Ask the controller for its status mask.
    pub async fn query(&self) -> Result<(), TransportError> {
        let frame = build_lock_query(self.controller)?;
        self.writer.write(frame.to_vec()).await
    }

    /// Open a locker, wait for it to settle, then refresh the status.
    pub async fn unlock(&self, id: DeviceId) -> Result<(), TransportError> {
        self.open(id).await?;
        tokio::time::sleep(self.settle).await;
        self.query().await?;
        info!(device_id = %id, "Unlocked");
        Ok(())
    }

    /// Query the status every `interval` until the link closes.
    pub async fn run_poll(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.query().await {
                Ok(()) => {}
                Err(TransportError::Closed) => {
                    info!("Lock link closed, stopping status poll");
                    return;
                }
                Err(e) => warn!(error = %e, "Lock status query failed"),
            }
        }
    }
}

/// Feed CU bytes into the state store until the link closes.
///
/// With `release_empty` set, lockers reported locked while drawing no
/// current are opened again.
pub async fn run_lock_pump(
    mut chunks: mpsc::Receiver<Bytes>,
    state: Arc<GatewayState>,
    lock: LockController,
    release_empty: bool,
) {
    let mut parser = LockStatusParser::new(lock.controller());

    while let Some(chunk) = chunks.recv().await {
        parser.feed(&chunk);
        while let Some(status) = parser.next_status() {
            debug!(mask = format_args!("{:#06x}", status.mask()), "Lock status");
            let empty = state.apply_lock_status(status);
            if !release_empty {
                continue;
            }
            for id in empty {
                info!(device_id = %id, "Releasing empty slot");
                if let Err(e) = lock.open(id).await {
                    warn!(device_id = %id, error = %e, "Release failed");
                }
            }
        }
    }
    info!("Lock link closed");
}
