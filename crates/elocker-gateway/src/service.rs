//! Operations behind the HTTP routes.

use elocker_core::{DeviceId, Thresholds};
use elocker_protocol::DeviceReading;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::lock::LockController;
use crate::sensor::SensorPoller;
use crate::state::{DeviceStatus, GatewayState};
use crate::store::ThresholdStore;

/// The gateway as seen by its API.
#[derive(Debug)]
pub struct Gateway {
    state: Arc<GatewayState>,
    store: ThresholdStore,
    lock: LockController,

    /// Present when sensors are polled on demand; network readings are
    /// pushed through [`Gateway::ingest_readings`] instead.
    poller: Option<SensorPoller>,
}

impl Gateway {
    pub fn new(
        state: Arc<GatewayState>,
        store: ThresholdStore,
        lock: LockController,
        poller: Option<SensorPoller>,
    ) -> Self {
        Self {
            state,
            store,
            lock,
            poller,
        }
    }

    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Refresh polled sensors and return every known slot.
    pub async fn get_status(&self) -> Vec<DeviceStatus> {
        if let Some(poller) = &self.poller {
            let readings = poller.sweep().await;
            self.ingest_readings(&readings).await;
        }
        self.state.snapshot()
    }

    /// Apply a batch of readings and open any slot the gate releases.
    pub async fn ingest_readings(&self, readings: &[DeviceReading]) {
        for id in self.state.apply_readings(readings) {
            info!(device_id = %id, "Auto-unlocking");
            if let Err(e) = self.lock.unlock(id).await {
                warn!(device_id = %id, error = %e, "Auto-unlock failed");
            }
        }
    }

    /// Replace and persist the thresholds.
    ///
    /// A failed write is logged; the new values stay in effect.
    pub fn set_threshold(&self, fullcharged: f64, notcharged: f64) -> Result<String, ApiError> {
        let thresholds = Thresholds::new(fullcharged, notcharged)
            .map_err(|_| ApiError::validation("Invalid threshold"))?;

        self.state.set_thresholds(thresholds);
        if let Err(e) = self.store.save(&thresholds) {
            error!(path = %self.store.path().display(), error = %e, "Failed to persist thresholds");
        }

        info!(%thresholds, "Thresholds updated");
        Ok(thresholds.to_string())
    }

    /// Open a locker if the unlock gate allows it.
    pub async fn unlock(&self, id: DeviceId) -> Result<(), ApiError> {
        if let Err(e) = self.state.check_unlock(id) {
            info!(device_id = %id, reason = %e, "Unlock denied");
            return Err(e);
        }
        self.lock.unlock(id).await?;
        Ok(())
    }
}
