//! Device table and charge policy.
//!
//! [`GatewayState`] is the only place slot records change. Sensor samples
//! and CU status masks are applied through it; HTTP handlers read
//! snapshots.

use elocker_core::constants::FULL_CHARGE_DEBOUNCE;
use elocker_core::{ChargeStatus, DeviceId, Thresholds};
use elocker_protocol::{DeviceReading, LockStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::ApiError;

pub const DENY_NOT_FOUND: &str = "Device not found";
pub const DENY_UNLOCKED: &str = "Already unlocked!";
pub const DENY_CHARGING: &str = "Device is charging!";

/// Everything known about one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub milliamps: u32,
    pub volts: u32,
    pub lock: bool,

    /// Consecutive samples inside the full-charge band.
    pub full_cnt: u32,

    pub smoke: bool,
    pub fire: bool,
}

impl DeviceRecord {
    fn new(id: DeviceId) -> Self {
        Self {
            id,
            milliamps: 0,
            volts: 0,
            lock: false,
            full_cnt: 0,
            smoke: false,
            fire: false,
        }
    }
}

/// One entry of the `/getStatus` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub id: DeviceId,
    #[serde(rename = "mA")]
    pub milliamps: u32,
    #[serde(rename = "V")]
    pub volts: u32,
    pub status: ChargeStatus,
    pub lock: bool,
    pub smoke: bool,
    pub fire: bool,
}

#[derive(Debug, Default)]
struct Inner {
    devices: BTreeMap<DeviceId, DeviceRecord>,
    thresholds: Thresholds,
}

/// Shared device table and thresholds.
#[derive(Debug, Default)]
pub struct GatewayState {
    inner: Mutex<Inner>,
    auto_unlock: bool,
}

impl GatewayState {
    pub fn new(thresholds: Thresholds, auto_unlock: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                devices: BTreeMap::new(),
                thresholds,
            }),
            auto_unlock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn auto_unlock(&self) -> bool {
        self.auto_unlock
    }

    pub fn thresholds(&self) -> Thresholds {
        self.lock().thresholds
    }

    /// Replace the thresholds. Existing `full_cnt` values are kept.
    pub fn set_thresholds(&self, thresholds: Thresholds) {
        self.lock().thresholds = thresholds;
    }

    pub fn charge_status(&self, milliamps: u32) -> ChargeStatus {
        self.lock().thresholds.classify(milliamps)
    }

    /// Upsert samples and advance the full-charge debounce.
    ///
    /// Returns the slots that now pass the unlock gate when auto-unlock is
    /// enabled, and nothing otherwise.
    pub fn apply_readings(&self, readings: &[DeviceReading]) -> Vec<DeviceId> {
        let mut inner = self.lock();
        let thresholds = inner.thresholds;
        let mut ready = Vec::new();

        for reading in readings {
            let record = inner.devices.entry(reading.id).or_insert_with(|| {
                info!(device_id = %reading.id, "New device");
                DeviceRecord::new(reading.id)
            });

            if thresholds.in_full_band(reading.milliamps) {
                record.full_cnt = record.full_cnt.saturating_add(1);
            } else {
                record.full_cnt = 0;
            }
            record.milliamps = reading.milliamps;
            record.volts = reading.volts;
            record.smoke = reading.smoke.unwrap_or(record.smoke);
            record.fire = reading.fire.unwrap_or(record.fire);

            debug!(
                device_id = %record.id,
                ma = record.milliamps,
                v = record.volts,
                full_cnt = record.full_cnt,
                "Reading applied"
            );

            if self.auto_unlock && passes_gate(record, &thresholds) {
                ready.push(record.id);
            }
        }
        ready
    }

    /// Apply a CU status mask to known lockers.
    ///
    /// Returns the slots that are locked while drawing no current.
    pub fn apply_lock_status(&self, status: LockStatus) -> Vec<DeviceId> {
        let mut inner = self.lock();
        let thresholds = inner.thresholds;
        let mut empty = Vec::new();

        for (id, locked) in status.iter() {
            let Some(record) = inner.devices.get_mut(&id) else {
                continue;
            };
            if record.lock != locked {
                info!(device_id = %id, locked, "Lock state changed");
                record.lock = locked;
            }
            if record.lock
                && thresholds.classify(record.milliamps) == ChargeStatus::NotCharging
            {
                empty.push(id);
            }
        }
        empty
    }

    /// Whether `id` currently passes the unlock gate.
    pub fn evaluate_auto_unlock(&self, id: DeviceId) -> bool {
        let inner = self.lock();
        inner
            .devices
            .get(&id)
            .is_some_and(|record| passes_gate(record, &inner.thresholds))
    }

    /// Check a manual unlock request against the gate.
    pub fn check_unlock(&self, id: DeviceId) -> Result<(), ApiError> {
        let inner = self.lock();
        let Some(record) = inner.devices.get(&id) else {
            return Err(ApiError::denied(DENY_NOT_FOUND));
        };
        if !record.lock {
            return Err(ApiError::denied(DENY_UNLOCKED));
        }
        if !passes_gate(record, &inner.thresholds) {
            return Err(ApiError::denied(DENY_CHARGING));
        }
        Ok(())
    }

    pub fn record(&self, id: DeviceId) -> Option<DeviceRecord> {
        self.lock().devices.get(&id).copied()
    }

    /// Every known slot, ordered by id, classified with current thresholds.
    pub fn snapshot(&self) -> Vec<DeviceStatus> {
        let inner = self.lock();
        inner
            .devices
            .values()
            .map(|record| DeviceStatus {
                id: record.id,
                milliamps: record.milliamps,
                volts: record.volts,
                status: inner.thresholds.classify(record.milliamps),
                lock: record.lock,
                smoke: record.smoke,
                fire: record.fire,
            })
            .collect()
    }
}

fn passes_gate(record: &DeviceRecord, thresholds: &Thresholds) -> bool {
    if !record.lock {
        return false;
    }
    match thresholds.classify(record.milliamps) {
        ChargeStatus::FullyCharged => record.full_cnt >= FULL_CHARGE_DEBOUNCE,
        ChargeStatus::NotCharging => true,
        ChargeStatus::Charging => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn state() -> GatewayState {
        GatewayState::new(Thresholds::new(300.0, 100.0).unwrap(), false)
    }

    fn sample(id: u8, ma: u32) -> DeviceReading {
        DeviceReading::new(id, ma, 5)
    }

    /// Record for `id` with `samples` readings of `ma` and the lock set.
    fn locked_with(state: &GatewayState, id: u8, ma: u32, samples: usize) {
        for _ in 0..samples {
            state.apply_readings(&[sample(id, ma)]);
        }
        state.apply_lock_status(LockStatus::from_mask(1 << (id - 1)));
    }

    #[test]
    fn test_debounce_counts_first_sample() {
        let state = state();
        for _ in 0..5 {
            state.apply_readings(&[sample(5, 150)]);
        }
        let record = state.record(DeviceId::new(5)).unwrap();
        assert_eq!(record.full_cnt, 5);
        assert_eq!(state.charge_status(record.milliamps), ChargeStatus::FullyCharged);
    }

    #[test]
    fn test_debounce_resets_outside_band() {
        let state = state();
        for _ in 0..5 {
            state.apply_readings(&[sample(5, 150)]);
        }
        state.apply_readings(&[sample(5, 50)]);
        assert_eq!(state.record(DeviceId::new(5)).unwrap().full_cnt, 0);

        state.apply_readings(&[sample(5, 150)]);
        state.apply_readings(&[sample(5, 400)]);
        assert_eq!(state.record(DeviceId::new(5)).unwrap().full_cnt, 0);
    }

    #[test]
    fn test_alarm_flags_kept_when_absent() {
        let state = state();
        let mut reply = sample(6, 150);
        reply.smoke = Some(true);
        reply.fire = Some(false);
        state.apply_readings(&[reply]);

        state.apply_readings(&[sample(6, 160)]);
        let record = state.record(DeviceId::new(6)).unwrap();
        assert!(record.smoke);
        assert!(!record.fire);
        assert_eq!(record.milliamps, 160);
    }

    #[test]
    fn test_lock_status_ignores_unknown_ids() {
        let state = state();
        state.apply_readings(&[sample(5, 500)]);
        state.apply_lock_status(LockStatus::from_mask(0xFFFF));

        assert!(state.record(DeviceId::new(5)).unwrap().lock);
        assert!(state.record(DeviceId::new(1)).is_none());
        assert_eq!(state.snapshot().len(), 1);
    }

    #[test]
    fn test_lock_status_reports_empty_locked_slots() {
        let state = state();
        state.apply_readings(&[sample(5, 50), sample(6, 500), sample(7, 20)]);

        let empty = state.apply_lock_status(LockStatus::from_mask(0b0011_0000));
        assert_eq!(empty, vec![DeviceId::new(5)]);

        let empty = state.apply_lock_status(LockStatus::from_mask(0));
        assert!(empty.is_empty());
        assert!(!state.record(DeviceId::new(5)).unwrap().lock);
    }

    #[rstest]
    #[case(150, 5, true)]
    #[case(150, 4, false)]
    #[case(50, 1, true)]
    #[case(500, 5, false)]
    fn test_unlock_gate(#[case] ma: u32, #[case] samples: usize, #[case] allowed: bool) {
        let state = state();
        locked_with(&state, 5, ma, samples);
        assert_eq!(state.evaluate_auto_unlock(DeviceId::new(5)), allowed);
        assert_eq!(state.check_unlock(DeviceId::new(5)).is_ok(), allowed);
    }

    #[test]
    fn test_gate_requires_lock() {
        let state = state();
        state.apply_readings(&[sample(5, 50)]);
        assert!(!state.evaluate_auto_unlock(DeviceId::new(5)));
    }

    #[rstest]
    #[case(9, DENY_NOT_FOUND)]
    #[case(6, DENY_UNLOCKED)]
    #[case(5, DENY_CHARGING)]
    fn test_unlock_denial_reasons(#[case] id: u8, #[case] reason: &str) {
        let state = state();
        locked_with(&state, 5, 500, 1);
        state.apply_readings(&[sample(6, 50)]);

        match state.check_unlock(DeviceId::new(id)) {
            Err(ApiError::PolicyDenied { reason: got }) => assert_eq!(got, reason),
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn test_auto_unlock_returns_ready_slots() {
        let state = GatewayState::new(Thresholds::default(), true);
        state.apply_readings(&[sample(5, 50)]);
        state.apply_lock_status(LockStatus::from_mask(0b1_0000));

        assert_eq!(state.apply_readings(&[sample(5, 40)]), vec![DeviceId::new(5)]);
        assert!(state.apply_readings(&[sample(5, 900)]).is_empty());
    }

    #[test]
    fn test_auto_unlock_disabled_returns_nothing() {
        let state = state();
        locked_with(&state, 5, 50, 1);
        assert!(state.apply_readings(&[sample(5, 40)]).is_empty());
    }

    #[test]
    fn test_new_thresholds_reclassify_snapshot() {
        let state = state();
        state.apply_readings(&[sample(5, 150)]);
        assert_eq!(state.snapshot()[0].status, ChargeStatus::FullyCharged);

        state.set_thresholds(Thresholds::new(300.0, 200.0).unwrap());
        assert_eq!(state.snapshot()[0].status, ChargeStatus::NotCharging);
    }

    #[test]
    fn test_snapshot_sorted_and_serialized() {
        let state = state();
        state.apply_readings(&[sample(8, 0), sample(5, 310)]);

        let snapshot = state.snapshot();
        assert_eq!(snapshot[0].id, DeviceId::new(5));
        assert_eq!(snapshot[1].id, DeviceId::new(8));

        let json = serde_json::to_value(&snapshot[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 5, "mA": 310, "V": 5, "status": "charging",
                "lock": false, "smoke": false, "fire": false
            })
        );
    }
}
