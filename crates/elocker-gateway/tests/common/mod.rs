#![allow(dead_code)]

use elocker_core::{DeviceId, Thresholds};
use elocker_gateway::correlator::Correlator;
use elocker_gateway::link::{DeviceEnd, Link};
use elocker_gateway::lock::{LockController, run_lock_pump};
use elocker_gateway::sensor::{SensorPoller, run_sensor_pump};
use elocker_gateway::store::ThresholdStore;
use elocker_gateway::{Gateway, GatewayState};
use elocker_protocol::{FramingMode, SensorFrame};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub const SENSOR_TIMEOUT: Duration = Duration::from_millis(100);

/// Per-device currents served by [`spawn_sensor_bus`]; absent ids stay silent.
pub type Currents = Arc<Mutex<HashMap<u8, f32>>>;

/// Sensor reply frame: mA, V, smoke, fire.
pub fn reply_bytes(id: u8, ma: f32, v: f32, smoke: bool, fire: bool) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&ma.to_le_bytes());
    body.extend_from_slice(&v.to_le_bytes());
    body.push(u8::from(smoke));
    body.push(u8::from(fire));
    SensorFrame::new(id, body).unwrap().to_bytes().to_vec()
}

/// CU status window for controller 0.
pub fn status_window(mask: u16) -> Vec<u8> {
    let [lo, hi] = mask.to_le_bytes();
    vec![0x02, 0x00, 0x35, lo, hi, 0x00, 0x00, 0x03, 0x00]
}

/// Answer every sensor request from `currents`.
pub fn spawn_sensor_bus(mut device: DeviceEnd, currents: Currents) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = device.next_write().await {
            let id = request[2];
            let current = currents.lock().unwrap().get(&id).copied();
            if let Some(ma) = current {
                device.send(reply_bytes(id, ma, 5.0, false, false)).await;
            }
        }
    })
}

/// Collect every CU command written by the gateway.
pub fn spawn_lock_recorder(mut device: DeviceEnd) -> (Arc<Mutex<Vec<Vec<u8>>>>, tokio::sync::mpsc::Sender<bytes::Bytes>) {
    let written = Arc::new(Mutex::new(Vec::new()));
    let inbound = device.inbound.clone();
    let log = written.clone();
    tokio::spawn(async move {
        while let Some(command) = device.next_write().await {
            log.lock().unwrap().push(command.to_vec());
        }
    });
    (written, inbound)
}

pub struct Harness {
    pub gateway: Arc<Gateway>,
    pub currents: Currents,
    pub lock_commands: Arc<Mutex<Vec<Vec<u8>>>>,
    pub lock_inbound: tokio::sync::mpsc::Sender<bytes::Bytes>,
    pub dir: TempDir,
}

/// Gateway in serial mode with fake sensor and lock devices.
pub fn harness(device_ids: &[u8], release_empty: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = ThresholdStore::new(dir.path().join("store.json"));
    let thresholds = store.load_or_init().unwrap();
    assert_eq!(thresholds, Thresholds::default());
    let state = Arc::new(GatewayState::new(thresholds, false));

    let (sensor_link, sensor_device) = Link::pair(16);
    let (writer, chunks) = sensor_link.into_parts();
    let correlator = Arc::new(Correlator::new(writer));
    tokio::spawn(run_sensor_pump(chunks, FramingMode::LengthPrefixed, correlator.clone()));
    let currents: Currents = Arc::default();
    spawn_sensor_bus(sensor_device, currents.clone());

    let (lock_link, lock_device) = Link::pair(16);
    let (writer, chunks) = lock_link.into_parts();
    let lock = LockController::new(writer, 0, Duration::from_millis(250));
    tokio::spawn(run_lock_pump(chunks, state.clone(), lock.clone(), release_empty));
    let (lock_commands, lock_inbound) = spawn_lock_recorder(lock_device);

    let poller = SensorPoller::new(
        correlator,
        device_ids.iter().copied().map(DeviceId::new).collect(),
        SENSOR_TIMEOUT,
    );
    let gateway = Arc::new(Gateway::new(state, store, lock, Some(poller)));

    Harness {
        gateway,
        currents,
        lock_commands,
        lock_inbound,
        dir,
    }
}

impl Harness {
    pub fn set_current(&self, id: u8, ma: f32) {
        self.currents.lock().unwrap().insert(id, ma);
    }

    /// Deliver a CU status mask and wait until the pump has applied it.
    pub async fn report_locks(&self, mask: u16) {
        self.lock_inbound.send(status_window(mask).into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
