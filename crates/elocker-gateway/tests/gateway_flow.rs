//! Serial-mode gateway against fake sensor and lock devices.

mod common;

use common::harness;
use elocker_core::{ChargeStatus, DeviceId};
use elocker_gateway::http::route;
use serde_json::Value;

#[tokio::test(start_paused = true)]
async fn test_sweep_creates_records_in_id_order() {
    let h = harness(&[8, 5, 6], true);
    h.set_current(8, 0.0);
    h.set_current(5, 152.4);

    let status = h.gateway.get_status().await;
    assert_eq!(status.len(), 2);
    assert_eq!(status[0].id, DeviceId::new(5));
    assert_eq!(status[0].milliamps, 152);
    assert_eq!(status[0].status, ChargeStatus::FullyCharged);
    assert_eq!(status[1].id, DeviceId::new(8));
    assert_eq!(status[1].status, ChargeStatus::NotCharging);
}

#[tokio::test(start_paused = true)]
async fn test_silent_device_keeps_last_values() {
    let h = harness(&[5], true);
    h.set_current(5, 420.0);
    h.gateway.get_status().await;

    h.currents.lock().unwrap().remove(&5);
    let status = h.gateway.get_status().await;
    assert_eq!(status[0].milliamps, 420);
    assert_eq!(status[0].status, ChargeStatus::Charging);
}

#[tokio::test(start_paused = true)]
async fn test_threshold_change_reclassifies_unchanged_readings() {
    let h = harness(&[5], true);
    h.set_current(5, 150.0);

    let before = route(&h.gateway, "POST", "/getStatus", b"").await;
    let json: Value = serde_json::from_str(&before.body).unwrap();
    assert_eq!(json["results"][0]["status"], "fullcharged");

    let response = route(
        &h.gateway,
        "POST",
        "/setThreshold",
        br#"{"fullcharged": 300, "notcharged": 200}"#,
    )
    .await;
    assert_eq!(response.status, 200);

    let after = route(&h.gateway, "POST", "/getStatus", b"").await;
    let json: Value = serde_json::from_str(&after.body).unwrap();
    assert_eq!(json["results"][0]["mA"], 150);
    assert_eq!(json["results"][0]["status"], "notcharge");

    let stored: Value =
        serde_json::from_str(&std::fs::read_to_string(h.dir.path().join("store.json")).unwrap())
            .unwrap();
    assert_eq!(stored["notcharged"], 200.0);
}

#[tokio::test(start_paused = true)]
async fn test_unlock_after_debounce() {
    let h = harness(&[5], false);
    h.set_current(5, 150.0);
    h.gateway.get_status().await;
    h.report_locks(0b1_0000).await;

    for _ in 0..3 {
        h.gateway.get_status().await;
    }
    // four qualifying samples
    let denied = route(&h.gateway, "POST", "/unlock", br#"{"id": 5}"#).await;
    assert_eq!(denied.status, 400);
    assert!(denied.body.contains("Device is charging!"));

    h.gateway.get_status().await;
    let allowed = route(&h.gateway, "POST", "/unlock", br#"{"id": 5}"#).await;
    assert_eq!(allowed.status, 200);

    let commands = h.lock_commands.lock().unwrap().clone();
    assert_eq!(
        commands,
        vec![
            vec![0x02, 0x04, 0x31, 0x03, 0x3A],
            vec![0x02, 0x00, 0x30, 0x03, 0x35],
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_locked_slot_is_released() {
    let h = harness(&[5, 6], true);
    h.set_current(5, 20.0);
    h.set_current(6, 800.0);
    h.gateway.get_status().await;

    h.report_locks(0b11_0000).await;

    let commands = h.lock_commands.lock().unwrap().clone();
    assert_eq!(commands, vec![vec![0x02, 0x04, 0x31, 0x03, 0x3A]]);

    let record = h.gateway.state().record(DeviceId::new(6)).unwrap();
    assert!(record.lock);
}
