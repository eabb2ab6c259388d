//! Discovery and manager-level tests against the scripted mock transport.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Call, MockTransport};
use cyclemetry::services::{
    BATTERY_SERVICE_UUID, CSC_SERVICE_UUID, CYCLING_POWER_SERVICE_UUID, HEART_RATE_SERVICE_UUID,
};
use cyclemetry::services::HEART_RATE_MEASUREMENT_UUID;
use cyclemetry::transport::TransportEvent;
use cyclemetry::{Category, CharacteristicFrame, SensorManager, SensorReading, SessionState};
use uuid::Uuid;

fn discovered(address: &str, name: &str, services: Vec<Uuid>) -> TransportEvent {
    TransportEvent::PeripheralDiscovered {
        address: address.to_string(),
        name: Some(name.to_string()),
        services,
        rssi: Some(-55),
    }
}

#[tokio::test]
async fn initialize_requests_permissions_then_radio() {
    let mock = MockTransport::new();
    let manager = SensorManager::new(mock.clone());

    manager.initialize().await.unwrap();

    assert_eq!(
        mock.calls(),
        vec![Call::RequestPermissions, Call::EnableRadio]
    );
}

#[tokio::test]
async fn discovery_groups_sensors_by_category() {
    let mock = MockTransport::new();
    mock.set_scan_script(vec![
        // Power meter that also broadcasts heart rate.
        discovered(
            "AA",
            "Assioma",
            vec![CYCLING_POWER_SERVICE_UUID, HEART_RATE_SERVICE_UUID],
        ),
        discovered("BB", "CadenceStick", vec![CSC_SERVICE_UUID]),
        // Battery-only peripheral, not a fitness sensor.
        discovered("CC", "Beacon", vec![BATTERY_SERVICE_UUID]),
    ]);
    let manager = SensorManager::new(mock.clone());

    let sensors = manager
        .discover_sensors(Duration::from_secs(5))
        .await
        .unwrap();

    let addresses = |category: Category| -> Vec<&str> {
        sensors[&category]
            .iter()
            .map(|s| s.address.as_str())
            .collect()
    };
    // The dual-service device appears under both of its categories.
    assert_eq!(addresses(Category::CyclingPower), vec!["AA"]);
    assert_eq!(addresses(Category::HeartRate), vec!["AA"]);
    assert_eq!(addresses(Category::CyclingSpeedAndCadence), vec!["BB"]);
    assert!(mock.calls().contains(&Call::StartScan));
}

#[tokio::test]
async fn rediscovered_peripheral_is_reported_once() {
    let mock = MockTransport::new();
    mock.set_scan_script(vec![
        discovered("AA", "HRM", vec![HEART_RATE_SERVICE_UUID]),
        discovered("AA", "HRM", vec![HEART_RATE_SERVICE_UUID]),
    ]);
    let manager = SensorManager::new(mock.clone());

    let sensors = manager
        .discover_sensors(Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(sensors[&Category::HeartRate].len(), 1);
}

#[tokio::test]
async fn handle_connects_and_receives_pumped_readings() {
    let mock = MockTransport::new();
    let manager = Arc::new(SensorManager::new(mock.clone()));

    let monitor = manager.heart_rate_monitor("AA").await;
    monitor.connect().await.unwrap();
    assert_eq!(monitor.state().await, SessionState::Notifying);

    let readings = Arc::new(Mutex::new(Vec::new()));
    let sink = readings.clone();
    monitor
        .subscribe(move |reading: &SensorReading| sink.lock().unwrap().push(reading.clone()))
        .await;

    let pump = tokio::spawn({
        let manager = manager.clone();
        async move { manager.pump_events().await }
    });
    // Let the pump reach the event stream before injecting a frame.
    tokio::task::yield_now().await;

    mock.notify(CharacteristicFrame {
        address: "AA".to_string(),
        characteristic: HEART_RATE_MEASUREMENT_UUID,
        value: vec![0x00, 0x46],
    });

    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if !readings.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("reading was never delivered");

    match &readings.lock().unwrap()[0] {
        SensorReading::HeartRate(m) => assert_eq!(m.bpm, 70),
        other => panic!("unexpected reading: {other:?}"),
    }
    pump.abort();
}

#[tokio::test]
async fn released_handle_no_longer_receives_frames() {
    let mock = MockTransport::new();
    let manager = Arc::new(SensorManager::new(mock.clone()));

    let monitor = manager.heart_rate_monitor("AA").await;
    let readings = Arc::new(Mutex::new(Vec::new()));
    let sink = readings.clone();
    monitor
        .subscribe(move |reading: &SensorReading| sink.lock().unwrap().push(reading.clone()))
        .await;
    monitor.release().await;

    let pump = tokio::spawn({
        let manager = manager.clone();
        async move { manager.pump_events().await }
    });
    tokio::task::yield_now().await;

    mock.notify(CharacteristicFrame {
        address: "AA".to_string(),
        characteristic: HEART_RATE_MEASUREMENT_UUID,
        value: vec![0x00, 0x46],
    });
    // Give the pump a chance to (incorrectly) deliver.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert!(readings.lock().unwrap().is_empty());
    pump.abort();
}
