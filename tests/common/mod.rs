//! Scripted mock transport for session and discovery tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

use cyclemetry::services::{CSC_SERVICE_UUID, CYCLING_POWER_SERVICE_UUID, HEART_RATE_SERVICE_UUID};
use cyclemetry::transport::{Transport, TransportEvent};
use cyclemetry::types::{CharacteristicFrame, SensorError};

/// A transport operation the mock observed, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RequestPermissions,
    EnableRadio,
    StartScan,
    StopScan,
    Connect(String),
    Disconnect(String),
    EnableNotifications(String, Uuid),
    DisableNotifications(String, Uuid),
    ReadCharacteristic(String, Uuid),
}

pub struct MockTransport {
    events: broadcast::Sender<TransportEvent>,
    calls: StdMutex<Vec<Call>>,
    /// Services reported by a successful connect.
    connect_services: StdMutex<Vec<Uuid>>,
    /// Events replayed onto the stream when start_scan is called.
    scan_script: StdMutex<Vec<TransportEvent>>,
    /// Value returned by read_characteristic.
    read_value: StdMutex<Vec<u8>>,
    /// When set, connect blocks until the gate is notified.
    connect_gate: StdMutex<Option<Arc<Notify>>>,
    fail_connect: AtomicBool,
    fail_enable: AtomicBool,
    fail_disable: AtomicBool,
    fail_disconnect: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            events,
            calls: StdMutex::new(Vec::new()),
            connect_services: StdMutex::new(vec![
                CYCLING_POWER_SERVICE_UUID,
                CSC_SERVICE_UUID,
                HEART_RATE_SERVICE_UUID,
            ]),
            scan_script: StdMutex::new(Vec::new()),
            read_value: StdMutex::new(Vec::new()),
            connect_gate: StdMutex::new(None),
            fail_connect: AtomicBool::new(false),
            fail_enable: AtomicBool::new(false),
            fail_disable: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn set_connect_services(&self, services: Vec<Uuid>) {
        *self.connect_services.lock().unwrap() = services;
    }

    pub fn set_scan_script(&self, script: Vec<TransportEvent>) {
        *self.scan_script.lock().unwrap() = script;
    }

    pub fn set_read_value(&self, value: Vec<u8>) {
        *self.read_value.lock().unwrap() = value;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_enable(&self, fail: bool) {
        self.fail_enable.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_disable(&self, fail: bool) {
        self.fail_disable.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    /// Makes the next connect call block until the returned gate is
    /// notified, so a disconnect can be raced against it.
    pub fn gate_connect(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.connect_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Injects a notification frame onto the shared stream.
    pub fn notify(&self, frame: CharacteristicFrame) {
        let _ = self
            .events
            .send(TransportEvent::CharacteristicUpdated(frame));
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request_permissions(&self) -> Result<(), SensorError> {
        self.record(Call::RequestPermissions);
        Ok(())
    }

    async fn enable_radio(&self) -> Result<(), SensorError> {
        self.record(Call::EnableRadio);
        Ok(())
    }

    async fn start_scan(&self, _services: &[Uuid], _duration: Duration) -> Result<(), SensorError> {
        self.record(Call::StartScan);
        for event in self.scan_script.lock().unwrap().drain(..) {
            let _ = self.events.send(event);
        }
        let _ = self.events.send(TransportEvent::ScanStopped);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), SensorError> {
        self.record(Call::StopScan);
        let _ = self.events.send(TransportEvent::ScanStopped);
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<Vec<Uuid>, SensorError> {
        self.record(Call::Connect(address.to_string()));
        let gate = self.connect_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(SensorError::Transport("connect refused".to_string()));
        }
        Ok(self.connect_services.lock().unwrap().clone())
    }

    async fn disconnect(&self, address: &str) -> Result<(), SensorError> {
        self.record(Call::Disconnect(address.to_string()));
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(SensorError::Transport("disconnect failed".to_string()));
        }
        Ok(())
    }

    async fn enable_notifications(
        &self,
        address: &str,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), SensorError> {
        self.record(Call::EnableNotifications(
            address.to_string(),
            characteristic,
        ));
        if self.fail_enable.load(Ordering::SeqCst) {
            return Err(SensorError::Transport("enable refused".to_string()));
        }
        Ok(())
    }

    async fn disable_notifications(
        &self,
        address: &str,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), SensorError> {
        self.record(Call::DisableNotifications(
            address.to_string(),
            characteristic,
        ));
        if self.fail_disable.load(Ordering::SeqCst) {
            return Err(SensorError::Transport("disable refused".to_string()));
        }
        Ok(())
    }

    async fn read_characteristic(
        &self,
        address: &str,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, SensorError> {
        self.record(Call::ReadCharacteristic(
            address.to_string(),
            characteristic,
        ));
        Ok(self.read_value.lock().unwrap().clone())
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
