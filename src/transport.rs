//! Abstract BLE transport interface.
//!
//! The engine never touches radio state directly: it consumes a single
//! shared event stream and a handful of async operations from whatever
//! stack actually drives the hardware. The btleplug implementation lives
//! in [`crate::btle`]; tests use a scripted mock.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{CharacteristicFrame, SensorError};

/// Events emitted on the transport's shared stream.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A peripheral was seen during scanning.
    PeripheralDiscovered {
        address: String,
        name: Option<String>,
        services: Vec<Uuid>,
        rssi: Option<i16>,
    },
    /// Scanning ended, either by duration or by an explicit stop.
    ScanStopped,
    /// A notified characteristic value arrived.
    CharacteristicUpdated(CharacteristicFrame),
}

/// The external BLE stack, reduced to the operations the engine needs.
///
/// Every operation returns an explicit `Result`; implementations must
/// never resolve a failed operation as success.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Ask the platform for whatever radio permissions it requires.
    async fn request_permissions(&self) -> Result<(), SensorError>;

    /// Ensure the radio is powered and usable.
    async fn enable_radio(&self) -> Result<(), SensorError>;

    /// Start scanning for peripherals advertising one of `services`.
    /// Scanning stops after `duration` and a [`TransportEvent::ScanStopped`]
    /// is emitted.
    async fn start_scan(&self, services: &[Uuid], duration: Duration) -> Result<(), SensorError>;

    /// Stop an in-progress scan.
    async fn stop_scan(&self) -> Result<(), SensorError>;

    /// Connect to a peripheral, returning the services it exposes.
    async fn connect(&self, address: &str) -> Result<Vec<Uuid>, SensorError>;

    /// Disconnect from a peripheral.
    async fn disconnect(&self, address: &str) -> Result<(), SensorError>;

    /// Enable notifications for a characteristic.
    async fn enable_notifications(
        &self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), SensorError>;

    /// Disable notifications for a characteristic.
    async fn disable_notifications(
        &self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), SensorError>;

    /// Read a characteristic's current value.
    async fn read_characteristic(
        &self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, SensorError>;

    /// Subscribe to the shared discovery/notification event stream.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}
