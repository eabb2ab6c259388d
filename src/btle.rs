//! btleplug-backed transport implementation.
//!
//! Wraps the first available system adapter and adapts btleplug's central
//! events and per-peripheral notification streams onto the single shared
//! [`TransportEvent`] stream the engine consumes.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::transport::{Transport, TransportEvent};
use crate::types::{CharacteristicFrame, SensorError};

fn transport_err(err: btleplug::Error) -> SensorError {
    SensorError::Transport(err.to_string())
}

/// BLE transport backed by the system's first btleplug adapter.
pub struct BtleTransport {
    adapter: Adapter,
    events: broadcast::Sender<TransportEvent>,
}

impl BtleTransport {
    /// Initializes the adapter and starts forwarding discovery events.
    pub async fn new() -> Result<Self, SensorError> {
        let manager = Manager::new().await.map_err(transport_err)?;
        let adapters = manager.adapters().await.map_err(transport_err)?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(SensorError::AdapterNotFound)?;
        info!("BLE adapter initialized");

        let (events, _) = broadcast::channel(256);
        let transport = Self { adapter, events };
        transport.spawn_discovery_forwarder();
        Ok(transport)
    }

    fn spawn_discovery_forwarder(&self) {
        let adapter = self.adapter.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut central_events = match adapter.events().await {
                Ok(stream) => stream,
                Err(err) => {
                    error!(error = %err, "failed to get adapter events");
                    return;
                }
            };

            while let Some(event) = central_events.next().await {
                if let CentralEvent::DeviceDiscovered(id) = event {
                    let peripheral = match adapter.peripheral(&id).await {
                        Ok(peripheral) => peripheral,
                        Err(_) => continue,
                    };
                    let properties = match peripheral.properties().await {
                        Ok(Some(properties)) => properties,
                        _ => continue,
                    };
                    let _ = events.send(TransportEvent::PeripheralDiscovered {
                        address: id.to_string(),
                        name: properties.local_name,
                        services: properties.services,
                        rssi: properties.rssi,
                    });
                }
            }
        });
    }

    async fn peripheral(&self, address: &str) -> Result<Peripheral, SensorError> {
        let peripherals = self.adapter.peripherals().await.map_err(transport_err)?;
        peripherals
            .into_iter()
            .find(|p| p.id().to_string() == address)
            .ok_or_else(|| SensorError::SensorNotFound(address.to_string()))
    }

    fn find_characteristic(
        peripheral: &Peripheral,
        characteristic: Uuid,
    ) -> Result<Characteristic, SensorError> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or(SensorError::UnsupportedCharacteristic(characteristic))
    }

    fn spawn_notification_forwarder(&self, peripheral: Peripheral, address: String) {
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(stream) => stream,
                Err(err) => {
                    error!(address = %address, error = %err,
                        "failed to get notification stream");
                    return;
                }
            };

            while let Some(notification) = notifications.next().await {
                let _ = events.send(TransportEvent::CharacteristicUpdated(CharacteristicFrame {
                    address: address.clone(),
                    characteristic: notification.uuid,
                    value: notification.value,
                }));
            }
            debug!(address = %address, "notification stream ended");
        });
    }
}

#[async_trait]
impl Transport for BtleTransport {
    async fn request_permissions(&self) -> Result<(), SensorError> {
        // Desktop platforms prompt at the OS level when the adapter is
        // first touched; nothing to request here.
        debug!("radio permissions handled by the platform");
        Ok(())
    }

    async fn enable_radio(&self) -> Result<(), SensorError> {
        debug!("radio power state handled by the platform");
        Ok(())
    }

    async fn start_scan(&self, services: &[Uuid], duration: Duration) -> Result<(), SensorError> {
        self.adapter
            .start_scan(ScanFilter {
                services: services.to_vec(),
            })
            .await
            .map_err(transport_err)?;
        info!(?duration, "scan started");

        let adapter = self.adapter.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Err(err) = adapter.stop_scan().await {
                warn!(error = %err, "failed to stop scan after duration");
            }
            let _ = events.send(TransportEvent::ScanStopped);
        });
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), SensorError> {
        self.adapter.stop_scan().await.map_err(transport_err)?;
        let _ = self.events.send(TransportEvent::ScanStopped);
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<Vec<Uuid>, SensorError> {
        let peripheral = self.peripheral(address).await?;
        peripheral.connect().await.map_err(transport_err)?;
        peripheral
            .discover_services()
            .await
            .map_err(transport_err)?;
        info!(address = %address, "connected");

        self.spawn_notification_forwarder(peripheral.clone(), address.to_string());

        Ok(peripheral.services().iter().map(|s| s.uuid).collect())
    }

    async fn disconnect(&self, address: &str) -> Result<(), SensorError> {
        let peripheral = self.peripheral(address).await?;
        peripheral.disconnect().await.map_err(transport_err)?;
        info!(address = %address, "disconnected");
        Ok(())
    }

    async fn enable_notifications(
        &self,
        address: &str,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), SensorError> {
        let peripheral = self.peripheral(address).await?;
        let characteristic = Self::find_characteristic(&peripheral, characteristic)?;
        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(transport_err)?;
        debug!(address = %address, characteristic = %characteristic.uuid,
            "notifications enabled");
        Ok(())
    }

    async fn disable_notifications(
        &self,
        address: &str,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), SensorError> {
        let peripheral = self.peripheral(address).await?;
        let characteristic = Self::find_characteristic(&peripheral, characteristic)?;
        peripheral
            .unsubscribe(&characteristic)
            .await
            .map_err(transport_err)?;
        debug!(address = %address, characteristic = %characteristic.uuid,
            "notifications disabled");
        Ok(())
    }

    async fn read_characteristic(
        &self,
        address: &str,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, SensorError> {
        let peripheral = self.peripheral(address).await?;
        let characteristic = Self::find_characteristic(&peripheral, characteristic)?;
        peripheral.read(&characteristic).await.map_err(transport_err)
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
