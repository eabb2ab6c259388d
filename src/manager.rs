//! Discovery facade and typed sensor handles.
//!
//! `SensorManager` ties the pieces together: it drives scanning through
//! the transport, classifies what turns up, hands out typed handles bound
//! to per-sensor sessions, and pumps the shared event stream through the
//! router one event at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::router::EventRouter;
use crate::services::SensorLocation;
use crate::session::{SensorSession, SubscriptionId};
use crate::transport::{Transport, TransportEvent};
use crate::types::{Category, DiscoveredSensor, SensorError, SensorKind, SensorReading, SessionState};

/// Coordinates discovery, session creation, and event routing.
pub struct SensorManager {
    transport: Arc<dyn Transport>,
    router: Arc<EventRouter>,
}

impl SensorManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            router: Arc::new(EventRouter::new()),
        }
    }

    /// Requests radio permissions and powers the radio.
    pub async fn initialize(&self) -> Result<(), SensorError> {
        info!("initializing sensor manager");
        self.transport.request_permissions().await?;
        self.transport.enable_radio().await?;
        Ok(())
    }

    /// Scans for fitness sensors and groups them by category.
    ///
    /// A device advertising several supported services appears under every
    /// matching category. The scan runs for `duration`; the transport ends
    /// it with a `ScanStopped` event.
    pub async fn discover_sensors(
        &self,
        duration: Duration,
    ) -> Result<HashMap<Category, Vec<DiscoveredSensor>>, SensorError> {
        let filter: Vec<_> = Category::ALL.iter().map(|c| c.service_uuid()).collect();
        // Subscribe before the scan starts so no discovery is missed.
        let mut events = self.transport.events();
        self.transport.start_scan(&filter, duration).await?;
        info!(?duration, "sensor discovery started");

        let mut found: HashMap<String, DiscoveredSensor> = HashMap::new();
        loop {
            match events.recv().await {
                Ok(TransportEvent::PeripheralDiscovered {
                    address,
                    name,
                    services,
                    rssi,
                }) => {
                    let sensor = DiscoveredSensor::new(address.clone(), name, services, rssi);
                    if sensor.categories.is_empty() {
                        continue;
                    }
                    debug!(address = %sensor.address, categories = ?sensor.categories,
                        "discovered sensor");
                    found.insert(address, sensor);
                }
                Ok(TransportEvent::ScanStopped) => break,
                Ok(TransportEvent::CharacteristicUpdated(_)) => continue,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "discovery receiver lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }

        let mut by_category: HashMap<Category, Vec<DiscoveredSensor>> = Category::ALL
            .into_iter()
            .map(|category| (category, Vec::new()))
            .collect();
        for sensor in found.into_values() {
            for category in &sensor.categories {
                by_category
                    .entry(*category)
                    .or_default()
                    .push(sensor.clone());
            }
        }
        Ok(by_category)
    }

    async fn session(&self, address: &str, kind: SensorKind) -> Arc<SensorSession> {
        let session = Arc::new(SensorSession::new(self.transport.clone(), address, kind));
        self.router.register(&session).await;
        session
    }

    /// Creates a handle for a cycling power meter at `address`.
    pub async fn power_meter(&self, address: &str) -> PowerMeter {
        PowerMeter {
            session: self.session(address, SensorKind::PowerMeter).await,
            router: self.router.clone(),
        }
    }

    /// Creates a handle for a speed/cadence sensor at `address`.
    pub async fn speed_cadence_sensor(&self, address: &str) -> SpeedCadenceSensor {
        SpeedCadenceSensor {
            session: self.session(address, SensorKind::SpeedCadence).await,
            router: self.router.clone(),
        }
    }

    /// Creates a handle for a heart-rate monitor at `address`.
    pub async fn heart_rate_monitor(&self, address: &str) -> HeartRateMonitor {
        HeartRateMonitor {
            session: self.session(address, SensorKind::HeartRate).await,
            router: self.router.clone(),
        }
    }

    /// Processes the shared event stream until the transport closes it.
    ///
    /// Each event is routed, decoded, and published to completion before
    /// the next one is taken, so decodes for different sessions never
    /// interleave.
    pub async fn pump_events(&self) {
        let mut events = self.transport.events();
        loop {
            match events.recv().await {
                Ok(TransportEvent::CharacteristicUpdated(frame)) => {
                    self.router.route(&frame).await;
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "event pump lagged, frames dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("transport event stream closed");
    }
}

impl std::fmt::Debug for SensorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorManager").finish_non_exhaustive()
    }
}

macro_rules! delegate_session_api {
    () => {
        /// Connects and enables measurement notifications.
        pub async fn connect(&self) -> Result<(), SensorError> {
            self.session.connect().await
        }

        /// Disconnects; a no-op when already idle.
        pub async fn disconnect(&self) -> Result<(), SensorError> {
            self.session.disconnect().await
        }

        /// Registers a handler for decoded readings.
        pub async fn subscribe<F>(&self, handler: F) -> SubscriptionId
        where
            F: Fn(&SensorReading) + Send + 'static,
        {
            self.session.subscribe(handler).await
        }

        /// Removes a previously registered handler.
        pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
            self.session.unsubscribe(id).await
        }

        /// Current connection state.
        pub async fn state(&self) -> SessionState {
            self.session.state().await
        }

        /// Peripheral address this handle is bound to.
        pub fn address(&self) -> &str {
            self.session.address()
        }

        /// Unregisters the sensor from the router, ending frame delivery.
        pub async fn release(self) {
            self.router
                .release(self.session.address(), self.session.characteristic())
                .await;
        }
    };
}

/// Handle for a cycling power meter.
pub struct PowerMeter {
    session: Arc<SensorSession>,
    router: Arc<EventRouter>,
}

impl PowerMeter {
    delegate_session_api!();

    /// Reads where on the bike the power sensor is mounted.
    pub async fn sensor_location(&self) -> Result<SensorLocation, SensorError> {
        self.session.sensor_location().await
    }
}

/// Handle for a cycling speed/cadence sensor.
pub struct SpeedCadenceSensor {
    session: Arc<SensorSession>,
    router: Arc<EventRouter>,
}

impl SpeedCadenceSensor {
    delegate_session_api!();
}

/// Handle for a heart-rate monitor.
pub struct HeartRateMonitor {
    session: Arc<SensorSession>,
    router: Arc<EventRouter>,
}

impl HeartRateMonitor {
    delegate_session_api!();
}
