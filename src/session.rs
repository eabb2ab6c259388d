//! Per-sensor session: connection lifecycle, decoding, and fan-out.
//!
//! One `SensorSession` exists per connected sensor. It owns that sensor's
//! connection state, the previous-sample state behind the derived metrics,
//! and the subscriber list decoded readings are published to. All transport
//! operations for a session are serialized through an internal guard so a
//! stale disable can never land after a newer enable.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::decode::{CscMeasurement, CyclingPowerMeasurement, HeartRateMeasurement};
use crate::metrics::RevolutionTracker;
use crate::services::{SensorLocation, SENSOR_LOCATION_UUID};
use crate::transport::Transport;
use crate::types::{CharacteristicFrame, SensorError, SensorKind, SensorReading, SessionState};

/// Handle returned by [`SensorSession::subscribe`], used to unsubscribe.
pub type SubscriptionId = u64;

type Handler = Box<dyn Fn(&SensorReading) + Send>;

struct SessionInner {
    state: SessionState,
    /// Set when a disconnect arrives while a connect future is pending.
    disconnect_requested: bool,
    tracker: RevolutionTracker,
    subscribers: Vec<(SubscriptionId, Handler)>,
    next_subscription: SubscriptionId,
}

/// A session bound to one sensor's measurement characteristic.
pub struct SensorSession {
    address: String,
    kind: SensorKind,
    service: Uuid,
    characteristic: Uuid,
    transport: Arc<dyn Transport>,
    inner: Mutex<SessionInner>,
    /// Serializes connect/disconnect/enable/disable against the transport.
    op_guard: Mutex<()>,
}

impl SensorSession {
    /// Creates an idle session for the given sensor.
    pub fn new(transport: Arc<dyn Transport>, address: impl Into<String>, kind: SensorKind) -> Self {
        Self {
            address: address.into(),
            kind,
            service: kind.service_uuid(),
            characteristic: kind.measurement_uuid(),
            transport,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                disconnect_requested: false,
                tracker: RevolutionTracker::new(),
                subscribers: Vec::new(),
                next_subscription: 0,
            }),
            op_guard: Mutex::new(()),
        }
    }

    /// Peripheral address this session is bound to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Measurement characteristic this session decodes.
    pub fn characteristic(&self) -> Uuid {
        self.characteristic
    }

    /// The kind of sensor this session decodes for.
    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Current connection state.
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state.clone()
    }

    async fn set_state(&self, state: SessionState) {
        self.inner.lock().await.state = state;
    }

    /// Connects to the sensor and enables measurement notifications.
    ///
    /// Valid only from `Idle` or `Error`. A disconnect requested at any
    /// point before the session leaves `Connecting` wins: the connect
    /// outcome is discarded and the session returns to `Idle` with
    /// [`SensorError::Cancelled`].
    pub async fn connect(&self) -> Result<(), SensorError> {
        {
            let mut inner = self.inner.lock().await;
            match inner.state {
                SessionState::Idle | SessionState::Error(_) => {}
                ref state => {
                    return Err(SensorError::InvalidState {
                        operation: "connect",
                        state: state.clone(),
                    })
                }
            }
            inner.state = SessionState::Connecting;
            inner.disconnect_requested = false;
        }

        let _op = self.op_guard.lock().await;
        let connected = self.transport.connect(&self.address).await;

        let services = match connected {
            Ok(services) => services,
            Err(err) => {
                return match self
                    .leave_connecting(SessionState::Error(err.to_string()))
                    .await
                {
                    Ok(()) => Err(err),
                    Err(cancelled) => Err(cancelled),
                }
            }
        };

        if !services.contains(&self.service) {
            let err = SensorError::UnsupportedService(self.service);
            return match self
                .leave_connecting(SessionState::Error(err.to_string()))
                .await
            {
                Ok(()) => Err(err),
                Err(cancelled) => {
                    self.rollback_connection().await;
                    Err(cancelled)
                }
            };
        }

        if let Err(cancelled) = self.leave_connecting(SessionState::Connected).await {
            self.rollback_connection().await;
            return Err(cancelled);
        }

        // The intent flag is only ever set while `Connecting`, so from
        // here on a concurrent disconnect takes the Disconnecting path
        // and queues behind the op guard instead.
        match self
            .transport
            .enable_notifications(&self.address, self.service, self.characteristic)
            .await
        {
            Ok(()) => {
                debug!(address = %self.address, kind = %self.kind, "notifications enabled");
                self.set_state(SessionState::Notifying).await;
                Ok(())
            }
            Err(err) => {
                self.set_state(SessionState::Error(err.to_string())).await;
                Err(err)
            }
        }
    }

    /// Commits the transition out of `Connecting` unless a disconnect
    /// intent arrived first. The intent is checked and consumed in the
    /// same lock acquisition as the state change, so it can never land
    /// unseen between the two; when set, the session goes to `Idle` and
    /// the connect is cancelled.
    async fn leave_connecting(&self, next: SessionState) -> Result<(), SensorError> {
        let mut inner = self.inner.lock().await;
        if std::mem::take(&mut inner.disconnect_requested) {
            inner.state = SessionState::Idle;
            debug!(address = %self.address, "connect cancelled by disconnect request");
            Err(SensorError::Cancelled)
        } else {
            inner.state = next;
            Ok(())
        }
    }

    /// Best-effort teardown of a physical connection whose successful
    /// outcome was discarded by a cancellation.
    async fn rollback_connection(&self) {
        if let Err(err) = self.transport.disconnect(&self.address).await {
            warn!(address = %self.address, error = %err,
                "disconnect after cancelled connect failed");
        }
    }

    /// Disconnects from the sensor.
    ///
    /// A no-op from `Idle`. From `Connecting` the disconnect intent is
    /// recorded and applied once the pending connect settles. Otherwise
    /// notifications are disabled first (failure logged, not fatal) and
    /// the state is `Idle` once the disconnect settles, whatever its
    /// outcome.
    pub async fn disconnect(&self) -> Result<(), SensorError> {
        let was_notifying;
        {
            let mut inner = self.inner.lock().await;
            match inner.state {
                SessionState::Idle => return Ok(()),
                SessionState::Connecting => {
                    inner.disconnect_requested = true;
                    return Ok(());
                }
                _ => {}
            }
            was_notifying = inner.state == SessionState::Notifying;
            inner.state = SessionState::Disconnecting;
        }

        let _op = self.op_guard.lock().await;
        if was_notifying {
            if let Err(err) = self
                .transport
                .disable_notifications(&self.address, self.service, self.characteristic)
                .await
            {
                warn!(address = %self.address, error = %err,
                    "failed to disable notifications, disconnecting anyway");
            }
        }

        let result = self.transport.disconnect(&self.address).await;
        self.set_state(SessionState::Idle).await;
        result
    }

    /// Registers a handler for decoded readings.
    ///
    /// Delivery is synchronous, in arrival order of the underlying
    /// notification events.
    pub async fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&SensorReading) + Send + 'static,
    {
        let mut inner = self.inner.lock().await;
        let id = inner.next_subscription;
        inner.next_subscription += 1;
        inner.subscribers.push((id, Box::new(handler)));
        id
    }

    /// Removes a previously registered handler. Returns whether it existed.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock().await;
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sub, _)| *sub != id);
        inner.subscribers.len() != before
    }

    /// Decodes one notification frame and publishes the reading.
    ///
    /// Frames addressed to a different characteristic are ignored. A frame
    /// that fails to decode is dropped with a warning; it never affects the
    /// session or other sessions.
    pub async fn handle_frame(&self, frame: &CharacteristicFrame) {
        if frame.characteristic != self.characteristic {
            debug!(address = %self.address, characteristic = %frame.characteristic,
                "ignoring frame for other characteristic");
            return;
        }

        let mut inner = self.inner.lock().await;
        let reading = match self.kind {
            SensorKind::PowerMeter => match CyclingPowerMeasurement::decode(&frame.value) {
                Ok(measurement) => SensorReading::Power(inner.tracker.power_reading(measurement)),
                Err(err) => {
                    warn!(address = %self.address, error = %err, "dropping power frame");
                    return;
                }
            },
            SensorKind::SpeedCadence => match CscMeasurement::decode(&frame.value) {
                Ok(measurement) => {
                    SensorReading::SpeedCadence(inner.tracker.csc_reading(measurement))
                }
                Err(err) => {
                    warn!(address = %self.address, error = %err, "dropping CSC frame");
                    return;
                }
            },
            SensorKind::HeartRate => match HeartRateMeasurement::decode(&frame.value) {
                Ok(measurement) => SensorReading::HeartRate(measurement),
                Err(err) => {
                    warn!(address = %self.address, error = %err, "dropping heart rate frame");
                    return;
                }
            },
        };

        for (_, handler) in &inner.subscribers {
            handler(&reading);
        }
    }

    /// Reads the Sensor Location characteristic.
    ///
    /// Valid once `Connected` or later. An out-of-range code is reported
    /// as [`SensorLocation::Unknown`] rather than failing.
    pub async fn sensor_location(&self) -> Result<SensorLocation, SensorError> {
        {
            let inner = self.inner.lock().await;
            match inner.state {
                SessionState::Connected | SessionState::Notifying => {}
                ref state => {
                    return Err(SensorError::InvalidState {
                        operation: "sensor_location",
                        state: state.clone(),
                    })
                }
            }
        }

        let value = self
            .transport
            .read_characteristic(&self.address, self.service, SENSOR_LOCATION_UUID)
            .await?;
        let code = value
            .first()
            .copied()
            .ok_or(SensorError::UnsupportedCharacteristic(SENSOR_LOCATION_UUID))?;
        Ok(SensorLocation::from_code(code))
    }
}

impl std::fmt::Debug for SensorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSession")
            .field("address", &self.address)
            .field("kind", &self.kind)
            .field("characteristic", &self.characteristic)
            .finish_non_exhaustive()
    }
}
