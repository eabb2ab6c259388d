//! Core types for BLE fitness sensor telemetry.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::decode::{DecodeError, HeartRateMeasurement};
use crate::metrics::{CscReading, PowerReading};
use crate::services;

/// Category of fitness sensor, derived from advertised services.
///
/// Categories are not exclusive: a combined device advertising several
/// supported services belongs to every matching category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    CyclingPower,
    CyclingSpeedAndCadence,
    HeartRate,
}

impl Category {
    /// All categories the crate can classify a device into.
    pub const ALL: [Category; 3] = [
        Category::CyclingPower,
        Category::CyclingSpeedAndCadence,
        Category::HeartRate,
    ];

    /// The service UUID whose presence puts a device in this category.
    pub fn service_uuid(&self) -> Uuid {
        match self {
            Category::CyclingPower => services::CYCLING_POWER_SERVICE_UUID,
            Category::CyclingSpeedAndCadence => services::CSC_SERVICE_UUID,
            Category::HeartRate => services::HEART_RATE_SERVICE_UUID,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::CyclingPower => write!(f, "Cycling Power"),
            Category::CyclingSpeedAndCadence => write!(f, "Cycling Speed/Cadence"),
            Category::HeartRate => write!(f, "Heart Rate"),
        }
    }
}

/// Classifies a peripheral by its advertised service UUID set.
///
/// Each category is evaluated independently, so a device may land in zero,
/// one, or several categories.
pub fn classify(advertised: &[Uuid]) -> BTreeSet<Category> {
    Category::ALL
        .into_iter()
        .filter(|category| advertised.contains(&category.service_uuid()))
        .collect()
}

/// A sensor discovered during BLE scanning.
#[derive(Debug, Clone)]
pub struct DiscoveredSensor {
    /// Transport-assigned peripheral address.
    pub address: String,
    /// Name from the BLE advertisement, if any.
    pub name: Option<String>,
    /// Raw advertised service UUIDs.
    pub advertised_services: Vec<Uuid>,
    /// Signal strength (RSSI).
    pub rssi: Option<i16>,
    /// Categories derived from the advertised services.
    pub categories: BTreeSet<Category>,
}

impl DiscoveredSensor {
    /// Builds a discovered sensor, classifying it from its advertisement.
    pub fn new(
        address: String,
        name: Option<String>,
        advertised_services: Vec<Uuid>,
        rssi: Option<i16>,
    ) -> Self {
        let categories = classify(&advertised_services);
        Self {
            address,
            name,
            advertised_services,
            rssi,
            categories,
        }
    }
}

/// A raw notification payload, the input unit to the frame decoder.
#[derive(Debug, Clone)]
pub struct CharacteristicFrame {
    /// Address of the originating peripheral.
    pub address: String,
    /// Characteristic the value was pushed for.
    pub characteristic: Uuid,
    /// Raw notification bytes, never mutated once received.
    pub value: Vec<u8>,
}

/// Which measurement stream a session is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    PowerMeter,
    SpeedCadence,
    HeartRate,
}

impl SensorKind {
    /// Service the measurement characteristic lives under.
    pub fn service_uuid(&self) -> Uuid {
        match self {
            SensorKind::PowerMeter => services::CYCLING_POWER_SERVICE_UUID,
            SensorKind::SpeedCadence => services::CSC_SERVICE_UUID,
            SensorKind::HeartRate => services::HEART_RATE_SERVICE_UUID,
        }
    }

    /// Measurement characteristic notifications are enabled on.
    pub fn measurement_uuid(&self) -> Uuid {
        match self {
            SensorKind::PowerMeter => services::CYCLING_POWER_MEASUREMENT_UUID,
            SensorKind::SpeedCadence => services::CSC_MEASUREMENT_UUID,
            SensorKind::HeartRate => services::HEART_RATE_MEASUREMENT_UUID,
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::PowerMeter => write!(f, "Power Meter"),
            SensorKind::SpeedCadence => write!(f, "Speed/Cadence"),
            SensorKind::HeartRate => write!(f, "Heart Rate"),
        }
    }
}

/// Connection state of a sensor session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not connected.
    #[default]
    Idle,
    /// Connect issued, outcome pending.
    Connecting,
    /// Connected, notifications not yet enabled.
    Connected,
    /// Connected with notifications flowing.
    Notifying,
    /// Disconnect in progress.
    Disconnecting,
    /// A connect or notification-setup step failed.
    Error(String),
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Connected => write!(f, "Connected"),
            SessionState::Notifying => write!(f, "Notifying"),
            SessionState::Disconnecting => write!(f, "Disconnecting"),
            SessionState::Error(cause) => write!(f, "Error: {}", cause),
        }
    }
}

/// A decoded measurement published to session subscribers.
#[derive(Debug, Clone)]
pub enum SensorReading {
    Power(PowerReading),
    SpeedCadence(CscReading),
    HeartRate(HeartRateMeasurement),
}

/// Errors that can occur in the sensor system.
#[derive(Debug, Error)]
pub enum SensorError {
    /// BLE adapter not found or unavailable.
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Failure propagated from the external transport.
    #[error("transport failure: {0}")]
    Transport(String),

    /// No peripheral with the given address is known to the transport.
    #[error("sensor not found: {0}")]
    SensorNotFound(String),

    /// The peripheral does not expose the requested service.
    #[error("service {0} not supported by peripheral")]
    UnsupportedService(Uuid),

    /// The peripheral does not expose the requested characteristic.
    #[error("characteristic {0} not supported by peripheral")]
    UnsupportedCharacteristic(Uuid),

    /// Operation not valid in the session's current state.
    #[error("{operation} is not valid while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// A pending connect was abandoned by a disconnect request.
    #[error("connect cancelled by disconnect request")]
    Cancelled,

    /// A notification frame could not be decoded.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_single_service() {
        let advertised = vec![services::HEART_RATE_SERVICE_UUID];
        let categories = classify(&advertised);
        assert_eq!(categories.len(), 1);
        assert!(categories.contains(&Category::HeartRate));
    }

    #[test]
    fn test_classify_dual_service_device() {
        // A crank-based power meter that also reports heart rate must land
        // in both categories, not just the first match.
        let advertised = vec![
            services::CYCLING_POWER_SERVICE_UUID,
            services::HEART_RATE_SERVICE_UUID,
        ];
        let categories = classify(&advertised);
        assert!(categories.contains(&Category::CyclingPower));
        assert!(categories.contains(&Category::HeartRate));
        assert_eq!(categories.len(), 2);
    }

    #[test]
    fn test_classify_unsupported_services() {
        let advertised = vec![
            services::BATTERY_SERVICE_UUID,
            services::DEVICE_INFORMATION_SERVICE_UUID,
        ];
        assert!(classify(&advertised).is_empty());
    }

    #[test]
    fn test_discovered_sensor_carries_classification() {
        let sensor = DiscoveredSensor::new(
            "AA:BB:CC:DD:EE:FF".to_string(),
            Some("KICKR".to_string()),
            vec![services::CSC_SERVICE_UUID],
            Some(-60),
        );
        assert!(sensor
            .categories
            .contains(&Category::CyclingSpeedAndCadence));
    }
}
