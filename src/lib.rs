//! Cyclemetry - BLE fitness sensor telemetry.
//!
//! Decodes the measurement notifications broadcast by BLE cycling power
//! meters, speed/cadence sensors, and heart-rate monitors into structured
//! records, derives cadence and wheel speed from their rolling revolution
//! counters, and manages the per-sensor connection lifecycle over an
//! abstract transport (a btleplug implementation is included).

pub mod btle;
pub mod decode;
pub mod manager;
pub mod metrics;
pub mod router;
pub mod services;
pub mod session;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use decode::{
    CscMeasurement, CyclingPowerMeasurement, CyclingPowerVector, DecodeError,
    HeartRateMeasurement, MeasurementDirection,
};
pub use manager::{HeartRateMonitor, PowerMeter, SensorManager, SpeedCadenceSensor};
pub use metrics::{CscReading, PowerReading, RevolutionSample, RevolutionTracker, StreamKind};
pub use router::EventRouter;
pub use services::{SensorLocation, ServiceId};
pub use session::{SensorSession, SubscriptionId};
pub use transport::{Transport, TransportEvent};
pub use types::{
    classify, Category, CharacteristicFrame, DiscoveredSensor, SensorError, SensorKind,
    SensorReading, SessionState,
};
