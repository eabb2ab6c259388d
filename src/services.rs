//! GATT service catalog for BLE fitness sensors.
//!
//! Maps the well-known 16-bit service and characteristic identifiers to
//! semantic names, and normalizes short-form UUIDs to their full 128-bit
//! representation for comparison against advertisement data.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Battery Service UUID (0x180F)
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180f_0000_1000_8000_0080_5f9b_34fb);

/// Heart Rate Service UUID (0x180D)
pub const HEART_RATE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_180d_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Power Service UUID (0x1818)
pub const CYCLING_POWER_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1818_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Speed and Cadence Service UUID (0x1816)
pub const CSC_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1816_0000_1000_8000_0080_5f9b_34fb);

/// Running Speed and Cadence Service UUID (0x1814)
pub const RSC_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1814_0000_1000_8000_0080_5f9b_34fb);

/// Device Information Service UUID (0x180A)
pub const DEVICE_INFORMATION_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_180a_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Power Measurement Characteristic UUID (0x2A63)
pub const CYCLING_POWER_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a63_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Power Vector Characteristic UUID (0x2A64)
pub const CYCLING_POWER_VECTOR_UUID: Uuid =
    Uuid::from_u128(0x0000_2a64_0000_1000_8000_0080_5f9b_34fb);

/// CSC Measurement Characteristic UUID (0x2A5B)
pub const CSC_MEASUREMENT_UUID: Uuid = Uuid::from_u128(0x0000_2a5b_0000_1000_8000_0080_5f9b_34fb);

/// Heart Rate Measurement Characteristic UUID (0x2A37)
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_0080_5f9b_34fb);

/// Sensor Location Characteristic UUID (0x2A5D)
pub const SENSOR_LOCATION_UUID: Uuid = Uuid::from_u128(0x0000_2a5d_0000_1000_8000_0080_5f9b_34fb);

/// Battery Level Characteristic UUID (0x2A19)
pub const BATTERY_LEVEL_UUID: Uuid = Uuid::from_u128(0x0000_2a19_0000_1000_8000_0080_5f9b_34fb);

/// A GATT service the crate knows how to work with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceId {
    Battery,
    HeartRate,
    CyclingPower,
    CyclingSpeedAndCadence,
    RunningSpeedAndCadence,
    SensorLocation,
    DeviceInformation,
}

impl ServiceId {
    /// Canonical 16-bit assigned number for this service.
    pub fn short_uuid(&self) -> u16 {
        match self {
            ServiceId::Battery => 0x180f,
            ServiceId::HeartRate => 0x180d,
            ServiceId::CyclingPower => 0x1818,
            ServiceId::CyclingSpeedAndCadence => 0x1816,
            ServiceId::RunningSpeedAndCadence => 0x1814,
            ServiceId::SensorLocation => 0x2a5d,
            ServiceId::DeviceInformation => 0x180a,
        }
    }

    /// Full 128-bit UUID for this service.
    pub fn uuid(&self) -> Uuid {
        match self {
            ServiceId::Battery => BATTERY_SERVICE_UUID,
            ServiceId::HeartRate => HEART_RATE_SERVICE_UUID,
            ServiceId::CyclingPower => CYCLING_POWER_SERVICE_UUID,
            ServiceId::CyclingSpeedAndCadence => CSC_SERVICE_UUID,
            ServiceId::RunningSpeedAndCadence => RSC_SERVICE_UUID,
            ServiceId::SensorLocation => SENSOR_LOCATION_UUID,
            ServiceId::DeviceInformation => DEVICE_INFORMATION_SERVICE_UUID,
        }
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceId::Battery => write!(f, "Battery"),
            ServiceId::HeartRate => write!(f, "Heart Rate"),
            ServiceId::CyclingPower => write!(f, "Cycling Power"),
            ServiceId::CyclingSpeedAndCadence => write!(f, "Cycling Speed and Cadence"),
            ServiceId::RunningSpeedAndCadence => write!(f, "Running Speed and Cadence"),
            ServiceId::SensorLocation => write!(f, "Sensor Location"),
            ServiceId::DeviceInformation => write!(f, "Device Information"),
        }
    }
}

/// Expands a UUID string to its full 128-bit form.
///
/// A 4-character short UUID becomes `0000XXXX-0000-1000-8000-00805F9B34FB`,
/// an 8-character UUID gets the same Bluetooth base suffix, and anything
/// else is passed through upper-cased.
pub fn full_uuid(uuid: &str) -> String {
    match uuid.len() {
        4 => format!("0000{}-0000-1000-8000-00805F9B34FB", uuid.to_uppercase()),
        8 => format!("{}-0000-1000-8000-00805F9B34FB", uuid.to_uppercase()),
        _ => uuid.to_uppercase(),
    }
}

/// Parses a UUID string in 16-bit, 32-bit, or 128-bit form.
pub fn parse_uuid(uuid: &str) -> Option<Uuid> {
    Uuid::parse_str(&full_uuid(uuid)).ok()
}

/// Mounting location of a sensor, from the Sensor Location characteristic.
///
/// The characteristic value is a single byte; codes outside the assigned
/// range are reported as [`SensorLocation::Unknown`] rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorLocation {
    Other,
    TopOfShoe,
    InShoe,
    Hip,
    FrontWheel,
    LeftCrank,
    RightCrank,
    LeftPedal,
    RightPedal,
    FrontHub,
    RearDropout,
    Chainstay,
    RearWheel,
    RearHub,
    Chest,
    Spider,
    ChainRing,
    /// Code outside the assigned 0..=16 range.
    Unknown(u8),
}

impl SensorLocation {
    /// Maps a Sensor Location characteristic byte to a named location.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => SensorLocation::Other,
            1 => SensorLocation::TopOfShoe,
            2 => SensorLocation::InShoe,
            3 => SensorLocation::Hip,
            4 => SensorLocation::FrontWheel,
            5 => SensorLocation::LeftCrank,
            6 => SensorLocation::RightCrank,
            7 => SensorLocation::LeftPedal,
            8 => SensorLocation::RightPedal,
            9 => SensorLocation::FrontHub,
            10 => SensorLocation::RearDropout,
            11 => SensorLocation::Chainstay,
            12 => SensorLocation::RearWheel,
            13 => SensorLocation::RearHub,
            14 => SensorLocation::Chest,
            15 => SensorLocation::Spider,
            16 => SensorLocation::ChainRing,
            other => SensorLocation::Unknown(other),
        }
    }
}

impl std::fmt::Display for SensorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorLocation::Other => write!(f, "Other"),
            SensorLocation::TopOfShoe => write!(f, "Top of Shoe"),
            SensorLocation::InShoe => write!(f, "In Shoe"),
            SensorLocation::Hip => write!(f, "Hip"),
            SensorLocation::FrontWheel => write!(f, "Front Wheel"),
            SensorLocation::LeftCrank => write!(f, "Left Crank"),
            SensorLocation::RightCrank => write!(f, "Right Crank"),
            SensorLocation::LeftPedal => write!(f, "Left Pedal"),
            SensorLocation::RightPedal => write!(f, "Right Pedal"),
            SensorLocation::FrontHub => write!(f, "Front Hub"),
            SensorLocation::RearDropout => write!(f, "Rear Dropout"),
            SensorLocation::Chainstay => write!(f, "Chainstay"),
            SensorLocation::RearWheel => write!(f, "Rear Wheel"),
            SensorLocation::RearHub => write!(f, "Rear Hub"),
            SensorLocation::Chest => write!(f, "Chest"),
            SensorLocation::Spider => write!(f, "Spider"),
            SensorLocation::ChainRing => write!(f, "Chain Ring"),
            SensorLocation::Unknown(code) => write!(f, "Unknown ({})", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_uuid_short_form() {
        assert_eq!(full_uuid("180d"), "0000180D-0000-1000-8000-00805F9B34FB");
        assert_eq!(full_uuid("2a63"), "00002A63-0000-1000-8000-00805F9B34FB");
    }

    #[test]
    fn test_full_uuid_32bit_form() {
        assert_eq!(
            full_uuid("0000180d"),
            "0000180D-0000-1000-8000-00805F9B34FB"
        );
    }

    #[test]
    fn test_full_uuid_passthrough() {
        assert_eq!(
            full_uuid("0000180d-0000-1000-8000-00805f9b34fb"),
            "0000180D-0000-1000-8000-00805F9B34FB"
        );
    }

    #[test]
    fn test_parse_uuid_matches_constants() {
        assert_eq!(parse_uuid("180d"), Some(HEART_RATE_SERVICE_UUID));
        assert_eq!(parse_uuid("1818"), Some(CYCLING_POWER_SERVICE_UUID));
        assert_eq!(parse_uuid("1816"), Some(CSC_SERVICE_UUID));
        assert_eq!(parse_uuid("2a5d"), Some(SENSOR_LOCATION_UUID));
    }

    #[test]
    fn test_service_id_uuid_roundtrip() {
        for service in [
            ServiceId::Battery,
            ServiceId::HeartRate,
            ServiceId::CyclingPower,
            ServiceId::CyclingSpeedAndCadence,
            ServiceId::RunningSpeedAndCadence,
            ServiceId::SensorLocation,
            ServiceId::DeviceInformation,
        ] {
            let expected = parse_uuid(&format!("{:04x}", service.short_uuid()));
            assert_eq!(expected, Some(service.uuid()));
        }
    }

    #[test]
    fn test_sensor_location_named_codes() {
        assert_eq!(SensorLocation::from_code(0), SensorLocation::Other);
        assert_eq!(SensorLocation::from_code(5), SensorLocation::LeftCrank);
        assert_eq!(SensorLocation::from_code(16), SensorLocation::ChainRing);
    }

    #[test]
    fn test_sensor_location_unknown_code() {
        assert_eq!(SensorLocation::from_code(17), SensorLocation::Unknown(17));
        assert_eq!(SensorLocation::from_code(0xFF), SensorLocation::Unknown(0xFF));
    }
}
