//! Frame decoders for GATT fitness measurement characteristics.
//!
//! Three independent codecs turn raw notification bytes into typed records:
//! Cycling Power Measurement (0x2A63), CSC Measurement (0x2A5B), and Heart
//! Rate Measurement (0x2A37). Field presence and widths are gated by the
//! leading flags value exactly as the published GATT specifications define
//! them; all multi-byte integers are little-endian. Every read is preceded
//! by a remaining-length check, so a short buffer yields
//! [`DecodeError::TruncatedFrame`] instead of a panic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while decoding a measurement frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer is shorter than the fields its own flags declare.
    #[error("frame truncated: {needed} byte(s) needed at offset {offset}, {available} available")]
    TruncatedFrame {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Bounds-checked little-endian reader over a measurement frame.
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        if self.remaining() < N {
            return Err(DecodeError::TruncatedFrame {
                offset: self.offset,
                needed: N,
                available: self.remaining(),
            });
        }
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.data[self.offset..self.offset + N]);
        self.offset += N;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16_le(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take::<2>()?))
    }

    fn i16_le(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_le_bytes(self.take::<2>()?))
    }

    fn u32_le(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take::<4>()?))
    }
}

// Cycling Power Measurement flag bits (Cycling Power Service 1.1).
const CP_PEDAL_POWER_BALANCE: u16 = 1 << 0;
const CP_ACCUMULATED_TORQUE: u16 = 1 << 2;
const CP_WHEEL_REV_DATA: u16 = 1 << 4;
const CP_CRANK_REV_DATA: u16 = 1 << 5;
const CP_EXTREME_FORCE: u16 = 1 << 6;
const CP_EXTREME_TORQUE: u16 = 1 << 7;
const CP_EXTREME_ANGLES: u16 = 1 << 8;
const CP_TOP_DEAD_SPOT: u16 = 1 << 9;
const CP_BOTTOM_DEAD_SPOT: u16 = 1 << 10;
const CP_ACCUMULATED_ENERGY: u16 = 1 << 11;

/// Decoded Cycling Power Measurement record.
///
/// Fields whose flag bit is clear are `None`, never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CyclingPowerMeasurement {
    /// Instantaneous power in watts.
    pub instantaneous_power: i16,
    /// Pedal power balance in half-percent units.
    pub pedal_power_balance: Option<u8>,
    /// Accumulated torque in 1/32 Nm units.
    pub accumulated_torque: Option<u16>,
    /// Cumulative wheel revolutions (32-bit rolling counter).
    pub cumulative_wheel_revs: Option<u32>,
    /// Wheel event time in 1/1024 s units (16-bit rolling counter).
    pub last_wheel_event_time: Option<u16>,
    /// Cumulative crank revolutions (16-bit rolling counter).
    pub cumulative_crank_revs: Option<u16>,
    /// Crank event time in 1/1024 s units (16-bit rolling counter).
    pub last_crank_event_time: Option<u16>,
    /// Maximum force magnitude in newtons.
    pub maximum_force_magnitude: Option<i16>,
    /// Minimum force magnitude in newtons.
    pub minimum_force_magnitude: Option<i16>,
    /// Maximum torque magnitude in 1/32 Nm units.
    pub maximum_torque_magnitude: Option<i16>,
    /// Minimum torque magnitude in 1/32 Nm units.
    pub minimum_torque_magnitude: Option<i16>,
    /// Maximum crank angle in degrees (12-bit value).
    pub maximum_angle: Option<u16>,
    /// Minimum crank angle in degrees (12-bit value).
    pub minimum_angle: Option<u16>,
    /// Top dead spot angle in degrees.
    pub top_dead_spot_angle: Option<i16>,
    /// Bottom dead spot angle in degrees.
    pub bottom_dead_spot_angle: Option<i16>,
    /// Accumulated energy in kilojoules.
    pub accumulated_energy: Option<u16>,
}

impl CyclingPowerMeasurement {
    /// Decodes a Cycling Power Measurement notification.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = Cursor::new(data);
        let flags = cursor.u16_le()?;

        let mut measurement = CyclingPowerMeasurement {
            instantaneous_power: cursor.i16_le()?,
            ..Default::default()
        };

        if flags & CP_PEDAL_POWER_BALANCE != 0 {
            measurement.pedal_power_balance = Some(cursor.u8()?);
        }
        if flags & CP_ACCUMULATED_TORQUE != 0 {
            measurement.accumulated_torque = Some(cursor.u16_le()?);
        }
        if flags & CP_WHEEL_REV_DATA != 0 {
            measurement.cumulative_wheel_revs = Some(cursor.u32_le()?);
            measurement.last_wheel_event_time = Some(cursor.u16_le()?);
        }
        if flags & CP_CRANK_REV_DATA != 0 {
            measurement.cumulative_crank_revs = Some(cursor.u16_le()?);
            measurement.last_crank_event_time = Some(cursor.u16_le()?);
        }
        if flags & CP_EXTREME_FORCE != 0 {
            measurement.maximum_force_magnitude = Some(cursor.i16_le()?);
            measurement.minimum_force_magnitude = Some(cursor.i16_le()?);
        }
        if flags & CP_EXTREME_TORQUE != 0 {
            measurement.maximum_torque_magnitude = Some(cursor.i16_le()?);
            measurement.minimum_torque_magnitude = Some(cursor.i16_le()?);
        }
        if flags & CP_EXTREME_ANGLES != 0 {
            // Two 12-bit unsigned angles packed into 3 bytes: maximum in
            // the low 12 bits, minimum in the high 12 bits.
            let packed = cursor.take::<3>()?;
            let max = u16::from(packed[0]) | (u16::from(packed[1] & 0x0F) << 8);
            let min = (u16::from(packed[1]) >> 4) | (u16::from(packed[2]) << 4);
            measurement.maximum_angle = Some(max);
            measurement.minimum_angle = Some(min);
        }
        if flags & CP_TOP_DEAD_SPOT != 0 {
            measurement.top_dead_spot_angle = Some(cursor.i16_le()?);
        }
        if flags & CP_BOTTOM_DEAD_SPOT != 0 {
            measurement.bottom_dead_spot_angle = Some(cursor.i16_le()?);
        }
        if flags & CP_ACCUMULATED_ENERGY != 0 {
            measurement.accumulated_energy = Some(cursor.u16_le()?);
        }

        Ok(measurement)
    }
}

// CSC Measurement flag bits.
const CSC_WHEEL_REV_DATA: u8 = 1 << 0;
const CSC_CRANK_REV_DATA: u8 = 1 << 1;

/// Decoded CSC Measurement record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CscMeasurement {
    /// Cumulative wheel revolutions (32-bit rolling counter).
    pub cumulative_wheel_revs: Option<u32>,
    /// Wheel event time in 1/1024 s units (16-bit rolling counter).
    pub last_wheel_event_time: Option<u16>,
    /// Cumulative crank revolutions (16-bit rolling counter).
    pub cumulative_crank_revs: Option<u16>,
    /// Crank event time in 1/1024 s units (16-bit rolling counter).
    pub last_crank_event_time: Option<u16>,
}

impl CscMeasurement {
    /// Decodes a CSC Measurement notification.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = Cursor::new(data);
        let flags = cursor.u8()?;

        let mut measurement = CscMeasurement::default();

        if flags & CSC_WHEEL_REV_DATA != 0 {
            measurement.cumulative_wheel_revs = Some(cursor.u32_le()?);
            measurement.last_wheel_event_time = Some(cursor.u16_le()?);
        }
        if flags & CSC_CRANK_REV_DATA != 0 {
            measurement.cumulative_crank_revs = Some(cursor.u16_le()?);
            measurement.last_crank_event_time = Some(cursor.u16_le()?);
        }

        Ok(measurement)
    }
}

// Heart Rate Measurement flag bits.
const HR_FORMAT_U16: u8 = 1 << 0;
const HR_CONTACT_DETECTED: u8 = 1 << 1;
const HR_CONTACT_SUPPORTED: u8 = 1 << 2;
const HR_ENERGY_EXPENDED: u8 = 1 << 3;
const HR_RR_INTERVALS: u8 = 1 << 4;

/// Decoded Heart Rate Measurement record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartRateMeasurement {
    /// Heart rate in beats per minute.
    pub bpm: u16,
    /// True only when contact sensing is supported and skin contact is
    /// detected. The "supported but not detected" case reads as false.
    pub sensor_contact_detected: bool,
    /// Energy expended in kilojoules.
    pub energy_expended: Option<u16>,
    /// R-R intervals in seconds, in wire order. Empty when the frame
    /// carried none.
    pub rr_intervals: Vec<f32>,
}

impl HeartRateMeasurement {
    /// Decodes a Heart Rate Measurement notification.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = Cursor::new(data);
        let flags = cursor.u8()?;

        let bpm = if flags & HR_FORMAT_U16 != 0 {
            cursor.u16_le()?
        } else {
            u16::from(cursor.u8()?)
        };

        let sensor_contact_detected =
            flags & HR_CONTACT_SUPPORTED != 0 && flags & HR_CONTACT_DETECTED != 0;

        let energy_expended = if flags & HR_ENERGY_EXPENDED != 0 {
            Some(cursor.u16_le()?)
        } else {
            None
        };

        let mut rr_intervals = Vec::new();
        if flags & HR_RR_INTERVALS != 0 {
            // R-R values fill the rest of the frame, 1/1024 s per unit.
            while cursor.remaining() >= 2 {
                rr_intervals.push(f32::from(cursor.u16_le()?) / 1024.0);
            }
        }

        Ok(HeartRateMeasurement {
            bpm,
            sensor_contact_detected,
            energy_expended,
            rr_intervals,
        })
    }
}

// Cycling Power Vector flag bits.
const PV_CRANK_REV_DATA: u8 = 1 << 0;
const PV_FIRST_CRANK_ANGLE: u8 = 1 << 1;
const PV_INSTANT_FORCE_ARRAY: u8 = 1 << 2;
const PV_INSTANT_TORQUE_ARRAY: u8 = 1 << 3;
const PV_DIRECTION_SHIFT: u8 = 4;
const PV_DIRECTION_MASK: u8 = 0b11;

/// Reference direction of the instantaneous magnitude arrays in a
/// Cycling Power Vector frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementDirection {
    #[default]
    Unknown,
    TangentialComponent,
    RadialComponent,
    LateralComponent,
}

impl MeasurementDirection {
    fn from_bits(bits: u8) -> Self {
        match bits {
            1 => MeasurementDirection::TangentialComponent,
            2 => MeasurementDirection::RadialComponent,
            3 => MeasurementDirection::LateralComponent,
            _ => MeasurementDirection::Unknown,
        }
    }
}

/// Decoded Cycling Power Vector record (characteristic 0x2A64).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CyclingPowerVector {
    /// Direction the magnitude arrays are measured against.
    pub direction: MeasurementDirection,
    /// Cumulative crank revolutions (16-bit rolling counter).
    pub cumulative_crank_revs: Option<u16>,
    /// Crank event time in 1/1024 s units (16-bit rolling counter).
    pub last_crank_event_time: Option<u16>,
    /// Crank angle of the first array element, in degrees.
    pub first_crank_angle: Option<u16>,
    /// Instantaneous force magnitudes in newtons, one per crank position.
    pub instantaneous_forces: Vec<i16>,
    /// Instantaneous torque magnitudes in 1/32 Nm units.
    pub instantaneous_torques: Vec<i16>,
}

impl CyclingPowerVector {
    /// Decodes a Cycling Power Vector notification.
    ///
    /// A frame carries at most one magnitude array; the force flag takes
    /// precedence when both bits are set. Trailing values fill the array
    /// until fewer than 2 bytes remain.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = Cursor::new(data);
        let flags = cursor.u8()?;

        let mut vector = CyclingPowerVector {
            direction: MeasurementDirection::from_bits(
                (flags >> PV_DIRECTION_SHIFT) & PV_DIRECTION_MASK,
            ),
            ..Default::default()
        };

        if flags & PV_CRANK_REV_DATA != 0 {
            vector.cumulative_crank_revs = Some(cursor.u16_le()?);
            vector.last_crank_event_time = Some(cursor.u16_le()?);
        }
        if flags & PV_FIRST_CRANK_ANGLE != 0 {
            vector.first_crank_angle = Some(cursor.u16_le()?);
        }

        let array = if flags & PV_INSTANT_FORCE_ARRAY != 0 {
            Some(&mut vector.instantaneous_forces)
        } else if flags & PV_INSTANT_TORQUE_ARRAY != 0 {
            Some(&mut vector.instantaneous_torques)
        } else {
            None
        };
        if let Some(array) = array {
            while cursor.remaining() >= 2 {
                array.push(cursor.i16_le()?);
            }
        }

        Ok(vector)
    }
}
