//! Derived metrics from rolling revolution counters.
//!
//! Cycling sensors report cumulative revolution counts paired with a
//! 16-bit event time in 1/1024 s units. Cadence and wheel speed fall out
//! of the deltas between consecutive samples; both counters and the event
//! time are fixed-width and roll over, so all subtraction is modular.

use serde::{Deserialize, Serialize};

use crate::decode::{CscMeasurement, CyclingPowerMeasurement};

/// Resolution of the event-time fields, ticks per second.
const EVENT_TIME_HZ: f64 = 1024.0;

/// Which revolution stream a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Wheel revolutions, 32-bit counter.
    Wheel,
    /// Crank revolutions, 16-bit counter.
    Crank,
}

impl StreamKind {
    /// Width of the cumulative revolution counter for this stream.
    pub fn counter_bits(&self) -> u32 {
        match self {
            StreamKind::Wheel => 32,
            StreamKind::Crank => 16,
        }
    }
}

/// One revolution-counter sample from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevolutionSample {
    /// Cumulative revolution count (16- or 32-bit, widened to u32).
    pub revolutions: u32,
    /// Event time in 1/1024 s units.
    pub event_time: u16,
}

/// Revolutions per minute between two samples of a rolling counter.
///
/// `counter_bits` is the width of the revolution counter (16 for crank,
/// 32 for wheel); the event time always wraps at 16 bits. Returns `None`
/// when no time has elapsed between the samples.
pub fn rpm(prev: RevolutionSample, current: RevolutionSample, counter_bits: u32) -> Option<f64> {
    let mask = if counter_bits >= 32 {
        u32::MAX
    } else {
        (1u32 << counter_bits) - 1
    };
    let delta_revs = current.revolutions.wrapping_sub(prev.revolutions) & mask;
    let delta_ticks = current.event_time.wrapping_sub(prev.event_time);
    if delta_ticks == 0 {
        return None;
    }
    let delta_seconds = f64::from(delta_ticks) / EVENT_TIME_HZ;
    Some(f64::from(delta_revs) / delta_seconds * 60.0)
}

/// Previous-sample state for one sensor's wheel and crank streams.
///
/// Each session owns exactly one tracker, so rollover state never leaks
/// between concurrently connected sensors.
#[derive(Debug, Default)]
pub struct RevolutionTracker {
    wheel: Option<RevolutionSample>,
    crank: Option<RevolutionSample>,
}

impl RevolutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sample and returns the rpm derived against the previous
    /// sample of the same stream.
    ///
    /// The sample is stored unconditionally, even when the result is
    /// `None`, so the next call always has a baseline.
    pub fn update(&mut self, kind: StreamKind, sample: RevolutionSample) -> Option<f64> {
        let slot = match kind {
            StreamKind::Wheel => &mut self.wheel,
            StreamKind::Crank => &mut self.crank,
        };
        let derived = slot.and_then(|prev| rpm(prev, sample, kind.counter_bits()));
        *slot = Some(sample);
        derived
    }

    /// Derives wheel and crank rpm from a CSC measurement, updating the
    /// per-stream state for every pair the frame carried.
    pub fn csc_reading(&mut self, measurement: CscMeasurement) -> CscReading {
        let wheel_rpm = match (
            measurement.cumulative_wheel_revs,
            measurement.last_wheel_event_time,
        ) {
            (Some(revolutions), Some(event_time)) => self.update(
                StreamKind::Wheel,
                RevolutionSample {
                    revolutions,
                    event_time,
                },
            ),
            _ => None,
        };
        let cadence_rpm = match (
            measurement.cumulative_crank_revs,
            measurement.last_crank_event_time,
        ) {
            (Some(revolutions), Some(event_time)) => self.update(
                StreamKind::Crank,
                RevolutionSample {
                    revolutions: u32::from(revolutions),
                    event_time,
                },
            ),
            _ => None,
        };
        CscReading {
            measurement,
            cadence_rpm,
            wheel_rpm,
        }
    }

    /// Derives wheel and crank rpm from the revolution pairs of a power
    /// measurement, when the frame carried them.
    pub fn power_reading(&mut self, measurement: CyclingPowerMeasurement) -> PowerReading {
        let wheel_rpm = match (
            measurement.cumulative_wheel_revs,
            measurement.last_wheel_event_time,
        ) {
            (Some(revolutions), Some(event_time)) => self.update(
                StreamKind::Wheel,
                RevolutionSample {
                    revolutions,
                    event_time,
                },
            ),
            _ => None,
        };
        let cadence_rpm = match (
            measurement.cumulative_crank_revs,
            measurement.last_crank_event_time,
        ) {
            (Some(revolutions), Some(event_time)) => self.update(
                StreamKind::Crank,
                RevolutionSample {
                    revolutions: u32::from(revolutions),
                    event_time,
                },
            ),
            _ => None,
        };
        PowerReading {
            measurement,
            cadence_rpm,
            wheel_rpm,
        }
    }
}

/// A CSC measurement augmented with derived metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct CscReading {
    /// Wire-format measurement.
    pub measurement: CscMeasurement,
    /// Crank cadence in rpm, absent until two crank samples have arrived.
    pub cadence_rpm: Option<f64>,
    /// Wheel speed in rpm, absent until two wheel samples have arrived.
    pub wheel_rpm: Option<f64>,
}

/// A power measurement augmented with derived metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerReading {
    /// Wire-format measurement.
    pub measurement: CyclingPowerMeasurement,
    /// Crank cadence in rpm, absent until two crank samples have arrived.
    pub cadence_rpm: Option<f64>,
    /// Wheel speed in rpm, absent until two wheel samples have arrived.
    pub wheel_rpm: Option<f64>,
}
