//! Measurement settings and the bounds policy they are checked against.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Headroom applied over the nominal sample count when sizing the ADC buffer.
pub const BUFFER_HEADROOM: f64 = 1.15;

/// Sampling parameters for one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementSettings {
    /// Samples per channel (ADC buffer size).
    pub sample_count: u32,
    /// Sampling rate in Hz. The backend only accepts whole rates.
    pub sample_rate: u32,
    /// Acquisition window in seconds.
    pub duration_secs: f64,
}

impl Default for MeasurementSettings {
    fn default() -> Self {
        Self {
            sample_count: 1000,
            sample_rate: 100,
            duration_secs: 5.0,
        }
    }
}

impl MeasurementSettings {
    /// Create settings from explicit values.
    pub fn new(sample_count: u32, sample_rate: u32, duration_secs: f64) -> Self {
        Self {
            sample_count,
            sample_rate,
            duration_secs,
        }
    }

    /// `floor(sample_rate * duration * 1.15)`; zero for non-finite or negative inputs.
    pub fn recommended_buffer_size(&self) -> u64 {
        let recommended = (f64::from(self.sample_rate) * self.duration_secs * BUFFER_HEADROOM).floor();
        if recommended.is_finite() && recommended > 0.0 {
            recommended as u64
        } else {
            0
        }
    }

    /// Non-blocking warning when the configured buffer is smaller than recommended.
    pub fn buffer_warning(&self) -> Option<BufferWarning> {
        let recommended = self.recommended_buffer_size();
        (recommended > u64::from(self.sample_count)).then_some(BufferWarning {
            configured: self.sample_count,
            recommended,
        })
    }

    /// Acquisition window as a `Duration`. Invalid values collapse to zero.
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_secs).unwrap_or(Duration::ZERO)
    }
}

/// Configured sample count is below the recommended buffer size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferWarning {
    /// Sample count the operator entered.
    pub configured: u32,
    /// `floor(rate * duration * 1.15)`.
    pub recommended: u64,
}

impl fmt::Display for BufferWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sample count {} is below the recommended buffer size {} (rate x duration + 15%); samples may be lost",
            self.configured, self.recommended
        )
    }
}

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound<T> {
    /// Smallest accepted value.
    pub min: T,
    /// Largest accepted value.
    pub max: T,
}

impl<T: PartialOrd + Copy> Bound<T> {
    /// Create a bound.
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    /// Whether `value` lies within `[min, max]`.
    pub fn contains(&self, value: T) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Whether the bound is well formed.
    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
}

impl<T: fmt::Display> fmt::Display for Bound<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Accepted ranges for measurement settings.
///
/// Defaults follow the limits the backend's `start-read-adc` endpoint enforces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementBounds {
    /// Samples per channel.
    pub samples: Bound<u32>,
    /// Sampling rate in Hz.
    pub sample_rate: Bound<u32>,
    /// Acquisition window in seconds.
    pub duration_secs: Bound<f64>,
}

impl Default for MeasurementBounds {
    fn default() -> Self {
        Self {
            samples: Bound::new(100, 500_000),
            sample_rate: Bound::new(1, 1_000_000),
            duration_secs: Bound::new(0.01, 10.0),
        }
    }
}
