//! Request and response bodies of the relay/ADC control API.

use crate::measurement::MeasurementSettings;
use crate::relay_map::RelayId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `POST /api/discharge-capacitor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DischargeRequest {
    /// Capacitor slot to discharge, e.g. `cs3`.
    pub capacitor: String,
    /// Resistor the charge is routed through, e.g. `rz2`.
    pub discharge_resistor: String,
    /// Discharge time in seconds.
    pub duration: f64,
}

/// Body of `POST /api/relays/multiple`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStatesRequest {
    /// Desired state per relay.
    pub relay_states: BTreeMap<RelayId, bool>,
}

/// Query of `POST /api/start-read-adc`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartAdcRequest {
    /// Samples per channel.
    pub samples: u32,
    /// Sampling rate in Hz.
    pub sample_rate: u32,
    /// Expected measurement duration in seconds.
    pub measurement_time: f64,
}

impl From<&MeasurementSettings> for StartAdcRequest {
    fn from(settings: &MeasurementSettings) -> Self {
        Self {
            samples: settings.sample_count,
            sample_rate: settings.sample_rate,
            measurement_time: settings.duration_secs,
        }
    }
}

impl StartAdcRequest {
    /// Query pairs in the order the backend documents them.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("samples", self.samples.to_string()),
            ("sample_rate", self.sample_rate.to_string()),
            ("measurement_time", self.measurement_time.to_string()),
        ]
    }
}

/// Per-channel voltage arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    /// Channel ai0.
    pub adc1: Vec<f64>,
    /// Channel ai1.
    pub adc2: Vec<f64>,
    /// Channel ai2.
    pub adc3: Vec<f64>,
    /// Channel ai3.
    pub adc4: Vec<f64>,
}

impl ChannelData {
    /// Channels with their names, in channel order.
    pub fn channels(&self) -> [(&'static str, &[f64]); 4] {
        [
            ("adc1", self.adc1.as_slice()),
            ("adc2", self.adc2.as_slice()),
            ("adc3", self.adc3.as_slice()),
            ("adc4", self.adc4.as_slice()),
        ]
    }

    /// Length of the longest channel.
    pub fn max_len(&self) -> usize {
        self.channels()
            .iter()
            .map(|(_, values)| values.len())
            .max()
            .unwrap_or(0)
    }
}

/// Data returned by `stop-read-adc` and `read-daq`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdcCapture {
    /// Samples per channel actually captured.
    pub samples: usize,
    /// Number of channels.
    pub channels: usize,
    /// Sampling rate reported by the backend.
    #[serde(default)]
    pub sample_rate: Option<f64>,
    /// Captured voltages.
    pub data: ChannelData,
    /// Backend timestamp (ISO 8601).
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Body of `GET /api/adc-status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdcStatus {
    /// Whether an acquisition is in progress.
    pub is_running: bool,
    /// Active task configuration, if any.
    #[serde(default)]
    pub configuration: Option<serde_json::Value>,
}

/// One DAQ chassis or module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name, e.g. `cDAQ1Mod1`.
    pub name: String,
    /// Product category.
    pub product_category: String,
    /// Product type.
    pub product_type: String,
}

/// Body of `GET /api/devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicesResponse {
    /// Driver version string.
    pub driver_version: String,
    /// Connected devices.
    pub devices: Vec<DeviceInfo>,
}

/// Body of `GET /api/relays`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaysListResponse {
    /// Relay names the backend knows.
    pub relays: Vec<RelayId>,
}

/// Error body produced by the backend.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub detail: serde_json::Value,
}

/// Best human-readable message from an error response body.
pub(crate) fn error_detail(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}
