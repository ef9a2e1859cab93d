//! Relay and ADC control API.
//!
//! The console never talks to hardware directly. Every relay switch, capacitor discharge
//! and acquisition goes through the remote control service, modelled here as the
//! [`DaqBackend`] trait:
//!
//! - [`HttpBackend`] speaks HTTP/JSON to the real service.
//! - [`mock::MockBackend`] records calls in memory for tests and dry runs.
//!
//! # Design Philosophy
//!
//! Each method:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Treats any non-2xx response as a failure (`DaqError::RemoteStatus`)
//! - Performs exactly one remote call, so retries stay the caller's decision
//!
//! Endpoints used only by peripheral tooling have default implementations that return
//! `DaqError::Unsupported`, so minimal backends only implement the workflow set.

pub mod http;
pub mod mock;
pub mod types;

pub use http::HttpBackend;
pub use types::{
    AdcCapture, AdcStatus, ChannelData, DeviceInfo, DevicesResponse, DischargeRequest,
    StartAdcRequest,
};

use crate::error::{AppResult, DaqError};
use crate::relay_map::RelayId;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Remote relay/ADC control service.
#[async_trait]
pub trait DaqBackend: Send + Sync {
    /// `POST /api/relays/disable-enabled`: switch off every relay that is on.
    async fn disable_enabled_relays(&self) -> AppResult<()>;

    /// `POST /api/discharge-capacitor`.
    async fn discharge_capacitor(&self, request: &DischargeRequest) -> AppResult<()>;

    /// `POST /api/relays/multiple`. All-or-nothing on the far end.
    async fn set_relays(&self, states: &BTreeMap<RelayId, bool>) -> AppResult<()>;

    /// `POST /api/relay/{relay}/{state}`.
    async fn set_relay(&self, relay: &RelayId, state: bool) -> AppResult<()>;

    /// `POST /api/start-read-adc`.
    async fn start_adc(&self, request: &StartAdcRequest) -> AppResult<()>;

    /// `POST /api/stop-read-adc`: stop and fetch everything captured since start.
    async fn stop_adc(&self) -> AppResult<AdcCapture>;

    /// `GET /api/adc-status`.
    async fn adc_status(&self) -> AppResult<AdcStatus>;

    /// `POST /api/relays/disable-all`: drive every relay low, on or not.
    async fn disable_all_relays(&self) -> AppResult<()> {
        Err(DaqError::Unsupported("disable-all relays".into()))
    }

    /// `GET /api/devices`.
    async fn devices(&self) -> AppResult<DevicesResponse> {
        Err(DaqError::Unsupported("device listing".into()))
    }

    /// `GET /api/relays`.
    async fn relays(&self) -> AppResult<Vec<RelayId>> {
        Err(DaqError::Unsupported("relay listing".into()))
    }

    /// `POST /api/charge-capacitor`: fixed Cs1 charge sequence.
    async fn charge_capacitor(&self) -> AppResult<()> {
        Err(DaqError::Unsupported("capacitor charging".into()))
    }

    /// `POST /api/read-daq`: one-shot finite read.
    async fn read_daq(&self, samples: u32, sample_rate: u32) -> AppResult<AdcCapture> {
        let _ = (samples, sample_rate);
        Err(DaqError::Unsupported("one-shot DAQ read".into()))
    }
}
