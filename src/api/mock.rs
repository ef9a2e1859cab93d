//! Mock Control Service
//!
//! Provides an in-memory [`DaqBackend`] for testing without the control service or
//! hardware. All state uses async-safe locks (tokio::sync::RwLock) and optional latency
//! uses tokio::time::sleep, so the mock suspends like a real remote call.
//!
//! # Behaviour
//!
//! - Every call is recorded in order (see [`MockBackend::calls`]).
//! - Relay state is tracked, so tests can assert what ended up energised.
//! - `GET /api/relays` lists every relay of the board's relay table, on or off.
//! - `start-read-adc` while running and `stop-read-adc` while idle answer HTTP 409,
//!   as the real service does.
//! - Any endpoint can be made to fail with a chosen status code.

use super::{AdcCapture, AdcStatus, ChannelData, DaqBackend, DevicesResponse, DeviceInfo, DischargeRequest, StartAdcRequest};
use crate::error::{AppResult, DaqError};
use crate::relay_map::{RelayId, RelayTable};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;

/// Endpoint of the control service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `/api/relays/disable-enabled`
    DisableEnabledRelays,
    /// `/api/relays/disable-all`
    DisableAllRelays,
    /// `/api/discharge-capacitor`
    DischargeCapacitor,
    /// `/api/relays/multiple`
    SetRelays,
    /// `/api/relay/{relay}/{state}`
    SetRelay,
    /// `/api/start-read-adc`
    StartAdc,
    /// `/api/stop-read-adc`
    StopAdc,
    /// `/api/adc-status`
    AdcStatus,
    /// `/api/devices`
    Devices,
    /// `/api/relays`
    Relays,
    /// `/api/charge-capacitor`
    ChargeCapacitor,
    /// `/api/read-daq`
    ReadDaq,
}

impl Endpoint {
    /// Path of the endpoint, as reported in errors.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::DisableEnabledRelays => "/api/relays/disable-enabled",
            Endpoint::DisableAllRelays => "/api/relays/disable-all",
            Endpoint::DischargeCapacitor => "/api/discharge-capacitor",
            Endpoint::SetRelays => "/api/relays/multiple",
            Endpoint::SetRelay => "/api/relay",
            Endpoint::StartAdc => "/api/start-read-adc",
            Endpoint::StopAdc => "/api/stop-read-adc",
            Endpoint::AdcStatus => "/api/adc-status",
            Endpoint::Devices => "/api/devices",
            Endpoint::Relays => "/api/relays",
            Endpoint::ChargeCapacitor => "/api/charge-capacitor",
            Endpoint::ReadDaq => "/api/read-daq",
        }
    }
}

/// A call received by the mock, with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    /// Disable every enabled relay.
    DisableEnabledRelays,
    /// Disable every relay.
    DisableAllRelays,
    /// Discharge one capacitor.
    DischargeCapacitor(DischargeRequest),
    /// Batched relay update.
    SetRelays(BTreeMap<RelayId, bool>),
    /// Single relay update.
    SetRelay(RelayId, bool),
    /// Start acquisition.
    StartAdc(StartAdcRequest),
    /// Stop acquisition.
    StopAdc,
    /// Status query.
    AdcStatus,
    /// Device listing.
    Devices,
    /// Relay listing.
    Relays,
    /// Fixed charge sequence.
    ChargeCapacitor,
    /// One-shot read.
    ReadDaq {
        /// Samples per channel.
        samples: u32,
        /// Rate in Hz.
        sample_rate: u32,
    },
}

impl BackendCall {
    /// Endpoint the call went to.
    pub fn endpoint(&self) -> Endpoint {
        match self {
            BackendCall::DisableEnabledRelays => Endpoint::DisableEnabledRelays,
            BackendCall::DisableAllRelays => Endpoint::DisableAllRelays,
            BackendCall::DischargeCapacitor(_) => Endpoint::DischargeCapacitor,
            BackendCall::SetRelays(_) => Endpoint::SetRelays,
            BackendCall::SetRelay(..) => Endpoint::SetRelay,
            BackendCall::StartAdc(_) => Endpoint::StartAdc,
            BackendCall::StopAdc => Endpoint::StopAdc,
            BackendCall::AdcStatus => Endpoint::AdcStatus,
            BackendCall::Devices => Endpoint::Devices,
            BackendCall::Relays => Endpoint::Relays,
            BackendCall::ChargeCapacitor => Endpoint::ChargeCapacitor,
            BackendCall::ReadDaq { .. } => Endpoint::ReadDaq,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct InjectedFailure {
    status: u16,
    /// Calls that still succeed before the failure kicks in.
    after: usize,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<BackendCall>,
    failures: HashMap<Endpoint, InjectedFailure>,
    enabled: BTreeSet<RelayId>,
    acquisition: Option<StartAdcRequest>,
}

/// In-memory control service.
///
/// # Example
///
/// ```rust,ignore
/// let backend = MockBackend::new();
/// backend.fail_on(Endpoint::SetRelays, 500).await;
/// assert!(backend.set_relays(&states).await.is_err());
/// ```
#[derive(Debug)]
pub struct MockBackend {
    state: RwLock<MockState>,
    latency: Duration,
    available: Vec<RelayId>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Mock that answers immediately.
    pub fn new() -> Self {
        Self::with_relays(&RelayTable::default())
    }

    /// Mock for a board wired as `table`.
    pub fn with_relays(table: &RelayTable) -> Self {
        Self {
            state: RwLock::new(MockState::default()),
            latency: Duration::ZERO,
            available: table.all_relays().into_iter().cloned().collect(),
        }
    }

    /// Mock that suspends for `latency` on every call.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::new()
        }
    }

    /// Make every call to `endpoint` fail with `status`.
    pub async fn fail_on(&self, endpoint: Endpoint, status: u16) {
        self.fail_after(endpoint, 0, status).await;
    }

    /// Let `successes` calls to `endpoint` through, then fail every later one.
    pub async fn fail_after(&self, endpoint: Endpoint, successes: usize, status: u16) {
        self.state.write().await.failures.insert(
            endpoint,
            InjectedFailure {
                status,
                after: successes,
            },
        );
    }

    /// Stop failing `endpoint`.
    pub async fn clear_failure(&self, endpoint: Endpoint) {
        self.state.write().await.failures.remove(&endpoint);
    }

    /// Calls received so far, in order.
    pub async fn calls(&self) -> Vec<BackendCall> {
        self.state.read().await.calls.clone()
    }

    /// Endpoints called so far, in order.
    pub async fn endpoints(&self) -> Vec<Endpoint> {
        self.state
            .read()
            .await
            .calls
            .iter()
            .map(BackendCall::endpoint)
            .collect()
    }

    /// Number of calls made to `endpoint`.
    pub async fn count(&self, endpoint: Endpoint) -> usize {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|call| call.endpoint() == endpoint)
            .count()
    }

    /// Relays currently energised.
    pub async fn enabled_relays(&self) -> BTreeSet<RelayId> {
        self.state.read().await.enabled.clone()
    }

    /// Whether an acquisition is in progress.
    pub async fn is_acquiring(&self) -> bool {
        self.state.read().await.acquisition.is_some()
    }

    /// Force the acquisition flag, e.g. to simulate the service stopping on its own.
    pub async fn set_acquiring(&self, running: Option<StartAdcRequest>) {
        self.state.write().await.acquisition = running;
    }

    /// Record a call and return the injected failure for its endpoint, if any.
    async fn record(&self, call: BackendCall) -> AppResult<()> {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        let endpoint = call.endpoint();
        let mut state = self.state.write().await;
        let previous = state.calls.iter().filter(|c| c.endpoint() == endpoint).count();
        state.calls.push(call);
        match state.failures.get(&endpoint) {
            Some(failure) if previous >= failure.after => Err(DaqError::RemoteStatus {
                endpoint: endpoint.path().to_string(),
                status: failure.status,
                detail: "injected failure".into(),
            }),
            _ => Ok(()),
        }
    }
}

fn conflict(endpoint: Endpoint, detail: &str) -> DaqError {
    DaqError::RemoteStatus {
        endpoint: endpoint.path().to_string(),
        status: 409,
        detail: detail.to_string(),
    }
}

/// Deterministic capture: an RC charging curve on adc1, its complement on adc2.
fn synthetic_capture(request: &StartAdcRequest) -> AdcCapture {
    let samples = request.samples as usize;
    let rate = f64::from(request.sample_rate.max(1));
    let tau = (request.measurement_time / 5.0).max(f64::EPSILON);
    let charge: Vec<f64> = (0..samples)
        .map(|i| 1.0 - (-(i as f64 / rate) / tau).exp())
        .collect();
    let discharge = charge.iter().map(|v| 1.0 - v).collect();

    AdcCapture {
        samples,
        channels: 4,
        sample_rate: Some(f64::from(request.sample_rate)),
        data: ChannelData {
            adc1: charge,
            adc2: discharge,
            adc3: vec![0.0; samples],
            adc4: vec![0.0; samples],
        },
        timestamp: Some(chrono::Utc::now().to_rfc3339()),
    }
}

#[async_trait]
impl DaqBackend for MockBackend {
    async fn disable_enabled_relays(&self) -> AppResult<()> {
        self.record(BackendCall::DisableEnabledRelays).await?;
        self.state.write().await.enabled.clear();
        Ok(())
    }

    async fn discharge_capacitor(&self, request: &DischargeRequest) -> AppResult<()> {
        self.record(BackendCall::DischargeCapacitor(request.clone()))
            .await
    }

    async fn set_relays(&self, states: &BTreeMap<RelayId, bool>) -> AppResult<()> {
        self.record(BackendCall::SetRelays(states.clone())).await?;
        let mut state = self.state.write().await;
        for (relay, on) in states {
            if *on {
                state.enabled.insert(relay.clone());
            } else {
                state.enabled.remove(relay);
            }
        }
        Ok(())
    }

    async fn set_relay(&self, relay: &RelayId, on: bool) -> AppResult<()> {
        self.record(BackendCall::SetRelay(relay.clone(), on)).await?;
        let mut state = self.state.write().await;
        if on {
            state.enabled.insert(relay.clone());
        } else {
            state.enabled.remove(relay);
        }
        Ok(())
    }

    async fn start_adc(&self, request: &StartAdcRequest) -> AppResult<()> {
        self.record(BackendCall::StartAdc(*request)).await?;
        let mut state = self.state.write().await;
        if state.acquisition.is_some() {
            return Err(conflict(
                Endpoint::StartAdc,
                "ADC acquisition is already running",
            ));
        }
        state.acquisition = Some(*request);
        Ok(())
    }

    async fn stop_adc(&self) -> AppResult<AdcCapture> {
        self.record(BackendCall::StopAdc).await?;
        let request = self
            .state
            .write()
            .await
            .acquisition
            .take()
            .ok_or_else(|| conflict(Endpoint::StopAdc, "No ADC acquisition is currently running"))?;
        Ok(synthetic_capture(&request))
    }

    async fn adc_status(&self) -> AppResult<AdcStatus> {
        self.record(BackendCall::AdcStatus).await?;
        Ok(AdcStatus {
            is_running: self.is_acquiring().await,
            configuration: None,
        })
    }

    async fn disable_all_relays(&self) -> AppResult<()> {
        self.record(BackendCall::DisableAllRelays).await?;
        self.state.write().await.enabled.clear();
        Ok(())
    }

    async fn devices(&self) -> AppResult<DevicesResponse> {
        self.record(BackendCall::Devices).await?;
        Ok(DevicesResponse {
            driver_version: "mock".into(),
            devices: vec![DeviceInfo {
                name: "cDAQ1".into(),
                product_category: "CompactDAQ Chassis".into(),
                product_type: "Simulated cDAQ-9189".into(),
            }],
        })
    }

    async fn relays(&self) -> AppResult<Vec<RelayId>> {
        self.record(BackendCall::Relays).await?;
        Ok(self.available.clone())
    }

    async fn charge_capacitor(&self) -> AppResult<()> {
        self.record(BackendCall::ChargeCapacitor).await
    }

    async fn read_daq(&self, samples: u32, sample_rate: u32) -> AppResult<AdcCapture> {
        self.record(BackendCall::ReadDaq {
            samples,
            sample_rate,
        })
        .await?;
        let request = StartAdcRequest {
            samples,
            sample_rate,
            measurement_time: f64::from(samples) / f64::from(sample_rate.max(1)),
        };
        Ok(synthetic_capture(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracks_relay_state() {
        let backend = MockBackend::new();
        let mut states = BTreeMap::new();
        states.insert(RelayId::from("zk1_5"), true);
        states.insert(RelayId::from("zk2_1"), true);
        backend.set_relays(&states).await.unwrap();
        backend.set_relay(&RelayId::from("zs1_1"), true).await.unwrap();
        assert_eq!(backend.enabled_relays().await.len(), 3);

        backend.disable_enabled_relays().await.unwrap();
        assert!(backend.enabled_relays().await.is_empty());
        assert_eq!(backend.calls().await.len(), 3);
    }

    #[tokio::test]
    async fn stop_without_start_conflicts() {
        let backend = MockBackend::new();
        let err = backend.stop_adc().await.unwrap_err();
        assert_eq!(err.remote_status(), Some(409));
    }

    #[tokio::test]
    async fn capture_has_requested_length() {
        let backend = MockBackend::new();
        let request = StartAdcRequest {
            samples: 1000,
            sample_rate: 200,
            measurement_time: 5.0,
        };
        backend.start_adc(&request).await.unwrap();
        assert!(backend.adc_status().await.unwrap().is_running);

        let capture = backend.stop_adc().await.unwrap();
        assert_eq!(capture.samples, 1000);
        assert_eq!(capture.data.adc1.len(), 1000);
        assert!(!backend.is_acquiring().await);
    }

    #[tokio::test]
    async fn injected_failure_is_recorded() {
        let backend = MockBackend::new();
        backend.fail_on(Endpoint::SetRelays, 500).await;

        let err = backend.set_relays(&BTreeMap::new()).await.unwrap_err();
        assert_eq!(err.remote_status(), Some(500));
        assert_eq!(backend.endpoints().await, vec![Endpoint::SetRelays]);
    }

    #[tokio::test]
    async fn relay_listing_covers_the_whole_board() {
        let backend = MockBackend::new();
        let relays = backend.relays().await.unwrap();
        assert_eq!(relays.len(), 21);
        assert!(relays.contains(&RelayId::from("zs1_1")));
        assert!(relays.contains(&RelayId::from("zk4_8")));
        assert!(backend.enabled_relays().await.is_empty());

        let mut states = BTreeMap::new();
        states.insert(RelayId::from("zk1_5"), true);
        backend.set_relays(&states).await.unwrap();
        assert_eq!(backend.relays().await.unwrap(), relays);
    }

    #[tokio::test]
    async fn failure_after_successes() {
        let backend = MockBackend::new();
        backend.fail_after(Endpoint::SetRelay, 1, 503).await;

        let relay = RelayId::from("zs1_1");
        backend.set_relay(&relay, true).await.unwrap();
        let err = backend.set_relay(&relay, false).await.unwrap_err();
        assert_eq!(err.remote_status(), Some(503));
        assert!(backend.enabled_relays().await.contains(&relay));
    }
}
