//! Operator session.
//!
//! [`Dashboard`] owns everything the operator manipulates between measurements: the
//! selected circuit, the component selection and the sampling settings. It derives the
//! start/stop control state, launches measurements through the [`MeasurementEngine`] and
//! resynchronises with the backend.
//!
//! ## Concurrency
//!
//! Selection changes take `&mut self`; measurement, stop and resync take `&self`. While
//! a measurement future is alive the selection therefore cannot change, and a second
//! `start_measurement` is rejected with [`DaqError::WorkflowBusy`] by an atomic
//! single-flight flag that is reset on every exit path. Dropping the measurement
//! future hands cleanup to a background task; starts are refused until it is done.
//!
//! ## Persistence
//!
//! - **`save_session`**: serializes a [`SessionSnapshot`] into a JSON file.
//! - **`load_session`**: deserializes a snapshot from a JSON file.
//! - **`Dashboard::snapshot` / `Dashboard::restore`**: move state in and out of a session.

use crate::api::DaqBackend;
use crate::circuit::{CircuitType, ComponentSelection, Slot};
use crate::config::DashboardConfig;
use crate::error::{AppResult, DaqError};
use crate::measurement::MeasurementSettings;
use crate::validation::{self, ValidationReport};
use crate::workflow::{MeasurementEngine, MeasurementOutcome, RunPlan, StopHandle, WorkflowState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Clears the running flag when dropped.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Result of comparing local run state with the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    /// Backend reports an acquisition in progress.
    pub backend_running: bool,
    /// Local workflow state at the time of the check.
    pub local_state: WorkflowState,
    /// Local state was forced back to idle.
    pub corrected: bool,
}

/// Selection state and measurement control for one operator.
pub struct Dashboard<B: DaqBackend + ?Sized> {
    config: DashboardConfig,
    backend: Arc<B>,
    circuit: Option<CircuitType>,
    components: ComponentSelection,
    settings: MeasurementSettings,
    running: AtomicBool,
    stop: StopHandle,
    state_tx: Arc<watch::Sender<WorkflowState>>,
}

impl<B: DaqBackend + ?Sized + 'static> Dashboard<B> {
    /// New session with no circuit selected and the configured default settings.
    pub fn new(config: DashboardConfig, backend: Arc<B>) -> Self {
        let (state_tx, _) = watch::channel(WorkflowState::Idle);
        Self {
            settings: config.measurement,
            config,
            backend,
            circuit: None,
            components: ComponentSelection::new(),
            running: AtomicBool::new(false),
            stop: StopHandle::new(),
            state_tx: Arc::new(state_tx),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Backend the session drives.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Selected circuit, if any.
    pub fn circuit(&self) -> Option<CircuitType> {
        self.circuit
    }

    /// Current component selection.
    pub fn components(&self) -> &ComponentSelection {
        &self.components
    }

    /// Current sampling settings.
    pub fn settings(&self) -> &MeasurementSettings {
        &self.settings
    }

    /// Select a circuit.
    ///
    /// Selecting the already selected circuit deselects it. Either way the component
    /// selection is reset; sampling settings are kept. Returns the new selection.
    pub fn select_circuit(&mut self, circuit: CircuitType) -> Option<CircuitType> {
        self.circuit = if self.circuit == Some(circuit) {
            None
        } else {
            Some(circuit)
        };
        self.components.clear();
        info!(circuit = ?self.circuit, "Circuit selection changed");
        self.circuit
    }

    /// Set or clear one component slot. Blank identifiers clear the slot.
    pub fn set_component(&mut self, slot: Slot, identifier: Option<String>) {
        self.components.set(slot, identifier);
    }

    /// Replace the whole component selection.
    pub fn set_components(&mut self, components: ComponentSelection) {
        self.components = components;
    }

    /// Replace the sampling settings.
    pub fn set_settings(&mut self, settings: MeasurementSettings) {
        self.settings = settings;
    }

    /// Validate the current selection.
    ///
    /// # Errors
    ///
    /// [`DaqError::NoCircuitSelected`] when there is nothing to validate against.
    pub fn validation(&self) -> AppResult<ValidationReport> {
        let circuit = self.circuit.ok_or(DaqError::NoCircuitSelected)?;
        Ok(validation::validate(
            circuit,
            &self.components,
            &self.settings,
            &self.config.bounds,
        ))
    }

    /// Whether a measurement is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the start control is enabled.
    ///
    /// Stays disabled after an abandoned run until its cleanup has released the relays.
    pub fn start_enabled(&self) -> bool {
        let busy = self.is_running() || !self.workflow_state().can_begin();
        self.validation()
            .map(|report| validation::start_enabled(&report, busy))
            .unwrap_or(false)
    }

    /// Whether the stop control is enabled: only while an acquisition is waiting.
    pub fn stop_enabled(&self) -> bool {
        self.workflow_state() == WorkflowState::Acquiring && self.stop.is_armed()
    }

    /// Handle for stopping the active acquisition from elsewhere (signal handler, UI).
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request a manual stop. Returns `false` when nothing is acquiring.
    pub fn request_stop(&self) -> bool {
        self.stop.request_stop()
    }

    /// Current workflow state.
    pub fn workflow_state(&self) -> WorkflowState {
        *self.state_tx.borrow()
    }

    /// Follow workflow state changes.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.state_tx.subscribe()
    }

    /// Run a measurement with the current selection.
    ///
    /// # Errors
    ///
    /// - [`DaqError::WorkflowBusy`] while another measurement is running
    /// - [`DaqError::NoCircuitSelected`] or [`DaqError::Validation`] for invalid input
    /// - [`DaqError::Step`] when a remote call failed (cleanup has already run)
    pub async fn start_measurement(&self) -> AppResult<MeasurementOutcome> {
        let _guard = RunGuard::acquire(&self.running).ok_or(DaqError::WorkflowBusy)?;

        let circuit = self.circuit.ok_or(DaqError::NoCircuitSelected)?;
        let report = self.validation()?;
        if !report.is_valid() {
            return Err(DaqError::Validation(report));
        }
        for warning in &report.warnings {
            warn!(%warning, "Buffer size below recommendation");
        }

        let plan = RunPlan::build(
            circuit,
            &self.components,
            self.settings,
            &self.config.relays,
            &self.config.discharge,
        );
        let engine = MeasurementEngine::new(self.backend.clone(), self.stop.clone())
            .with_state_channel(self.state_tx.clone());
        engine.run(plan).await
    }

    /// Compare local run state with the backend's acquisition status.
    ///
    /// When the backend reports no acquisition while the local run is waiting in
    /// `Acquiring`, the run is aborted: it cleans up and returns to `Idle`, and the
    /// pending `start_measurement` fails with [`DaqError::AcquisitionLost`].
    pub async fn resync(&self) -> AppResult<ResyncReport> {
        let status = self.backend.adc_status().await?;
        let local_state = self.workflow_state();

        let drifted = local_state == WorkflowState::Acquiring && !status.is_running;
        let corrected = drifted && self.stop.abort_acquisition();
        if corrected {
            warn!("Backend reports no active acquisition; returning to idle");
        }

        Ok(ResyncReport {
            backend_running: status.is_running,
            local_state,
            corrected,
        })
    }

    /// Capture the current selection.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            circuit: self.circuit,
            components: self.components.clone(),
            settings: self.settings,
            saved_at: Utc::now(),
        }
    }

    /// Apply a saved selection.
    pub fn restore(&mut self, snapshot: SessionSnapshot) {
        self.circuit = snapshot.circuit;
        self.components = snapshot.components;
        self.settings = snapshot.settings;
        info!(circuit = ?self.circuit, saved_at = %snapshot.saved_at, "Session restored");
    }
}

/// Saved operator selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Selected circuit
    pub circuit: Option<CircuitType>,
    /// Component selection
    #[serde(default)]
    pub components: ComponentSelection,
    /// Sampling settings
    #[serde(default)]
    pub settings: MeasurementSettings,
    /// Save time
    pub saved_at: DateTime<Utc>,
}

/// Saves a session to a file.
pub fn save_session(session: &SessionSnapshot, path: &Path) -> AppResult<()> {
    let json = serde_json::to_string_pretty(session)?;
    fs::write(path, json)?;
    Ok(())
}

/// Loads a session from a file.
pub fn load_session(path: &Path) -> AppResult<SessionSnapshot> {
    let json = fs::read_to_string(path)?;
    let session = serde_json::from_str(&json)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockBackend;
    use tempfile::tempdir;

    fn dashboard() -> Dashboard<MockBackend> {
        Dashboard::new(DashboardConfig::default(), Arc::new(MockBackend::new()))
    }

    #[test]
    fn reselecting_circuit_deselects_and_clears_components() {
        let mut dash = dashboard();
        assert_eq!(dash.select_circuit(CircuitType::Rl), Some(CircuitType::Rl));
        dash.set_component(Slot::Inductor, Some("ls1".into()));

        assert_eq!(dash.select_circuit(CircuitType::Rl), None);
        assert!(dash.components().is_empty());
        assert!(!dash.start_enabled());
    }

    #[test]
    fn switching_circuit_keeps_settings() {
        let mut dash = dashboard();
        let settings = MeasurementSettings::new(2000, 400, 2.0);
        dash.select_circuit(CircuitType::Rc);
        dash.set_settings(settings);
        dash.set_component(Slot::Capacitor, Some("cs2".into()));

        dash.select_circuit(CircuitType::Rlc);
        assert_eq!(*dash.settings(), settings);
        assert!(dash.components().is_empty());
    }

    #[test]
    fn start_enabled_tracks_validation() {
        let mut dash = dashboard();
        dash.select_circuit(CircuitType::Rc);
        assert!(!dash.start_enabled());

        dash.set_component(Slot::Capacitor, Some("cs2".into()));
        dash.set_component(Slot::Resistor, Some("r1s2".into()));
        assert!(dash.start_enabled());
        assert!(!dash.stop_enabled());
    }

    #[tokio::test]
    async fn invalid_selection_never_reaches_backend() {
        let mut dash = dashboard();
        assert!(matches!(
            dash.start_measurement().await,
            Err(DaqError::NoCircuitSelected)
        ));

        dash.select_circuit(CircuitType::Rlc);
        let err = dash.start_measurement().await.unwrap_err();
        match err {
            DaqError::Validation(report) => assert_eq!(report.missing_slots().len(), 3),
            other => panic!("unexpected error: {other}"),
        }
        assert!(dash.backend().calls().await.is_empty());
        assert!(!dash.is_running());
    }

    #[test]
    fn test_save_and_load_session() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("session.json");

        let mut dash = dashboard();
        dash.select_circuit(CircuitType::Rl);
        dash.set_component(Slot::Inductor, Some("ls4".into()));
        dash.set_component(Slot::Resistor, Some("r2s1".into()));
        let saved = dash.snapshot();
        save_session(&saved, &file_path).unwrap();

        let loaded = load_session(&file_path).unwrap();
        assert_eq!(loaded, saved);

        let mut other = dashboard();
        other.restore(loaded);
        assert_eq!(other.circuit(), Some(CircuitType::Rl));
        assert_eq!(other.components().get(Slot::Inductor), Some("ls4"));
    }
}
