//! Measurement engine.
//!
//! Executes one [`RunPlan`] against a [`DaqBackend`] as a linear sequence of suspending
//! remote calls. The engine publishes its state on a `watch` channel so the session (or
//! any UI) can follow progress without polling.
//!
//! # Failure handling
//!
//! Any failed step aborts the remaining steps and enters cleanup: a best-effort ADC stop
//! (its errors are expected when nothing is acquiring and are only logged at `debug`) and
//! a disable of every enabled relay (logged at `warn` on failure). The original error is
//! returned wrapped in [`DaqError::Step`]; cleanup failures never replace it.
//!
//! A run future dropped before it finishes (a caller-side timeout, a losing `select!`
//! branch) runs the same cleanup on a spawned task. The engine stays busy until that
//! task has released the relays, then returns to `Idle`.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = MeasurementEngine::new(backend.clone(), StopHandle::new());
//! let stop = engine.stop_handle();
//! let outcome = engine.run(plan).await?;
//! println!("{} samples via {:?}", outcome.capture.samples, outcome.trigger);
//! ```

use super::run::{MeasurementOutcome, RunPlan, WorkflowRun};
use super::state::{CompletionTrigger, StepOutput, WorkflowState};
use crate::api::{AdcCapture, DaqBackend};
use crate::error::{AppResult, DaqError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, info_span, warn, Instrument};

/// Why an acquisition window was closed early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator pressed stop.
    Manual,
    /// The backend no longer reports an acquisition.
    BackendIdle,
}

/// Cloneable handle that closes the acquisition window of the active run.
///
/// The handle is armed only while the engine waits in `Acquiring`. The first signal
/// consumes the underlying one-shot sender, so the completion routine is entered once
/// no matter how many stop requests race with the timer.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    slot: Arc<Mutex<Option<oneshot::Sender<StopReason>>>>,
}

impl StopHandle {
    /// Unarmed handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a manual stop. Returns `false` when no acquisition is waiting.
    pub fn request_stop(&self) -> bool {
        self.signal(StopReason::Manual)
    }

    /// Abort the waiting acquisition because the backend went idle.
    pub fn abort_acquisition(&self) -> bool {
        self.signal(StopReason::BackendIdle)
    }

    /// Whether an acquisition is waiting for a stop signal.
    pub fn is_armed(&self) -> bool {
        self.lock().is_some()
    }

    fn signal(&self, reason: StopReason) -> bool {
        let sender = self.lock().take();
        match sender {
            Some(tx) => tx.send(reason).is_ok(),
            None => false,
        }
    }

    pub(crate) fn arm(&self) -> oneshot::Receiver<StopReason> {
        let (tx, rx) = oneshot::channel();
        *self.lock() = Some(tx);
        rx
    }

    pub(crate) fn disarm(&self) {
        self.lock().take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<oneshot::Sender<StopReason>>> {
        // Poisoning only means a signaller panicked; the slot itself is still valid.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Best-effort release of the hardware: stop the ADC, then every enabled relay.
async fn release<B: DaqBackend + ?Sized>(backend: &B) {
    if let Err(e) = backend.stop_adc().await {
        debug!(error = %e, "ADC stop during cleanup failed (ignored)");
    }
    if let Err(e) = backend.disable_enabled_relays().await {
        warn!(error = %e, "Relay cleanup failed; relays may still be enabled");
    }
}

/// Releases the hardware if the run future is dropped before it finishes.
struct AbandonGuard<B: DaqBackend + ?Sized + 'static> {
    backend: Arc<B>,
    stop: StopHandle,
    state_tx: Arc<watch::Sender<WorkflowState>>,
    armed: bool,
}

impl<B: DaqBackend + ?Sized + 'static> AbandonGuard<B> {
    fn defuse(mut self) {
        self.armed = false;
    }
}

impl<B: DaqBackend + ?Sized + 'static> Drop for AbandonGuard<B> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.stop.disarm();
        let state = *self.state_tx.borrow();
        warn!(state = %state, "Measurement abandoned; releasing relays");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let backend = self.backend.clone();
                let state_tx = self.state_tx.clone();
                handle.spawn(async move {
                    release(backend.as_ref()).await;
                    state_tx.send_replace(WorkflowState::Idle);
                });
            }
            Err(_) => {
                warn!("No runtime left for cleanup; relays may still be enabled");
                self.state_tx.send_replace(WorkflowState::Idle);
            }
        }
    }
}

/// Sequences one measurement run against a backend.
pub struct MeasurementEngine<B: DaqBackend + ?Sized> {
    backend: Arc<B>,
    stop: StopHandle,
    state_tx: Arc<watch::Sender<WorkflowState>>,
}

impl<B: DaqBackend + ?Sized + 'static> MeasurementEngine<B> {
    /// Create an engine with its own state channel.
    pub fn new(backend: Arc<B>, stop: StopHandle) -> Self {
        let (state_tx, _) = watch::channel(WorkflowState::Idle);
        Self {
            backend,
            stop,
            state_tx: Arc::new(state_tx),
        }
    }

    /// Publish state on an existing channel (shared with a session).
    pub fn with_state_channel(mut self, state_tx: Arc<watch::Sender<WorkflowState>>) -> Self {
        self.state_tx = state_tx;
        self
    }

    /// Current state.
    pub fn state(&self) -> WorkflowState {
        *self.state_tx.borrow()
    }

    /// Follow state changes.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.state_tx.subscribe()
    }

    /// Handle that stops the acquisition of this engine's runs.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Execute a plan from `Preparing` through `Completing`.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::WorkflowBusy`] if the engine is not idle, otherwise
    /// [`DaqError::Step`] naming the state that failed. The engine is back in
    /// `Idle` whenever this returns.
    pub async fn run(&self, plan: RunPlan) -> AppResult<MeasurementOutcome> {
        if !self.state().can_begin() {
            return Err(DaqError::WorkflowBusy);
        }

        let run = WorkflowRun::new(plan);
        let span = info_span!(
            "measurement",
            run_id = %run.run_id,
            circuit = %run.plan.circuit
        );
        self.execute(run).instrument(span).await
    }

    async fn execute(&self, mut run: WorkflowRun) -> AppResult<MeasurementOutcome> {
        let guard = AbandonGuard {
            backend: self.backend.clone(),
            stop: self.stop.clone(),
            state_tx: self.state_tx.clone(),
            armed: true,
        };
        let result = self.steps(&mut run).await;
        guard.defuse();
        result.map(|capture| {
            let outcome = run.finish(capture);
            info!(
                samples = outcome.capture.samples,
                trigger = ?outcome.trigger,
                "Measurement completed"
            );
            outcome
        })
    }

    /// Run every step; on failure clean up before returning. Ends in `Idle` either way.
    async fn steps(&self, run: &mut WorkflowRun) -> AppResult<AdcCapture> {
        info!(
            relays = ?run.plan.relays,
            samples = run.plan.settings.sample_count,
            sample_rate = run.plan.settings.sample_rate,
            duration_secs = run.plan.settings.duration_secs,
            "Measurement started"
        );

        let mut state = WorkflowState::Idle.next();
        loop {
            self.set_state(state);
            match self.step(state, run).await {
                Ok(StepOutput::Completed(capture)) => {
                    self.set_state(WorkflowState::Idle);
                    return Ok(capture);
                }
                Ok(output) => {
                    match output {
                        StepOutput::Discharged(requests) => run.discharged = requests,
                        StepOutput::Connected(relays) => run.connected = relays,
                        StepOutput::Acquired(trigger) => run.trigger = Some(trigger),
                        _ => {}
                    }
                    state = state.next();
                }
                Err(err) => {
                    warn!(state = %state, error = %err, "Measurement step failed");
                    self.cleanup().await;
                    self.set_state(WorkflowState::Idle);
                    return Err(err.in_state(state));
                }
            }
        }
    }

    async fn step(&self, state: WorkflowState, run: &WorkflowRun) -> AppResult<StepOutput> {
        let plan = &run.plan;
        match state {
            WorkflowState::Preparing => {
                // Issued twice; each call must succeed.
                self.backend.disable_enabled_relays().await?;
                self.backend.disable_enabled_relays().await?;
                Ok(StepOutput::Prepared)
            }
            WorkflowState::Discharging => {
                // Sequential: all capacitors share one discharge bus.
                for request in &plan.discharges {
                    debug!(
                        capacitor = %request.capacitor,
                        resistor = %request.discharge_resistor,
                        "Discharging"
                    );
                    self.backend.discharge_capacitor(request).await?;
                }
                Ok(StepOutput::Discharged(plan.discharges.clone()))
            }
            WorkflowState::Connecting => {
                self.backend.set_relays(&plan.relay_states()).await?;
                Ok(StepOutput::Connected(plan.relays.clone()))
            }
            WorkflowState::Powering => {
                self.backend.set_relay(&plan.power, true).await?;
                Ok(StepOutput::Powered)
            }
            WorkflowState::Acquiring => self.acquire(plan).await.map(StepOutput::Acquired),
            WorkflowState::Completing => {
                let capture = self.backend.stop_adc().await?;
                self.backend.set_relay(&plan.power, false).await?;
                self.backend.disable_enabled_relays().await?;
                Ok(StepOutput::Completed(capture))
            }
            WorkflowState::Idle => Err(DaqError::Configuration(
                "idle is not an executable workflow step".to_string(),
            )),
        }
    }

    async fn acquire(&self, plan: &RunPlan) -> AppResult<CompletionTrigger> {
        self.backend.start_adc(&plan.start_request()).await?;

        let mut stop_rx = self.stop.arm();
        let window = tokio::time::sleep(plan.settings.duration());
        tokio::pin!(window);

        let outcome = tokio::select! {
            _ = &mut window => Ok(CompletionTrigger::Timer),
            reason = &mut stop_rx => match reason {
                Ok(StopReason::Manual) => Ok(CompletionTrigger::ManualStop),
                Ok(StopReason::BackendIdle) => Err(DaqError::AcquisitionLost),
                // Handle re-armed elsewhere; fall back to the timer.
                Err(_) => {
                    window.await;
                    Ok(CompletionTrigger::Timer)
                }
            },
        };
        self.stop.disarm();

        if let Ok(trigger) = &outcome {
            info!(trigger = ?trigger, "Acquisition window closed");
        }
        outcome
    }

    async fn cleanup(&self) {
        self.stop.disarm();
        release(self.backend.as_ref()).await;
    }

    fn set_state(&self, state: WorkflowState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Workflow state changed");
        }
    }
}
