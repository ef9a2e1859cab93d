//! Workflow states and per-step results.

use crate::api::{AdcCapture, DischargeRequest};
use crate::relay_map::RelayId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Measurement workflow state.
///
/// # State Machine
///
/// ```text
/// Idle ─start─> Preparing ─> Discharging ─> Connecting ─> Powering ─> Acquiring ─> Completing ─> Idle
///                   │             │              │            │           │            │
///                   └─────────────┴─────────── error ─────────┴───────────┴────────────┴──> cleanup ─> Idle
/// ```
///
/// Every step either advances along the success path or fails into cleanup,
/// which always ends in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// No run active
    #[default]
    Idle,
    /// Double disable of every enabled relay
    Preparing,
    /// Sequential capacitor discharge
    Discharging,
    /// Batched enable of the circuit's relay set
    Connecting,
    /// Master power relay on
    Powering,
    /// ADC acquiring, waiting for timer or manual stop
    Acquiring,
    /// ADC stop, power off, relays off
    Completing,
}

impl WorkflowState {
    /// Active states in execution order.
    pub const STEPS: [WorkflowState; 6] = [
        WorkflowState::Preparing,
        WorkflowState::Discharging,
        WorkflowState::Connecting,
        WorkflowState::Powering,
        WorkflowState::Acquiring,
        WorkflowState::Completing,
    ];

    /// Next state on the success path.
    pub fn next(self) -> WorkflowState {
        match self {
            WorkflowState::Idle => WorkflowState::Preparing,
            WorkflowState::Preparing => WorkflowState::Discharging,
            WorkflowState::Discharging => WorkflowState::Connecting,
            WorkflowState::Connecting => WorkflowState::Powering,
            WorkflowState::Powering => WorkflowState::Acquiring,
            WorkflowState::Acquiring => WorkflowState::Completing,
            WorkflowState::Completing => WorkflowState::Idle,
        }
    }

    /// Check if the state allows starting a new run.
    pub fn can_begin(self) -> bool {
        self == WorkflowState::Idle
    }

    /// Check if a run is in progress.
    pub fn is_active(self) -> bool {
        self != WorkflowState::Idle
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Preparing => "preparing relays",
            WorkflowState::Discharging => "discharging capacitors",
            WorkflowState::Connecting => "connecting relays",
            WorkflowState::Powering => "powering circuit",
            WorkflowState::Acquiring => "acquiring",
            WorkflowState::Completing => "completing",
        };
        f.write_str(label)
    }
}

/// What ended the acquisition window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionTrigger {
    /// The measurement duration elapsed.
    Timer,
    /// The operator requested a stop.
    ManualStop,
}

/// Result of one successful workflow step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    /// Relays cleared.
    Prepared,
    /// Discharge commands issued, in order.
    Discharged(Vec<DischargeRequest>),
    /// Relays enabled.
    Connected(BTreeSet<RelayId>),
    /// Power relay on.
    Powered,
    /// Acquisition window closed.
    Acquired(CompletionTrigger),
    /// Capture retrieved and circuit torn down.
    Completed(AdcCapture),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_path_visits_every_step_once() {
        let mut visited = Vec::new();
        let mut state = WorkflowState::Idle.next();
        while state.is_active() {
            visited.push(state);
            state = state.next();
        }
        assert_eq!(visited, WorkflowState::STEPS);
        assert_eq!(state, WorkflowState::Idle);
    }

    #[test]
    fn only_idle_can_begin() {
        assert!(WorkflowState::Idle.can_begin());
        assert!(WorkflowState::STEPS.iter().all(|s| !s.can_begin()));
    }
}
