//! Run plans and run records.
//!
//! A [`RunPlan`] is everything the engine needs to execute a measurement, computed up
//! front from the operator's selection so the engine itself only sequences remote calls.
//! A [`WorkflowRun`] tracks one execution of a plan and becomes a
//! [`MeasurementOutcome`] once the capture is in.

use super::state::CompletionTrigger;
use crate::api::{AdcCapture, DischargeRequest, StartAdcRequest};
use crate::circuit::{CircuitType, ComponentSelection, Slot};
use crate::config::DischargeConfig;
use crate::measurement::MeasurementSettings;
use crate::relay_map::{RelayId, RelayTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Fully resolved measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    /// Circuit topology
    pub circuit: CircuitType,
    /// Components as selected
    pub selection: ComponentSelection,
    /// Sampling parameters
    pub settings: MeasurementSettings,
    /// Relays enabled in one batch while connecting
    pub relays: BTreeSet<RelayId>,
    /// Master power relay
    pub power: RelayId,
    /// Discharge commands, issued in order
    pub discharges: Vec<DischargeRequest>,
}

impl RunPlan {
    /// Resolve a selection against the relay table and discharge routine.
    pub fn build(
        circuit: CircuitType,
        selection: &ComponentSelection,
        settings: MeasurementSettings,
        table: &RelayTable,
        discharge: &DischargeConfig,
    ) -> Self {
        Self {
            circuit,
            selection: selection.clone(),
            settings,
            relays: table.relay_set(circuit, selection),
            power: table.power.clone(),
            discharges: discharge_plan(selection, discharge),
        }
    }

    /// Body of the batched relay enable.
    pub fn relay_states(&self) -> BTreeMap<RelayId, bool> {
        self.relays.iter().map(|relay| (relay.clone(), true)).collect()
    }

    /// Query of the acquisition start.
    pub fn start_request(&self) -> StartAdcRequest {
        StartAdcRequest::from(&self.settings)
    }
}

/// Discharge command per configured capacitor slot.
///
/// The selected capacitor is routed through the selected discharge resistor, or the
/// default one when none is chosen. Every other capacitor uses the default.
pub fn discharge_plan(selection: &ComponentSelection, config: &DischargeConfig) -> Vec<DischargeRequest> {
    let selected = selection
        .get(Slot::Capacitor)
        .map(|id| id.trim().to_lowercase());
    let chosen_resistor = selection
        .get(Slot::DischargeResistor)
        .unwrap_or(config.default_resistor.as_str());

    config
        .capacitor_slots
        .iter()
        .map(|capacitor| {
            let is_selected = selected.as_deref() == Some(capacitor.trim().to_lowercase().as_str());
            let resistor = if is_selected {
                chosen_resistor
            } else {
                config.default_resistor.as_str()
            };
            DischargeRequest {
                capacitor: capacitor.clone(),
                discharge_resistor: resistor.to_string(),
                duration: config.duration_secs,
            }
        })
        .collect()
}

/// One execution of a plan.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    /// Unique run identifier
    pub run_id: Uuid,
    /// Plan being executed
    pub plan: RunPlan,
    /// Start request time
    pub started_at: DateTime<Utc>,
    /// Discharge commands that succeeded
    pub discharged: Vec<DischargeRequest>,
    /// Relays enabled
    pub connected: BTreeSet<RelayId>,
    /// What closed the acquisition window
    pub trigger: Option<CompletionTrigger>,
}

impl WorkflowRun {
    /// Start a new run of `plan`.
    pub fn new(plan: RunPlan) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            plan,
            started_at: Utc::now(),
            discharged: Vec::new(),
            connected: BTreeSet::new(),
            trigger: None,
        }
    }

    /// Close the run with its capture.
    pub fn finish(self, capture: AdcCapture) -> MeasurementOutcome {
        MeasurementOutcome {
            run_id: self.run_id,
            circuit: self.plan.circuit,
            selection: self.plan.selection,
            settings: self.plan.settings,
            relays: self.connected,
            trigger: self.trigger.unwrap_or(CompletionTrigger::Timer),
            started_at: self.started_at,
            finished_at: Utc::now(),
            capture,
        }
    }
}

/// Completed measurement, as handed to charting and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementOutcome {
    /// Run identifier
    pub run_id: Uuid,
    /// Circuit topology
    pub circuit: CircuitType,
    /// Components used
    pub selection: ComponentSelection,
    /// Sampling parameters
    pub settings: MeasurementSettings,
    /// Relays that were enabled
    pub relays: BTreeSet<RelayId>,
    /// What closed the acquisition window
    pub trigger: CompletionTrigger,
    /// Start request time
    pub started_at: DateTime<Utc>,
    /// Completion time
    pub finished_at: DateTime<Utc>,
    /// Captured samples
    pub capture: AdcCapture,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rlc_selection() -> ComponentSelection {
        ComponentSelection::new()
            .with(Slot::Inductor, "ls2")
            .with(Slot::Capacitor, "cs3")
            .with(Slot::Resistor, "r1s1")
            .with(Slot::DischargeResistor, "rz2")
    }

    #[test]
    fn selected_capacitor_uses_chosen_discharge_resistor() {
        let plan = discharge_plan(&rlc_selection(), &DischargeConfig::default());
        let routes: Vec<(&str, &str)> = plan
            .iter()
            .map(|d| (d.capacitor.as_str(), d.discharge_resistor.as_str()))
            .collect();
        assert_eq!(
            routes,
            vec![("cs1", "rz1"), ("cs2", "rz1"), ("cs3", "rz2"), ("cs4", "rz1")]
        );
        assert!(plan.iter().all(|d| d.duration == 0.5));
    }

    #[test]
    fn missing_discharge_resistor_falls_back_to_default() {
        let selection = ComponentSelection::new().with(Slot::Capacitor, "cs2");
        let plan = discharge_plan(&selection, &DischargeConfig::default());
        assert!(plan.iter().all(|d| d.discharge_resistor == "rz1"));
    }

    #[test]
    fn plan_resolves_relays_and_power() {
        let plan = RunPlan::build(
            CircuitType::Rlc,
            &rlc_selection(),
            MeasurementSettings::new(1000, 200, 5.0),
            &RelayTable::default(),
            &DischargeConfig::default(),
        );
        let relays: Vec<&str> = plan.relays.iter().map(RelayId::as_str).collect();
        assert_eq!(relays, vec!["zk1_5", "zk2_3", "zk3_2", "zk4_3"]);
        assert_eq!(plan.power.as_str(), "zs1_1");
        assert!(plan.relay_states().values().all(|on| *on));
        assert_eq!(plan.start_request().samples, 1000);
    }
}
