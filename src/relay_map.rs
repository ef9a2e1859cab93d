//! Component-to-relay mapping table.
//!
//! The table is configuration data: it is deserialized from the `[relays]` section of the
//! dashboard configuration so a rewired board only needs a config edit. Lookups are pure
//! and never fail; an unknown identifier simply has no relay.

use crate::circuit::{resistor_family, CircuitType, ComponentSelection, Slot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Name of a physical relay on the backend (e.g. `zk1_5`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelayId(String);

impl RelayId {
    /// Wrap a relay name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Relay name as sent to the backend.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelayId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Relay engaged for each topology regardless of component choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitRelays {
    /// RL topology relay.
    pub rl: RelayId,
    /// RC topology relay.
    pub rc: RelayId,
    /// RLC topology relay.
    pub rlc: RelayId,
}

impl Default for CircuitRelays {
    fn default() -> Self {
        Self {
            rl: RelayId::new("zk4_1"),
            rc: RelayId::new("zk4_2"),
            rlc: RelayId::new("zk4_3"),
        }
    }
}

impl CircuitRelays {
    /// Relay for a topology.
    pub fn for_circuit(&self, circuit: CircuitType) -> &RelayId {
        match circuit {
            CircuitType::Rl => &self.rl,
            CircuitType::Rc => &self.rc,
            CircuitType::Rlc => &self.rlc,
        }
    }
}

/// Extra relay required when the resistor comes from a particular family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassRule {
    /// Switch for boards without a bypass line.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Resistor family prefix, e.g. `r2s`.
    pub resistor_family: String,
    /// Relay to add.
    pub relay: RelayId,
}

fn enabled_by_default() -> bool {
    true
}

fn default_power_relay() -> RelayId {
    RelayId::new("zs1_1")
}

/// Lookup table from components and topologies to relays.
///
/// A table read from a file stands on its own: components and the bypass rule are
/// only what the file lists. `power` and `circuits` fall back to the stock board
/// wiring when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayTable {
    /// Master power relay.
    #[serde(default = "default_power_relay")]
    pub power: RelayId,
    /// Topology relays.
    #[serde(default)]
    pub circuits: CircuitRelays,
    /// Optional resistor-family bypass.
    #[serde(default)]
    pub bypass: Option<BypassRule>,
    /// Component identifier -> relay.
    #[serde(default)]
    pub components: BTreeMap<String, RelayId>,
}

impl Default for RelayTable {
    fn default() -> Self {
        let mut components = BTreeMap::new();
        for n in 1..=4 {
            // ZK3: inductors, ZK2: capacitors, ZK1 lines 1-4: R2s family, lines 5-8: R1s family.
            components.insert(format!("ls{n}"), RelayId::new(format!("zk3_{n}")));
            components.insert(format!("cs{n}"), RelayId::new(format!("zk2_{n}")));
            components.insert(format!("r2s{n}"), RelayId::new(format!("zk1_{n}")));
            components.insert(format!("r1s{n}"), RelayId::new(format!("zk1_{}", n + 4)));
        }

        Self {
            power: default_power_relay(),
            circuits: CircuitRelays::default(),
            bypass: Some(BypassRule {
                enabled: true,
                resistor_family: "r2s".into(),
                relay: RelayId::new("zk4_8"),
            }),
            components,
        }
    }
}

impl RelayTable {
    /// Relay for a component identifier. Empty or unknown identifiers map to `None`.
    pub fn relay_for(&self, identifier: &str) -> Option<&RelayId> {
        let key = identifier.trim();
        if key.is_empty() {
            return None;
        }
        self.components
            .get(key)
            .or_else(|| self.components.get(&key.to_ascii_lowercase()))
    }

    /// Topology relay.
    pub fn circuit_relay(&self, circuit: CircuitType) -> &RelayId {
        self.circuits.for_circuit(circuit)
    }

    /// Bypass relay when the selected resistor belongs to the bypass family.
    pub fn bypass_relay(&self, selection: &ComponentSelection) -> Option<&RelayId> {
        let rule = self.bypass.as_ref().filter(|rule| rule.enabled)?;
        let family = resistor_family(selection.get(Slot::Resistor)?)?;
        (family == rule.resistor_family.to_ascii_lowercase()).then_some(&rule.relay)
    }

    /// Relays to enable for a run: topology relay, the relay of every populated
    /// slot the topology uses, and the bypass relay when it applies.
    ///
    /// Only the topology's own slots are connected: a component left in a slot the
    /// topology does not use (a capacitor under RL) is never switched in. The
    /// discharge resistor is routed by the discharge command, not by a relay.
    pub fn relay_set(&self, circuit: CircuitType, selection: &ComponentSelection) -> BTreeSet<RelayId> {
        let mut relays = BTreeSet::new();
        relays.insert(self.circuit_relay(circuit).clone());

        for slot in circuit.required_slots() {
            if let Some(relay) = selection.get(*slot).and_then(|id| self.relay_for(id)) {
                relays.insert(relay.clone());
            }
        }

        if let Some(bypass) = self.bypass_relay(selection) {
            relays.insert(bypass.clone());
        }
        relays
    }

    /// Every relay name the table refers to.
    pub fn all_relays(&self) -> BTreeSet<&RelayId> {
        let mut relays: BTreeSet<&RelayId> = self.components.values().collect();
        relays.insert(&self.power);
        relays.insert(&self.circuits.rl);
        relays.insert(&self.circuits.rc);
        relays.insert(&self.circuits.rlc);
        if let Some(rule) = self.bypass.as_ref().filter(|rule| rule.enabled) {
            relays.insert(&rule.relay);
        }
        relays
    }
}
