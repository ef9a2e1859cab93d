//! Circuit topologies and component selection.
//!
//! An operator picks one of three topologies and then fills the component slots the
//! topology needs from the discrete parts fitted to the test board. Components are named
//! by short codes whose prefix encodes their category:
//!
//! | Prefix      | Category           | Example |
//! |-------------|--------------------|---------|
//! | `ls`        | inductor           | `ls2`   |
//! | `cs`        | capacitor          | `cs3`   |
//! | `r<n>s`     | resistor, family n | `r1s3`  |
//! | `rz`        | discharge resistor | `rz2`   |

use crate::error::DaqError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Circuit topology under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitType {
    /// Resistor + inductor.
    Rl,
    /// Resistor + capacitor.
    Rc,
    /// Resistor + inductor + capacitor.
    Rlc,
}

impl CircuitType {
    /// All topologies, in display order.
    pub const ALL: [CircuitType; 3] = [CircuitType::Rl, CircuitType::Rc, CircuitType::Rlc];

    /// Slots that must be filled before a measurement can start.
    pub fn required_slots(self) -> &'static [Slot] {
        match self {
            CircuitType::Rl => &[Slot::Inductor, Slot::Resistor],
            CircuitType::Rc => &[Slot::Capacitor, Slot::Resistor],
            CircuitType::Rlc => &[Slot::Inductor, Slot::Capacitor, Slot::Resistor],
        }
    }

    /// Whether the topology contains a capacitor (and so offers a discharge resistor).
    pub fn has_capacitor(self) -> bool {
        matches!(self, CircuitType::Rc | CircuitType::Rlc)
    }

    /// Lowercase code used in file names and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitType::Rl => "rl",
            CircuitType::Rc => "rc",
            CircuitType::Rlc => "rlc",
        }
    }
}

impl fmt::Display for CircuitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitType {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rl" => Ok(CircuitType::Rl),
            "rc" => Ok(CircuitType::Rc),
            "rlc" => Ok(CircuitType::Rlc),
            _ => Err(DaqError::UnknownCircuit(s.to_string())),
        }
    }
}

/// A component position on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Series inductor.
    Inductor,
    /// Capacitor under test.
    Capacitor,
    /// Series resistor.
    Resistor,
    /// Resistor the capacitor is discharged through before a run.
    DischargeResistor,
}

impl Slot {
    /// Human-readable field name.
    pub fn label(self) -> &'static str {
        match self {
            Slot::Inductor => "Inductor",
            Slot::Capacitor => "Capacitor",
            Slot::Resistor => "Resistor",
            Slot::DischargeResistor => "Discharge resistor",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Category of a component, derived from its identifier prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentCategory {
    /// `ls*`
    Inductor,
    /// `cs*`
    Capacitor,
    /// `r<n>s*`; `family` is the prefix, e.g. `r1s`.
    Resistor {
        /// Family prefix such as `r1s`.
        family: String,
    },
    /// `rz*`
    DischargeResistor,
}

impl ComponentCategory {
    /// Classify an identifier. Unknown or malformed codes yield `None`.
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        let id = identifier.trim().to_ascii_lowercase();
        let numbered = |prefix: &str| {
            id.strip_prefix(prefix)
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        };

        if numbered("ls") {
            return Some(ComponentCategory::Inductor);
        }
        if numbered("cs") {
            return Some(ComponentCategory::Capacitor);
        }
        if numbered("rz") {
            return Some(ComponentCategory::DischargeResistor);
        }

        let bytes = id.as_bytes();
        if bytes.len() > 3 && bytes[0] == b'r' && bytes[1].is_ascii_digit() && bytes[2] == b's' {
            let family = &id[..3];
            if numbered(family) {
                return Some(ComponentCategory::Resistor {
                    family: family.to_string(),
                });
            }
        }
        None
    }

    /// Slot a component of this category belongs in.
    pub fn slot(&self) -> Slot {
        match self {
            ComponentCategory::Inductor => Slot::Inductor,
            ComponentCategory::Capacitor => Slot::Capacitor,
            ComponentCategory::Resistor { .. } => Slot::Resistor,
            ComponentCategory::DischargeResistor => Slot::DischargeResistor,
        }
    }
}

/// Resistor family of an identifier (`r1s3` -> `r1s`), if it is a resistor.
pub fn resistor_family(identifier: &str) -> Option<String> {
    match ComponentCategory::from_identifier(identifier)? {
        ComponentCategory::Resistor { family } => Some(family),
        _ => None,
    }
}

/// Chosen component per slot. Empty selections are stored as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentSelection {
    slots: BTreeMap<Slot, String>,
}

impl ComponentSelection {
    /// Empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`ComponentSelection::set`].
    pub fn with(mut self, slot: Slot, identifier: impl Into<String>) -> Self {
        self.set(slot, Some(identifier.into()));
        self
    }

    /// Set or clear a slot. Blank identifiers clear the slot.
    pub fn set(&mut self, slot: Slot, identifier: Option<String>) {
        match identifier.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() => {
                self.slots.insert(slot, id);
            }
            _ => {
                self.slots.remove(&slot);
            }
        }
    }

    /// Identifier in a slot.
    pub fn get(&self, slot: Slot) -> Option<&str> {
        self.slots.get(&slot).map(String::as_str)
    }

    /// Whether a slot holds a component.
    pub fn is_set(&self, slot: Slot) -> bool {
        self.slots.contains_key(&slot)
    }

    /// Remove every selection.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Populated slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &str)> {
        self.slots.iter().map(|(slot, id)| (*slot, id.as_str()))
    }

    /// True when no slot is populated.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_slots_per_circuit() {
        assert_eq!(
            CircuitType::Rl.required_slots(),
            &[Slot::Inductor, Slot::Resistor]
        );
        assert_eq!(
            CircuitType::Rc.required_slots(),
            &[Slot::Capacitor, Slot::Resistor]
        );
        assert_eq!(
            CircuitType::Rlc.required_slots(),
            &[Slot::Inductor, Slot::Capacitor, Slot::Resistor]
        );
    }

    #[test]
    fn parse_circuit_type() {
        assert_eq!("RLC".parse::<CircuitType>().unwrap(), CircuitType::Rlc);
        assert_eq!(" rc ".parse::<CircuitType>().unwrap(), CircuitType::Rc);
        assert!(matches!(
            "lc".parse::<CircuitType>(),
            Err(DaqError::UnknownCircuit(_))
        ));
    }

    #[test]
    fn circuit_type_serde_is_lowercase() {
        let json = serde_json::to_string(&CircuitType::Rlc).unwrap();
        assert_eq!(json, "\"rlc\"");
    }

    #[test]
    fn classify_identifiers() {
        assert_eq!(
            ComponentCategory::from_identifier("ls2"),
            Some(ComponentCategory::Inductor)
        );
        assert_eq!(
            ComponentCategory::from_identifier("CS3"),
            Some(ComponentCategory::Capacitor)
        );
        assert_eq!(
            ComponentCategory::from_identifier("r1s3"),
            Some(ComponentCategory::Resistor {
                family: "r1s".into()
            })
        );
        assert_eq!(
            ComponentCategory::from_identifier("rz2"),
            Some(ComponentCategory::DischargeResistor)
        );
        assert_eq!(ComponentCategory::from_identifier(""), None);
        assert_eq!(ComponentCategory::from_identifier("ls"), None);
        assert_eq!(ComponentCategory::from_identifier("r1s"), None);
        assert_eq!(ComponentCategory::from_identifier("xy9"), None);
    }

    #[test]
    fn resistor_family_only_for_resistors() {
        assert_eq!(resistor_family("r2s4").as_deref(), Some("r2s"));
        assert_eq!(resistor_family("cs1"), None);
    }

    #[test]
    fn blank_selection_clears_slot() {
        let mut selection = ComponentSelection::new().with(Slot::Inductor, "ls1");
        assert_eq!(selection.get(Slot::Inductor), Some("ls1"));

        selection.set(Slot::Inductor, Some("  ".into()));
        assert!(!selection.is_set(Slot::Inductor));
        assert!(selection.is_empty());
    }
}
