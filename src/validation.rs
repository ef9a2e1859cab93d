//! Validation of the operator's selection and settings.
//!
//! Validation is a pure function of the selection state. It collects every violation
//! rather than stopping at the first, so the console can mark all offending fields at once
//! and show one message listing them.

use crate::circuit::{CircuitType, ComponentCategory, ComponentSelection, Slot};
use crate::measurement::{BufferWarning, MeasurementBounds, MeasurementSettings};
use serde::Serialize;
use std::fmt;
use std::ops::RangeInclusive;

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates if a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.trim().is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Validates that a string is an absolute `http`/`https` URL.
pub fn is_valid_url(value: &str) -> Result<(), &'static str> {
    let url = url::Url::parse(value).map_err(|_| "Invalid URL")?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(()),
        "http" | "https" => Err("URL has no host"),
        _ => Err("URL scheme must be http or https"),
    }
}

/// What is wrong with a component slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotIssue {
    /// Required for the circuit but empty.
    Missing,
    /// Holds a component of another category (or an unknown code).
    WrongCategory {
        /// The offending identifier.
        identifier: String,
    },
}

/// One problem with a component slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotViolation {
    /// Slot to mark.
    pub slot: Slot,
    /// What is wrong.
    pub issue: SlotIssue,
}

impl fmt::Display for SlotViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.issue {
            SlotIssue::Missing => write!(f, "{} is required", self.slot),
            SlotIssue::WrongCategory { identifier } => {
                write!(f, "'{}' is not a valid {}", identifier, self.slot.label().to_lowercase())
            }
        }
    }
}

/// Measurement setting fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingField {
    /// Samples per channel.
    SampleCount,
    /// Sampling rate.
    SampleRate,
    /// Acquisition window.
    Duration,
}

impl SettingField {
    fn label(self) -> &'static str {
        match self {
            SettingField::SampleCount => "Sample count",
            SettingField::SampleRate => "Sample rate (Hz)",
            SettingField::Duration => "Duration (s)",
        }
    }
}

/// A setting outside its configured bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingViolation {
    /// Field to mark.
    pub field: SettingField,
    /// Value entered.
    pub value: f64,
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

impl fmt::Display for SettingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} must be between {} and {} (got {})",
            self.field.label(),
            self.min,
            self.max,
            self.value
        )
    }
}

/// Outcome of validating a selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Component slot problems.
    pub slots: Vec<SlotViolation>,
    /// Out-of-range settings.
    pub settings: Vec<SettingViolation>,
    /// Non-blocking warnings.
    pub warnings: Vec<BufferWarning>,
}

impl ValidationReport {
    /// Logical AND of every check. Warnings do not affect validity.
    pub fn is_valid(&self) -> bool {
        self.slots.is_empty() && self.settings.is_empty()
    }

    /// Required slots that are empty.
    pub fn missing_slots(&self) -> Vec<Slot> {
        self.slots
            .iter()
            .filter(|v| v.issue == SlotIssue::Missing)
            .map(|v| v.slot)
            .collect()
    }

    /// Every slot that should be marked as erroneous.
    pub fn offending_slots(&self) -> Vec<Slot> {
        self.slots.iter().map(|v| v.slot).collect()
    }

    /// Every setting that should be marked as erroneous.
    pub fn offending_settings(&self) -> Vec<SettingField> {
        self.settings.iter().map(|v| v.field).collect()
    }

    /// Message listing all violations, or `None` when valid.
    pub fn message(&self) -> Option<String> {
        if self.is_valid() {
            return None;
        }
        let lines: Vec<String> = self
            .slots
            .iter()
            .map(ToString::to_string)
            .chain(self.settings.iter().map(ToString::to_string))
            .collect();
        Some(lines.join("; "))
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => f.write_str(&message),
            None => f.write_str("valid"),
        }
    }
}

/// Check required slots for the circuit and the category of every populated slot.
pub fn validate_selection(circuit: CircuitType, selection: &ComponentSelection) -> Vec<SlotViolation> {
    let mut violations: Vec<SlotViolation> = circuit
        .required_slots()
        .iter()
        .filter(|slot| !selection.is_set(**slot))
        .map(|slot| SlotViolation {
            slot: *slot,
            issue: SlotIssue::Missing,
        })
        .collect();

    for (slot, identifier) in selection.iter() {
        let matches = ComponentCategory::from_identifier(identifier).is_some_and(|c| c.slot() == slot);
        if !matches {
            violations.push(SlotViolation {
                slot,
                issue: SlotIssue::WrongCategory {
                    identifier: identifier.to_string(),
                },
            });
        }
    }

    violations
}

/// Check settings against the bounds policy.
pub fn validate_settings(
    settings: &MeasurementSettings,
    bounds: &MeasurementBounds,
) -> Vec<SettingViolation> {
    let mut violations = Vec::new();

    if is_in_range(settings.sample_count, bounds.samples.min..=bounds.samples.max).is_err() {
        violations.push(SettingViolation {
            field: SettingField::SampleCount,
            value: f64::from(settings.sample_count),
            min: f64::from(bounds.samples.min),
            max: f64::from(bounds.samples.max),
        });
    }
    if is_in_range(settings.sample_rate, bounds.sample_rate.min..=bounds.sample_rate.max).is_err() {
        violations.push(SettingViolation {
            field: SettingField::SampleRate,
            value: f64::from(settings.sample_rate),
            min: f64::from(bounds.sample_rate.min),
            max: f64::from(bounds.sample_rate.max),
        });
    }
    if is_in_range(
        settings.duration_secs,
        bounds.duration_secs.min..=bounds.duration_secs.max,
    )
    .is_err()
    {
        violations.push(SettingViolation {
            field: SettingField::Duration,
            value: settings.duration_secs,
            min: bounds.duration_secs.min,
            max: bounds.duration_secs.max,
        });
    }

    violations
}

/// Full validation of a selection.
pub fn validate(
    circuit: CircuitType,
    selection: &ComponentSelection,
    settings: &MeasurementSettings,
    bounds: &MeasurementBounds,
) -> ValidationReport {
    ValidationReport {
        slots: validate_selection(circuit, selection),
        settings: validate_settings(settings, bounds),
        warnings: settings.buffer_warning().into_iter().collect(),
    }
}

/// The start control is enabled only for a valid selection with no run active.
pub fn start_enabled(report: &ValidationReport, running: bool) -> bool {
    report.is_valid() && !running
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_selection() -> ComponentSelection {
        ComponentSelection::new()
            .with(Slot::Inductor, "ls2")
            .with(Slot::Capacitor, "cs3")
            .with(Slot::Resistor, "r1s1")
    }

    fn selection_for(circuit: CircuitType) -> ComponentSelection {
        let full = full_selection();
        let mut selection = ComponentSelection::new();
        for slot in circuit.required_slots() {
            selection.set(*slot, full.get(*slot).map(str::to_string));
        }
        selection
    }

    #[test]
    fn test_is_in_range() {
        assert!(is_in_range(5, 1..=10).is_ok());
        assert!(is_in_range(0, 1..=10).is_err());
        assert!(is_in_range(0.5, 0.1..=1.0).is_ok());
    }

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url("http://localhost:8000").is_ok());
        assert!(is_valid_url("ftp://localhost").is_err());
        assert!(is_valid_url("not a url").is_err());
    }

    #[test]
    fn complete_selection_is_valid_for_every_circuit() {
        let settings = MeasurementSettings::default();
        let bounds = MeasurementBounds::default();
        for circuit in CircuitType::ALL {
            let report = validate(circuit, &selection_for(circuit), &settings, &bounds);
            assert!(report.is_valid(), "{circuit}: {report}");
            assert!(report.message().is_none());
        }
    }

    #[test]
    fn removing_any_required_slot_names_it() {
        let settings = MeasurementSettings::default();
        let bounds = MeasurementBounds::default();
        for circuit in CircuitType::ALL {
            for slot in circuit.required_slots() {
                let mut selection = selection_for(circuit);
                selection.set(*slot, None);

                let report = validate(circuit, &selection, &settings, &bounds);
                assert!(!report.is_valid());
                assert_eq!(report.missing_slots(), vec![*slot]);
                let message = report.message().unwrap();
                assert!(message.contains(slot.label()), "{message}");
            }
        }
    }

    #[test]
    fn message_lists_every_violation() {
        let settings = MeasurementSettings::new(5, 0, 60.0);
        let report = validate(
            CircuitType::Rlc,
            &ComponentSelection::new(),
            &settings,
            &MeasurementBounds::default(),
        );

        assert_eq!(report.slots.len(), 3);
        assert_eq!(
            report.offending_settings(),
            vec![
                SettingField::SampleCount,
                SettingField::SampleRate,
                SettingField::Duration
            ]
        );
        let message = report.message().unwrap();
        assert_eq!(message.matches("; ").count(), 5);
    }

    #[test]
    fn wrong_category_is_invalid() {
        let selection = ComponentSelection::new()
            .with(Slot::Inductor, "cs1")
            .with(Slot::Resistor, "r1s1");
        let violations = validate_selection(CircuitType::Rl, &selection);
        assert_eq!(
            violations,
            vec![SlotViolation {
                slot: Slot::Inductor,
                issue: SlotIssue::WrongCategory {
                    identifier: "cs1".into()
                }
            }]
        );
    }

    #[test]
    fn buffer_warning_does_not_block() {
        let settings = MeasurementSettings::new(500, 100, 5.0);
        let report = validate(
            CircuitType::Rl,
            &selection_for(CircuitType::Rl),
            &settings,
            &MeasurementBounds::default(),
        );
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].recommended, 575);
    }

    #[test]
    fn start_requires_valid_and_idle() {
        let valid = ValidationReport::default();
        assert!(start_enabled(&valid, false));
        assert!(!start_enabled(&valid, true));

        let invalid = ValidationReport {
            slots: vec![SlotViolation {
                slot: Slot::Resistor,
                issue: SlotIssue::Missing,
            }],
            ..Default::default()
        };
        assert!(!start_enabled(&invalid, false));
    }
}
