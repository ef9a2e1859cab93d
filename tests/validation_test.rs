use circuit_daq::circuit::{CircuitType, ComponentSelection, Slot};
use circuit_daq::measurement::{MeasurementBounds, MeasurementSettings};
use circuit_daq::relay_map::{RelayId, RelayTable};
use circuit_daq::validation::*;

fn settings() -> MeasurementSettings {
    MeasurementSettings::new(1000, 200, 5.0)
}

#[test]
fn test_is_in_range() {
    assert!(is_in_range(5, 1..=10).is_ok());
    assert!(is_in_range(11, 1..=10).is_err());
    assert!(is_in_range(0.01, 0.01..=10.0).is_ok());
}

#[test]
fn test_is_not_empty() {
    assert!(is_not_empty("rz1").is_ok());
    assert!(is_not_empty("").is_err());
    assert!(is_not_empty("   ").is_err());
}

#[test]
fn test_is_valid_url() {
    assert!(is_valid_url("http://localhost:8000").is_ok());
    assert!(is_valid_url("https://daq.example.org/lab").is_ok());
    assert!(is_valid_url("ftp://localhost").is_err());
    assert!(is_valid_url("localhost:8000").is_err());
}

#[test]
fn test_required_slots_per_circuit() {
    let empty = ComponentSelection::new();
    let bounds = MeasurementBounds::default();

    let cases = [
        (CircuitType::Rl, vec![Slot::Inductor, Slot::Resistor]),
        (CircuitType::Rc, vec![Slot::Capacitor, Slot::Resistor]),
        (
            CircuitType::Rlc,
            vec![Slot::Inductor, Slot::Capacitor, Slot::Resistor],
        ),
    ];
    for (circuit, missing) in cases {
        let report = validate(circuit, &empty, &settings(), &bounds);
        assert_eq!(report.missing_slots(), missing, "{circuit}");
        assert!(!start_enabled(&report, false));
    }
}

#[test]
fn test_discharge_resistor_is_optional() {
    let selection = ComponentSelection::new()
        .with(Slot::Capacitor, "cs1")
        .with(Slot::Resistor, "r2s4");
    let report = validate(
        CircuitType::Rc,
        &selection,
        &settings(),
        &MeasurementBounds::default(),
    );
    assert!(report.is_valid());
    assert!(start_enabled(&report, false));
    assert!(!start_enabled(&report, true));
}

#[test]
fn test_wrong_category_is_reported_per_slot() {
    let selection = ComponentSelection::new()
        .with(Slot::Inductor, "cs1")
        .with(Slot::Resistor, "r1s2");
    let report = validate(
        CircuitType::Rl,
        &selection,
        &settings(),
        &MeasurementBounds::default(),
    );
    assert_eq!(report.offending_slots(), vec![Slot::Inductor]);
    assert!(report.missing_slots().is_empty());
}

#[test]
fn test_out_of_bounds_settings_block_start() {
    let selection = ComponentSelection::new()
        .with(Slot::Inductor, "ls1")
        .with(Slot::Resistor, "r1s1");
    let too_long = MeasurementSettings::new(1000, 200, 12.0);
    let report = validate(
        CircuitType::Rl,
        &selection,
        &too_long,
        &MeasurementBounds::default(),
    );
    assert_eq!(report.offending_settings(), vec![SettingField::Duration]);
    assert!(report.message().is_some());
    assert!(!start_enabled(&report, false));
}

#[test]
fn test_relay_mapping_is_pure() {
    let table = RelayTable::default();
    let selection = ComponentSelection::new()
        .with(Slot::Inductor, "ls1")
        .with(Slot::Capacitor, "cs4")
        .with(Slot::Resistor, "r2s2")
        .with(Slot::DischargeResistor, "rz1");

    let first = table.relay_set(CircuitType::Rlc, &selection);
    let second = table.relay_set(CircuitType::Rlc, &selection);
    assert_eq!(first, second);

    let names: Vec<&str> = first.iter().map(RelayId::as_str).collect();
    assert_eq!(names, vec!["zk1_2", "zk2_4", "zk3_1", "zk4_3", "zk4_8"]);
    assert!(!first.contains(&table.power));
}

#[test]
fn test_unknown_components_map_to_nothing() {
    let table = RelayTable::default();
    assert_eq!(table.relay_for(""), None);
    assert_eq!(table.relay_for("ls9"), None);
    assert_eq!(table.relay_for("r1s1"), Some(&RelayId::from("zk1_5")));
}
