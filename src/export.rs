//! Capture export.
//!
//! Completed measurements are written as JSON or CSV files named
//! `measurement_{circuit}_{epochMillis}.{json|csv}`. Both formats carry the run
//! metadata (circuit, components, settings, timing) alongside the four channel arrays.
//! CSV metadata is written as `# ` comment lines ahead of the header row.

use crate::circuit::{CircuitType, ComponentSelection};
use crate::error::{AppResult, DaqError};
use crate::measurement::MeasurementSettings;
use crate::relay_map::RelayId;
use crate::workflow::{CompletionTrigger, MeasurementOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

/// Export file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ExportFormat {
    /// Metadata plus channel arrays in one JSON document
    Json,
    /// `index,time_s,adc1..adc4` rows after commented metadata
    Csv,
}

impl ExportFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(DaqError::Configuration(format!(
                "Unknown export format '{}'. Must be one of: json, csv",
                other
            ))),
        }
    }
}

/// `measurement_{circuit}_{epochMillis}.{ext}`
pub fn export_file_name(circuit: CircuitType, at: DateTime<Utc>, format: ExportFormat) -> String {
    format!(
        "measurement_{}_{}.{}",
        circuit,
        at.timestamp_millis(),
        format.extension()
    )
}

/// Run metadata written with every export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportMetadata<'a> {
    /// Run identifier
    pub run_id: Uuid,
    /// Circuit topology
    pub circuit: CircuitType,
    /// Components used
    pub components: &'a ComponentSelection,
    /// Sampling parameters
    pub parameters: &'a MeasurementSettings,
    /// Relays that were enabled
    pub relays: &'a BTreeSet<RelayId>,
    /// What closed the acquisition window
    pub trigger: CompletionTrigger,
    /// Start request time
    pub started_at: DateTime<Utc>,
    /// Completion time
    pub finished_at: DateTime<Utc>,
    /// Samples per channel reported by the backend
    pub samples: usize,
    /// Effective sampling rate in Hz
    pub sample_rate: f64,
}

impl<'a> ExportMetadata<'a> {
    /// Metadata of a completed run.
    pub fn from_outcome(outcome: &'a MeasurementOutcome) -> Self {
        Self {
            run_id: outcome.run_id,
            circuit: outcome.circuit,
            components: &outcome.selection,
            parameters: &outcome.settings,
            relays: &outcome.relays,
            trigger: outcome.trigger,
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
            samples: outcome.capture.samples,
            sample_rate: effective_rate(outcome),
        }
    }
}

/// Rate reported by the backend, falling back to the requested one.
fn effective_rate(outcome: &MeasurementOutcome) -> f64 {
    outcome
        .capture
        .sample_rate
        .filter(|rate| rate.is_finite() && *rate > 0.0)
        .unwrap_or(f64::from(outcome.settings.sample_rate))
}

#[derive(Serialize)]
struct JsonExport<'a> {
    metadata: ExportMetadata<'a>,
    data: &'a crate::api::ChannelData,
}

/// Write the outcome as JSON.
pub fn write_json(outcome: &MeasurementOutcome, path: &Path) -> AppResult<()> {
    let document = JsonExport {
        metadata: ExportMetadata::from_outcome(outcome),
        data: &outcome.capture.data,
    };
    fs::write(path, serde_json::to_string_pretty(&document)?)?;
    Ok(())
}

/// Write the outcome as CSV.
#[cfg(feature = "storage_csv")]
pub fn write_csv(outcome: &MeasurementOutcome, path: &Path) -> AppResult<()> {
    use std::io::Write;

    let mut file = fs::File::create(path)?;
    let metadata = serde_json::to_string_pretty(&ExportMetadata::from_outcome(outcome))?;
    for line in metadata.lines() {
        writeln!(file, "# {}", line)?;
    }

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["index", "time_s", "adc1", "adc2", "adc3", "adc4"])?;

    let rate = effective_rate(outcome);
    let channels = outcome.capture.data.channels();
    for index in 0..outcome.capture.data.max_len() {
        let mut record = vec![index.to_string(), (index as f64 / rate).to_string()];
        record.extend(
            channels
                .iter()
                .map(|(_, values)| values.get(index).map(f64::to_string).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the outcome as CSV.
#[cfg(not(feature = "storage_csv"))]
pub fn write_csv(_outcome: &MeasurementOutcome, _path: &Path) -> AppResult<()> {
    Err(DaqError::FeatureNotEnabled("storage_csv".to_string()))
}

/// Write the outcome into `dir` and return the file path.
pub fn export(outcome: &MeasurementOutcome, format: ExportFormat, dir: &Path) -> AppResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(outcome.circuit, outcome.finished_at, format));
    match format {
        ExportFormat::Json => write_json(outcome, &path)?,
        ExportFormat::Csv => write_csv(outcome, &path)?,
    }
    info!(path = %path.display(), %format, "Measurement exported");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AdcCapture, ChannelData};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn outcome() -> MeasurementOutcome {
        let finished_at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        MeasurementOutcome {
            run_id: Uuid::nil(),
            circuit: CircuitType::Rc,
            selection: ComponentSelection::new(),
            settings: MeasurementSettings::new(3, 2, 1.5),
            relays: BTreeSet::new(),
            trigger: CompletionTrigger::Timer,
            started_at: finished_at,
            finished_at,
            capture: AdcCapture {
                samples: 3,
                channels: 4,
                sample_rate: None,
                data: ChannelData {
                    adc1: vec![0.0, 0.5, 1.0],
                    adc2: vec![1.0, 0.5, 0.0],
                    adc3: vec![0.25; 3],
                    adc4: vec![0.0, 0.0],
                },
                timestamp: None,
            },
        }
    }

    #[test]
    fn file_name_uses_epoch_millis() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            export_file_name(CircuitType::Rlc, at, ExportFormat::Csv),
            "measurement_rlc_1700000000123.csv"
        );
    }

    #[test]
    fn json_export_contains_metadata_and_channels() {
        let dir = tempdir().unwrap();
        let path = export(&outcome(), ExportFormat::Json, dir.path()).unwrap();
        assert!(path.ends_with("measurement_rc_1700000000123.json"));

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["metadata"]["circuit"], "rc");
        assert_eq!(value["metadata"]["parameters"]["sample_count"], 3);
        assert_eq!(value["data"]["adc2"][0], 1.0);
    }

    #[cfg(feature = "storage_csv")]
    #[test]
    fn csv_export_rows() {
        let dir = tempdir().unwrap();
        let path = export(&outcome(), ExportFormat::Csv, dir.path()).unwrap();
        let text = fs::read_to_string(&path).unwrap();

        assert!(text.lines().next().unwrap().starts_with("# "));
        let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(rows[0], "index,time_s,adc1,adc2,adc3,adc4");
        assert_eq!(rows[1], "0,0,0,1,0.25,0");
        assert_eq!(rows[3], "2,1,1,0,0.25,");
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }
}
