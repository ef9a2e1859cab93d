//! CLI Entry Point for circuit-daq
//!
//! Headless operator console for RL/RC/RLC circuit measurements:
//! - Run a full measurement (discharge, connect, power, acquire, tear down)
//! - Validate a selection without touching hardware
//! - Inspect and drive the relay/ADC control service directly
//!
//! # Usage
//!
//! Measure an RLC circuit and export the capture:
//! ```bash
//! circuit-daq measure rlc --inductor ls2 --capacitor cs3 --resistor r1s1 \
//!     --discharge-resistor rz2 --samples 1000 --rate 200 --duration 5 --export json,csv
//! ```
//!
//! Press Ctrl+C while acquiring to stop early; the capture so far is kept.

use anyhow::{bail, Result};
use circuit_daq::api::{DaqBackend, HttpBackend};
use circuit_daq::circuit::{CircuitType, ComponentSelection, Slot};
use circuit_daq::config::{DashboardConfig, DEFAULT_CONFIG_PATH};
use circuit_daq::export::{self, ExportFormat};
use circuit_daq::logging::{self, OutputFormat, TracingConfig};
use circuit_daq::relay_map::RelayId;
use circuit_daq::session::{load_session, save_session, Dashboard};
use circuit_daq::workflow::{discharge_plan, MeasurementOutcome};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "circuit-daq")]
#[command(about = "Operator console for relay-switched circuit measurements", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the control service URL
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a measurement
    Measure {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Export formats (comma separated)
        #[arg(long, value_enum, value_delimiter = ',')]
        export: Vec<ExportFormat>,

        /// Export directory (defaults to export.output_dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Start from a saved session
        #[arg(long)]
        session: Option<PathBuf>,

        /// Save the selection used as a session file
        #[arg(long)]
        save_session: Option<PathBuf>,
    },

    /// Validate a selection without contacting the backend
    Validate {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Print the relays a selection would enable
    Relays {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Show ADC acquisition status
    Status,

    /// List DAQ devices known to the backend
    Devices,

    /// Switch a single relay
    Relay {
        /// Relay name, e.g. zk1_5
        relay: String,
        /// Desired state
        #[arg(value_enum)]
        state: RelayState,
    },

    /// Disable relays (enabled ones by default)
    Reset {
        /// Drive every relay low, not only the enabled ones
        #[arg(long)]
        all: bool,
    },

    /// Discharge capacitors through the discharge bus
    Discharge {
        /// Capacitor routed through the chosen resistor
        #[arg(long)]
        capacitor: Option<String>,
        /// Discharge resistor for that capacitor
        #[arg(long)]
        resistor: Option<String>,
    },

    /// Run the fixed capacitor charge sequence
    Charge,

    /// One-shot finite read of all ADC channels
    Read {
        /// Samples per channel
        #[arg(long, default_value_t = 1000)]
        samples: u32,
        /// Sampling rate in Hz
        #[arg(long, default_value_t = 1000)]
        rate: u32,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum RelayState {
    On,
    Off,
}

#[derive(Args)]
struct SelectionArgs {
    /// Circuit topology: rl, rc or rlc
    circuit: CircuitType,
    /// Inductor, e.g. ls2
    #[arg(long)]
    inductor: Option<String>,
    /// Capacitor, e.g. cs3
    #[arg(long)]
    capacitor: Option<String>,
    /// Resistor, e.g. r1s1
    #[arg(long)]
    resistor: Option<String>,
    /// Discharge resistor, e.g. rz2
    #[arg(long)]
    discharge_resistor: Option<String>,
    /// Samples per channel
    #[arg(long)]
    samples: Option<u32>,
    /// Sampling rate in Hz
    #[arg(long)]
    rate: Option<u32>,
    /// Measurement duration in seconds
    #[arg(long)]
    duration: Option<f64>,
}

impl SelectionArgs {
    fn components(&self) -> ComponentSelection {
        let mut components = ComponentSelection::new();
        components.set(Slot::Inductor, self.inductor.clone());
        components.set(Slot::Capacitor, self.capacitor.clone());
        components.set(Slot::Resistor, self.resistor.clone());
        components.set(Slot::DischargeResistor, self.discharge_resistor.clone());
        components
    }

    fn apply<B: DaqBackend + ?Sized + 'static>(&self, dash: &mut Dashboard<B>) {
        if dash.circuit() != Some(self.circuit) {
            dash.select_circuit(self.circuit);
        }
        for (slot, identifier) in self.components().iter() {
            dash.set_component(slot, Some(identifier.to_string()));
        }

        let mut settings = *dash.settings();
        if let Some(samples) = self.samples {
            settings.sample_count = samples;
        }
        if let Some(rate) = self.rate {
            settings.sample_rate = rate;
        }
        if let Some(duration) = self.duration {
            settings.duration_secs = duration;
        }
        dash.set_settings(settings);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = DashboardConfig::load_from(&cli.config)?;
    if let Some(url) = cli.backend_url {
        config.backend.base_url = url;
    }
    config.validate()?;
    logging::init(TracingConfig::from_config(&config)?.with_format(cli.log_format))?;

    let backend: Arc<dyn DaqBackend> = Arc::new(HttpBackend::from_config(&config.backend)?);

    match cli.command {
        Commands::Measure {
            selection,
            export: formats,
            output_dir,
            session,
            save_session: save_to,
        } => {
            let mut dash = Dashboard::new(config, backend);
            if let Some(path) = session {
                dash.restore(load_session(&path)?);
            }
            selection.apply(&mut dash);
            if let Some(path) = save_to {
                save_session(&dash.snapshot(), &path)?;
            }

            let outcome = run_measurement(&dash).await?;
            print_outcome(&outcome);

            let dir = output_dir.unwrap_or_else(|| dash.config().export.output_dir.clone());
            for format in formats {
                let path = export::export(&outcome, format, &dir)?;
                println!("💾 Exported {}", path.display());
            }
            Ok(())
        }
        Commands::Validate { selection } => {
            let mut dash = Dashboard::new(config, backend);
            selection.apply(&mut dash);
            let report = dash.validation()?;
            for warning in &report.warnings {
                println!("⚠️  {}", warning);
            }
            match report.message() {
                Some(message) => bail!("❌ {}", message),
                None => {
                    println!("✅ Selection is valid");
                    Ok(())
                }
            }
        }
        Commands::Relays { selection } => {
            let relays = config
                .relays
                .relay_set(selection.circuit, &selection.components());
            println!("Circuit {} enables:", selection.circuit);
            for relay in &relays {
                println!("   {}", relay);
            }
            println!("Power relay: {}", config.relays.power);
            Ok(())
        }
        Commands::Status => {
            let status = backend.adc_status().await?;
            println!(
                "ADC: {}",
                if status.is_running { "acquiring" } else { "idle" }
            );
            if let Some(configuration) = status.configuration {
                println!("{}", serde_json::to_string_pretty(&configuration)?);
            }
            Ok(())
        }
        Commands::Devices => {
            let response = backend.devices().await?;
            println!("Driver version: {}", response.driver_version);
            for device in response.devices {
                println!(
                    "   {} ({}, {})",
                    device.name, device.product_type, device.product_category
                );
            }
            Ok(())
        }
        Commands::Relay { relay, state } => {
            let on = matches!(state, RelayState::On);
            backend.set_relay(&RelayId::new(relay.as_str()), on).await?;
            println!("✅ {} {}", relay, if on { "on" } else { "off" });
            Ok(())
        }
        Commands::Reset { all } => {
            if all {
                backend.disable_all_relays().await?;
            } else {
                backend.disable_enabled_relays().await?;
            }
            println!("✅ Relays disabled");
            Ok(())
        }
        Commands::Discharge {
            capacitor,
            resistor,
        } => {
            let mut selection = ComponentSelection::new();
            selection.set(Slot::Capacitor, capacitor);
            selection.set(Slot::DischargeResistor, resistor);
            for request in discharge_plan(&selection, &config.discharge) {
                backend.discharge_capacitor(&request).await?;
                println!(
                    "⚡ {} discharged through {} ({} s)",
                    request.capacitor, request.discharge_resistor, request.duration
                );
            }
            Ok(())
        }
        Commands::Charge => {
            backend.charge_capacitor().await?;
            println!("✅ Charge sequence complete");
            Ok(())
        }
        Commands::Read { samples, rate } => {
            let capture = backend.read_daq(samples, rate).await?;
            print_channels(&capture.data);
            Ok(())
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Run the measurement, turning Ctrl+C into a manual stop.
async fn run_measurement(dash: &Dashboard<dyn DaqBackend>) -> Result<MeasurementOutcome> {
    let stop = dash.stop_handle();
    let measurement = dash.start_measurement();
    tokio::pin!(measurement);

    println!(
        "▶️  Measuring for {} s (Ctrl+C stops acquisition early)",
        dash.settings().duration_secs
    );
    loop {
        tokio::select! {
            result = &mut measurement => return Ok(result?),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                if stop.request_stop() {
                    println!("⏹  Stop requested");
                } else {
                    println!("⏳ Not acquiring yet; stop is available once the ADC is running");
                }
            }
        }
    }
}

fn print_outcome(outcome: &MeasurementOutcome) {
    println!();
    println!("✅ Measurement {} complete ({:?})", outcome.run_id, outcome.trigger);
    println!("   Circuit: {}", outcome.circuit);
    for (slot, identifier) in outcome.selection.iter() {
        println!("   {}: {}", slot, identifier);
    }
    println!("   Samples: {}", outcome.capture.samples);
    print_channels(&outcome.capture.data);
}

fn print_channels(data: &circuit_daq::api::ChannelData) {
    for (name, values) in data.channels() {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        match values.last() {
            Some(last) => println!(
                "   {}: {} samples, min {:.4} V, max {:.4} V, last {:.4} V",
                name,
                values.len(),
                min,
                max,
                last
            ),
            None => println!("   {}: no samples", name),
        }
    }
}
