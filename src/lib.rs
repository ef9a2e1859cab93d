//! # Circuit DAQ Console Library
//!
//! This crate is the core of the `circuit-daq` operator console. An operator picks an
//! electrical circuit topology (RL, RC, RLC), chooses discrete component values,
//! configures sampling parameters and runs a measurement. The console itself never touches
//! hardware: every relay switch, capacitor discharge and ADC acquisition is a call
//! against a remote control service. Keeping this as a library lets the CLI (`main.rs`),
//! tests and any embedding UI share the same selection state and workflow.
//!
//! ## Crate Structure
//!
//! - **`api`**: The `DaqBackend` trait over the relay/ADC control service, its HTTP
//!   implementation and an in-memory mock.
//! - **`circuit`**: Circuit topologies, component slots and the component selection.
//! - **`config`**: Figment-based configuration (TOML file plus `CIRCUIT_DAQ_` environment).
//! - **`error`**: The `DaqError` enum for centralized error handling.
//! - **`export`**: JSON and CSV export of completed captures.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`measurement`**: Sampling settings, buffer-size recommendation and bounds.
//! - **`relay_map`**: Configurable component-to-relay mapping.
//! - **`session`**: The `Dashboard` operator session and session persistence.
//! - **`validation`**: Pure validation of the selection and settings.
//! - **`workflow`**: The measurement state machine and the engine that sequences it.

pub mod api;
pub mod circuit;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod measurement;
pub mod relay_map;
pub mod session;
pub mod validation;
pub mod workflow;

pub use error::{AppResult, DaqError};
