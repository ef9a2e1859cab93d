//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the kinds of errors an operator console runs into, from configuration issues to
//! failed calls against the relay/ADC control API.
//!
//! ## Error Hierarchy
//!
//! `DaqError` consolidates three families of failures:
//!
//! - **Local input errors**: `Validation`, `NoCircuitSelected`, `UnknownCircuit`. These
//!   are non-fatal and only block the start of a measurement.
//! - **Remote-call errors**: `RemoteStatus` for any non-2xx response, plus the transport
//!   level variants (`Http`, `Request`, `InvalidUri`, `Timeout`). Inside a workflow run
//!   they are wrapped in `Step`, which records the state the run was in when it failed.
//! - **Infrastructure errors**: `Config`, `Configuration`, `Io`, `Json`, `Csv`.
//!
//! By using `#[from]`, `DaqError` can be created from the underlying error types,
//! simplifying error handling throughout the crate with the `?` operator.

use crate::validation::ValidationReport;
use crate::workflow::WorkflowState;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Every error the console can surface to an operator.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Figment failed to load or deserialize the configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but is semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File system I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV export failure.
    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The backend base URL could not be parsed or joined.
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A joined URL was not accepted as an HTTP URI.
    #[error("Invalid URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    /// An HTTP request could not be constructed.
    #[error("Request build error: {0}")]
    Request(#[from] http::Error),

    /// Connection or protocol failure talking to the backend.
    #[error("HTTP transport error: {0}")]
    Http(#[from] hyper::Error),

    /// The backend did not answer within the configured timeout.
    #[error("Request to {0} timed out")]
    Timeout(String),

    /// The backend answered with a non-success status code.
    #[error("{endpoint} failed with HTTP {status}: {detail}")]
    RemoteStatus {
        /// Endpoint path that failed.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// `detail` field of the error body, or the raw body.
        detail: String,
    },

    /// The backend does not offer this operation.
    #[error("Operation not supported by backend: {0}")]
    Unsupported(String),

    /// Input validation blocked the action.
    #[error("Invalid measurement setup: {0}")]
    Validation(ValidationReport),

    /// No circuit topology has been selected.
    #[error("No circuit selected")]
    NoCircuitSelected,

    /// Circuit name not one of rl, rc, rlc.
    #[error("Unknown circuit type '{0}'. Must be one of: rl, rc, rlc")]
    UnknownCircuit(String),

    /// A measurement is already running.
    #[error("A measurement is already running")]
    WorkflowBusy,

    /// The backend stopped acquiring while a run still expected data.
    #[error("Backend reports no active acquisition")]
    AcquisitionLost,

    /// A workflow step failed; cleanup has already been attempted.
    #[error("Measurement failed while {state}: {source}")]
    Step {
        /// State the run was in when the remote call failed.
        state: WorkflowState,
        /// Underlying failure.
        #[source]
        source: Box<DaqError>,
    },

    /// Export format requires a feature that was not compiled in.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}

impl DaqError {
    /// Wrap an error with the workflow state it occurred in.
    pub fn in_state(self, state: WorkflowState) -> Self {
        DaqError::Step {
            state,
            source: Box::new(self),
        }
    }

    /// The HTTP status code, when the error came from a backend response.
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            DaqError::RemoteStatus { status, .. } => Some(*status),
            DaqError::Step { source, .. } => source.remote_status(),
            _ => None,
        }
    }

    /// Workflow state a run failed in, if this is a step failure.
    pub fn failed_state(&self) -> Option<WorkflowState> {
        match self {
            DaqError::Step { state, .. } => Some(*state),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_keeps_remote_status() {
        let err = DaqError::RemoteStatus {
            endpoint: "/api/relays/multiple".into(),
            status: 500,
            detail: "relay driver fault".into(),
        }
        .in_state(WorkflowState::Connecting);

        assert_eq!(err.remote_status(), Some(500));
        assert_eq!(err.failed_state(), Some(WorkflowState::Connecting));
        assert_eq!(
            err.to_string(),
            "Measurement failed while connecting relays: /api/relays/multiple failed with HTTP 500: relay driver fault"
        );
    }

    #[test]
    fn local_errors_have_no_remote_status() {
        assert_eq!(DaqError::WorkflowBusy.remote_status(), None);
        assert_eq!(DaqError::NoCircuitSelected.failed_state(), None);
    }
}
