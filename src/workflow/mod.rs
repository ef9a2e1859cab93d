//! Measurement workflow.
//!
//! A measurement is a fixed relay sequence executed against the control service:
//!
//! 1. **Preparing**: disable every enabled relay, twice
//! 2. **Discharging**: discharge each capacitor slot in turn
//! 3. **Connecting**: enable the circuit's relay set in one batched call
//! 4. **Powering**: switch the master power relay on
//! 5. **Acquiring**: start the ADC and wait for the duration timer or a manual stop
//! 6. **Completing**: stop the ADC (fetching the capture), power off, disable relays
//!
//! Any failure aborts the sequence, runs cleanup and returns to `Idle`.
//!
//! # Architecture
//!
//! ```text
//! Dashboard ──RunPlan──> MeasurementEngine ──DaqBackend──> control service
//!     ▲                         │
//!     └──── watch<WorkflowState>┘
//! ```

pub mod engine;
pub mod run;
pub mod state;

pub use engine::{MeasurementEngine, StopHandle, StopReason};
pub use run::{discharge_plan, MeasurementOutcome, RunPlan, WorkflowRun};
pub use state::{CompletionTrigger, StepOutput, WorkflowState};
