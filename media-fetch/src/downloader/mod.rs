//! Fetching: engine invocation, error classification and the retry escalator.

pub mod classify;
pub mod engine;
pub mod escalator;
pub mod output;

pub use classify::ErrorClassification;
pub use engine::{FetchEngine, FetchMetadata, FetchOutput, FetchRequest, YtDlpEngine, YtDlpEngineConfig};
pub use escalator::{EscalationOutcome, EscalatorConfig, FetchFailure, FetchPlan, RetryEscalator};
pub use output::{UsableFile, primary_file};
