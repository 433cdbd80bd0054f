//! Fan-out orchestration of per-variant TALEN binding-site prediction.
//!
//! A submitted variant table is split into one task per row, run through a
//! bounded worker pool against a [`Predictor`], and merged back into a
//! [`CombinedTable`] in original row order. Row-level prediction failures are
//! recorded per row; only structural problems fail a job.

pub mod aggregator;
pub mod error;
pub mod file_manager;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod predictor;
pub mod process_manager;
pub mod scheduler;
pub mod splitter;
pub mod store;
pub mod utils;

pub use error::JobError;
pub use models::{
    CombinedTable, FailureCode, InputTable, JobId, JobState, JobStatus, Prediction, PredictionRequest,
    RowResult, Settings,
};
pub use orchestrator::Orchestrator;
pub use predictor::{AbortSignal, PredictionError, Predictor, ReferencePredictor};
pub use process_manager::CommandPredictor;
pub use store::{JobStore, JsonJobStore, MemoryJobStore};
