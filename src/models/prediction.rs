// Prediction request/result models and per-task outcomes
use serde::{Deserialize, Serialize};
use std::fmt;

/// Allowed spacer lengths between the two TALEN arms (inclusive)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpacerBounds {
    pub min: u32,
    pub max: u32,
}

/// 1-based inclusive reference window a predictor may search
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    pub fn contains(&self, position: i64) -> bool {
        position >= self.start && position <= self.end
    }
}

/// Everything a predictor needs for one variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionRequest {
    pub position: i64,
    pub reference_base: String,
    pub spacer: SpacerBounds,
    pub arm_length: u32,
    pub window: Window,
}

/// One TALEN pair flanking the variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub spacer_start: i64,
    pub spacer_end: i64,
    pub left_talen: String,
    pub right_talen: String,
    pub left_rvd: String,
    pub right_rvd: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    PredictionFailure,
    Timeout,
    Cancelled,
    Panicked,
}

impl FailureCode {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureCode::PredictionFailure => "prediction_failure",
            FailureCode::Timeout => "timeout",
            FailureCode::Cancelled => "cancelled",
            FailureCode::Panicked => "panicked",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureDetail {
    pub code: FailureCode,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RowResult {
    Predicted(Prediction),
    Failed(FailureDetail),
}

impl RowResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RowResult::Predicted(_))
    }
}

/// Result of executing exactly one task, keyed by its row index
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub row_index: usize,
    pub result: RowResult,
}

impl Outcome {
    pub fn success(row_index: usize, prediction: Prediction) -> Self {
        Self {
            row_index,
            result: RowResult::Predicted(prediction),
        }
    }

    pub fn failure(row_index: usize, code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            row_index,
            result: RowResult::Failed(FailureDetail {
                code,
                message: message.into(),
            }),
        }
    }
}
