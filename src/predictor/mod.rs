//! Prediction capability consumed by the scheduler.
//!
//! A predictor turns one [`PredictionRequest`] into a [`Prediction`] or a
//! domain error. Implementations must be callable concurrently for distinct
//! positions; the scheduler runs each call on a blocking worker thread.
//!
//! When a call outlives its timeout the scheduler fires the call's
//! [`AbortSignal`]. Predictors that hold external resources (such as a child
//! process) register a hook on it so the work is torn down rather than left
//! running in the background.

pub mod reference;

pub use reference::{binding_code, ReferencePredictor};

use crate::models::{Prediction, PredictionRequest};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("Position {position} is outside the reference (1..={length})")]
    PositionOutOfRange { position: i64, length: usize },

    #[error("Invalid reference base: {0:?}")]
    InvalidReferenceBase(String),

    #[error("Reference mismatch at {position}: table says {expected}, reference has {found}")]
    ReferenceMismatch {
        position: i64,
        expected: String,
        found: char,
    },

    #[error("No valid spacer found around position {0}")]
    NoValidSpacer(i64),

    #[error("Predictor rejected request: {0}")]
    Rejected(String),

    #[error("Predictor worker failed: {0}")]
    Worker(String),
}

impl PredictionError {
    /// Worth retrying: the failure came from the worker, not the variant.
    pub fn is_transient(&self) -> bool {
        matches!(self, PredictionError::Worker(_))
    }
}

type AbortHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct AbortState {
    aborted: bool,
    hooks: Vec<AbortHook>,
}

/// One-shot abort for a single predictor call
#[derive(Default)]
pub struct AbortSignal {
    state: Mutex<AbortState>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the call aborted and run every registered hook once
    pub fn abort(&self) {
        let hooks = {
            let mut state = self.state.lock();
            state.aborted = true;
            std::mem::take(&mut state.hooks)
        };
        for hook in hooks {
            hook();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Register teardown for the call. Runs immediately if the call has
    /// already been aborted.
    pub fn on_abort(&self, hook: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock();
        if state.aborted {
            drop(state);
            hook();
        } else {
            state.hooks.push(Box::new(hook));
        }
    }
}

pub trait Predictor: Send + Sync {
    fn predict(&self, request: &PredictionRequest) -> Result<Prediction, PredictionError>;

    /// Like [`Predictor::predict`], but `abort` fires if the caller gives up
    /// on the call. The default ignores it.
    fn predict_abortable(
        &self,
        request: &PredictionRequest,
        abort: &AbortSignal,
    ) -> Result<Prediction, PredictionError> {
        let _ = abort;
        self.predict(request)
    }
}

impl<F> Predictor for F
where
    F: Fn(&PredictionRequest) -> Result<Prediction, PredictionError> + Send + Sync,
{
    fn predict(&self, request: &PredictionRequest) -> Result<Prediction, PredictionError> {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_abort_runs_hooks_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let signal = AbortSignal::new();

        let counter = fired.clone();
        signal.on_abort(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!signal.is_aborted());

        signal.abort();
        signal.abort();
        assert!(signal.is_aborted());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_hook_runs_immediately() {
        let fired = Arc::new(AtomicUsize::new(0));
        let signal = AbortSignal::new();
        signal.abort();

        let counter = fired.clone();
        signal.on_abort(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
