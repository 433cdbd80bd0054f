// Write-once outcome collection point shared by concurrent tasks

use crate::models::Outcome;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
pub struct OutcomeCollector {
    slots: Mutex<HashMap<usize, Outcome>>,
}

impl OutcomeCollector {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Record the outcome for its row. A second write for the same row is
    /// refused and handed back to the caller.
    pub fn record(&self, outcome: Outcome) -> Result<(), Outcome> {
        let mut slots = self.slots.lock();
        if slots.contains_key(&outcome.row_index) {
            return Err(outcome);
        }
        slots.insert(outcome.row_index, outcome);
        Ok(())
    }

    pub fn contains(&self, row_index: usize) -> bool {
        self.slots.lock().contains_key(&row_index)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Drain everything recorded so far, in ascending row order
    pub fn take(&self) -> Vec<Outcome> {
        let mut outcomes: Vec<Outcome> = self.slots.lock().drain().map(|(_, o)| o).collect();
        outcomes.sort_by_key(|o| o.row_index);
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureCode;
    use std::sync::Arc;

    #[test]
    fn test_second_write_refused() {
        let collector = OutcomeCollector::default();
        collector
            .record(Outcome::failure(4, FailureCode::Timeout, "slow"))
            .unwrap();

        let rejected = collector
            .record(Outcome::failure(4, FailureCode::Panicked, "late"))
            .unwrap_err();
        assert_eq!(rejected.row_index, 4);
        assert_eq!(collector.len(), 1);

        let outcomes = collector.take();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0], Outcome::failure(4, FailureCode::Timeout, "slow"));
        assert!(collector.is_empty());
    }

    #[test]
    fn test_concurrent_writers() {
        let collector = Arc::new(OutcomeCollector::with_capacity(64));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let collector = collector.clone();
                std::thread::spawn(move || {
                    for row in (worker..64).step_by(8) {
                        collector
                            .record(Outcome::failure(row, FailureCode::Cancelled, "x"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let rows: Vec<usize> = collector.take().iter().map(|o| o.row_index).collect();
        assert_eq!(rows, (0..64).collect::<Vec<_>>());
    }
}
