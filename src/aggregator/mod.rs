// Result aggregation
// Reassembles per-task outcomes into one table in original row order

use crate::error::JobError;
use crate::models::{CombinedTable, Outcome, OutputRow, RowRecord};
use log::error;
use std::collections::BTreeMap;

/// Merge outcomes back onto their rows. The outcome set must cover exactly the
/// submitted row indices, once each; anything else is a bug upstream and is
/// reported rather than producing a table of the wrong length.
pub fn aggregate(
    columns: &[String],
    rows: &[RowRecord],
    outcomes: Vec<Outcome>,
) -> Result<CombinedTable, JobError> {
    let mut by_row: BTreeMap<usize, Outcome> = BTreeMap::new();
    let mut duplicates = Vec::new();

    for outcome in outcomes {
        let row_index = outcome.row_index;
        if by_row.insert(row_index, outcome).is_some() {
            duplicates.push(row_index);
        }
    }

    let mut ordered: Vec<&RowRecord> = rows.iter().collect();
    ordered.sort_by_key(|row| row.index);

    let missing: Vec<usize> = ordered
        .iter()
        .map(|row| row.index)
        .filter(|index| !by_row.contains_key(index))
        .collect();
    let unknown: Vec<usize> = by_row
        .keys()
        .copied()
        .filter(|index| ordered.binary_search_by_key(index, |row| row.index).is_err())
        .collect();

    if !duplicates.is_empty() || !missing.is_empty() || !unknown.is_empty() {
        let message = format!(
            "outcomes do not match {} submitted rows (duplicates: {:?}, missing: {:?}, unknown: {:?})",
            rows.len(),
            duplicates,
            missing,
            unknown
        );
        error!("{}", message);
        return Err(JobError::InternalInvariantViolation(message));
    }

    let output = ordered
        .into_iter()
        .filter_map(|row| {
            by_row.remove(&row.index).map(|outcome| OutputRow {
                row_index: row.index,
                fields: row.fields.clone(),
                result: outcome.result,
            })
        })
        .collect();

    Ok(CombinedTable::new(columns.to_vec(), output))
}
