//! Task splitting: turns a submitted table into ordered row records.
//!
//! Only structural problems are reported here (missing columns, ragged rows,
//! unparsable numbers). Anything that depends on the reference, such as an
//! out-of-range position, is left for the task so it fails one row instead
//! of the whole job.

use crate::error::JobError;
use crate::models::{
    InputTable, PredictionRequest, RowRecord, SpacerBounds, Window, PREDICTION_COLUMNS,
};
use std::collections::HashSet;

const POSITION_ALIASES: [&str; 2] = ["position", "pos"];
const REFERENCE_ALIASES: [&str; 3] = ["ref", "reference", "ref_allele"];
const COVERAGE_ALIASES: [&str; 3] = ["coverage", "depth", "dp"];
const FRACTION_ALIASES: [&str; 4] = ["af", "allele_fraction", "vaf", "alt_fraction"];

/// Indices of the required columns within the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub position: usize,
    pub reference: usize,
    pub coverage: usize,
    pub allele_fraction: usize,
}

fn find_column(columns: &[String], aliases: &[&str]) -> Option<usize> {
    columns
        .iter()
        .position(|c| aliases.iter().any(|alias| c.eq_ignore_ascii_case(alias)))
}

impl ColumnMap {
    pub fn resolve(table: &InputTable) -> Result<Self, JobError> {
        let mut seen = HashSet::new();
        for column in &table.columns {
            if column.is_empty() {
                return Err(JobError::MalformedInput(format!(
                    "{}: empty column name in header",
                    table.source
                )));
            }
            if !seen.insert(column.to_ascii_lowercase()) {
                return Err(JobError::MalformedInput(format!(
                    "{}: duplicate column {:?}",
                    table.source, column
                )));
            }
            // Would collide with the columns appended to the output
            if PREDICTION_COLUMNS.iter().any(|c| column.eq_ignore_ascii_case(c)) {
                return Err(JobError::MalformedInput(format!(
                    "{}: column {:?} is reserved for prediction output",
                    table.source, column
                )));
            }
        }

        let require = |label: &str, aliases: &[&str]| {
            find_column(&table.columns, aliases).ok_or_else(|| {
                JobError::MalformedInput(format!(
                    "{}: missing required {} column (expected one of: {})",
                    table.source,
                    label,
                    aliases.join(", ")
                ))
            })
        };

        Ok(Self {
            position: require("position", &POSITION_ALIASES[..])?,
            reference: require("reference allele", &REFERENCE_ALIASES[..])?,
            coverage: require("coverage", &COVERAGE_ALIASES[..])?,
            allele_fraction: require("allele fraction", &FRACTION_ALIASES[..])?,
        })
    }
}

fn parse_field<T: std::str::FromStr>(
    table: &InputTable,
    row: usize,
    column: usize,
    fields: &[String],
) -> Result<T, JobError> {
    let raw = fields[column].trim();
    raw.parse().map_err(|_| {
        JobError::MalformedInput(format!(
            "{}: row {}: column {:?} has unparsable value {:?}",
            table.source,
            row + 1,
            table.columns[column],
            raw
        ))
    })
}

/// Split a table into row records, one per data row, in input order.
pub fn split(table: &InputTable) -> Result<Vec<RowRecord>, JobError> {
    let columns = ColumnMap::resolve(table)?;
    let width = table.columns.len();

    table
        .rows
        .iter()
        .enumerate()
        .map(|(index, fields)| {
            if fields.len() != width {
                return Err(JobError::MalformedInput(format!(
                    "{}: row {} has {} fields, header has {}",
                    table.source,
                    index + 1,
                    fields.len(),
                    width
                )));
            }

            Ok(RowRecord {
                index,
                position: parse_field(table, index, columns.position, fields)?,
                reference_allele: fields[columns.reference].trim().to_string(),
                coverage: parse_field(table, index, columns.coverage, fields)?,
                allele_fraction: parse_field(table, index, columns.allele_fraction, fields)?,
                fields: fields.clone(),
            })
        })
        .collect()
}

/// Shared per-job parameters used to derive every task's request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskParams {
    pub arm_length: u32,
    pub spacer: SpacerBounds,
}

impl TaskParams {
    pub fn from_settings(settings: &crate::models::Settings) -> Self {
        Self {
            arm_length: settings.arm_length,
            spacer: SpacerBounds {
                min: settings.spacer_min,
                max: settings.spacer_max,
            },
        }
    }
}

/// One unit of work: a row plus its derived prediction request
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub row_index: usize,
    pub allele_fraction: f64,
    pub request: PredictionRequest,
}

impl Task {
    pub fn new(row: &RowRecord, params: &TaskParams) -> Self {
        let reach = params.arm_length as i64 + params.spacer.max as i64 + 1;

        Self {
            row_index: row.index,
            allele_fraction: row.allele_fraction,
            request: PredictionRequest {
                position: row.position,
                reference_base: row.reference_allele.clone(),
                spacer: params.spacer,
                arm_length: params.arm_length,
                window: Window {
                    start: row.position.saturating_sub(reach).max(1),
                    end: row.position.saturating_add(reach),
                },
            },
        }
    }
}

impl Task {
    /// Row-level checks that need no predictor. A failure here becomes the
    /// row's outcome without calling out.
    pub fn precheck(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.allele_fraction) {
            return Err(format!(
                "allele fraction {} is outside [0, 1]",
                self.allele_fraction
            ));
        }
        Ok(())
    }
}

pub fn build_tasks(rows: &[RowRecord], params: &TaskParams) -> Vec<Task> {
    rows.iter().map(|row| Task::new(row, params)).collect()
}
