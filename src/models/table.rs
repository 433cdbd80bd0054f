// Input/output table models
use crate::error::JobError;
use crate::models::{FailureDetail, Prediction, RowResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Columns appended to every output row, after the passthrough columns
pub const PREDICTION_COLUMNS: [&str; 9] = [
    "talen_status",
    "failure_reason",
    "failure_detail",
    "spacer_start",
    "spacer_end",
    "left_talen",
    "right_talen",
    "left_rvd",
    "right_rvd",
];

/// Raw submitted table: header plus untyped fields, in file order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputTable {
    pub source: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl InputTable {
    pub fn new(source: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            source: source.into(),
            columns,
            rows,
        }
    }

    /// Parse tab-separated text. `##` lines and blank lines are skipped, and a
    /// leading `#` on the header line is dropped (VCF-style headers).
    /// Field counts and types are checked later by the splitter.
    pub fn parse_tsv(source: impl Into<String>, text: &str) -> Result<Self, JobError> {
        let source = source.into();
        let mut lines = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty() && !line.starts_with("##"));

        let header = lines
            .next()
            .ok_or_else(|| JobError::MalformedInput(format!("{}: missing header line", source)))?;

        let columns = header
            .trim_start_matches('#')
            .split('\t')
            .map(|name| name.trim().to_string())
            .collect();

        let rows = lines
            .map(|line| line.split('\t').map(|field| field.to_string()).collect())
            .collect();

        Ok(Self {
            source,
            columns,
            rows,
        })
    }

    pub fn read_tsv(path: &Path) -> Result<Self, JobError> {
        let text = fs::read_to_string(path).map_err(|e| {
            JobError::MalformedInput(format!("Failed to read {:?}: {}", path, e))
        })?;
        Self::parse_tsv(path.to_string_lossy(), &text)
    }
}

/// One parsed input row. `fields` keeps every original column verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowRecord {
    pub index: usize,
    pub position: i64,
    pub reference_allele: String,
    pub coverage: u64,
    pub allele_fraction: f64,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputRow {
    pub row_index: usize,
    pub fields: Vec<String>,
    pub result: RowResult,
}

impl OutputRow {
    fn prediction_fields(&self) -> [String; 9] {
        match &self.result {
            RowResult::Predicted(Prediction {
                spacer_start,
                spacer_end,
                left_talen,
                right_talen,
                left_rvd,
                right_rvd,
            }) => [
                "ok".to_string(),
                String::new(),
                String::new(),
                spacer_start.to_string(),
                spacer_end.to_string(),
                left_talen.clone(),
                right_talen.clone(),
                left_rvd.clone(),
                right_rvd.clone(),
            ],
            RowResult::Failed(FailureDetail { code, message }) => [
                "failed".to_string(),
                code.to_string(),
                sanitize_field(message),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
            ],
        }
    }
}

fn sanitize_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

/// Merged output: one row per input row, ascending row index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CombinedTable {
    pub columns: Vec<String>,
    pub rows: Vec<OutputRow>,
}

impl CombinedTable {
    pub fn new(columns: Vec<String>, rows: Vec<OutputRow>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.rows.iter().filter(|row| row.result.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.rows.len() - self.succeeded()
    }

    pub fn header(&self) -> Vec<String> {
        self.columns
            .iter()
            .cloned()
            .chain(PREDICTION_COLUMNS.iter().map(|c| c.to_string()))
            .collect()
    }

    pub fn to_tsv(&self) -> String {
        let mut out = self.header().join("\t");
        out.push('\n');

        for row in &self.rows {
            let line: Vec<String> = row
                .fields
                .iter()
                .cloned()
                .chain(row.prediction_fields())
                .collect();
            out.push_str(&line.join("\t"));
            out.push('\n');
        }
        out
    }

    pub fn write_tsv(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_tsv())
    }
}
