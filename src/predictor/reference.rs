// Reference-sequence TALEN pair search
// Finds an arm/spacer/arm layout around a variant and translates both arms
// into repeat-variable diresidue (RVD) binding codes.

use super::{PredictionError, Predictor};
use crate::models::{Prediction, PredictionRequest};
use bio::io::fasta;
use log::debug;
use std::fs::File;
use std::io;
use std::path::Path;

/// TALE repeat binding code for one DNA base
pub fn binding_code(base: u8) -> Option<&'static str> {
    match base {
        b'A' => Some("NI"),
        b'C' => Some("HD"),
        b'G' => Some("NN"),
        b'T' => Some("NG"),
        _ => None,
    }
}

fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        other => other,
    }
}

fn is_acgt(base: u8) -> bool {
    matches!(base, b'A' | b'C' | b'G' | b'T')
}

fn rvd_string(bases: &[u8]) -> String {
    bases
        .iter()
        .filter_map(|&b| binding_code(b))
        .collect::<Vec<_>>()
        .join("-")
}

pub struct ReferencePredictor {
    name: String,
    sequence: Vec<u8>,
}

impl ReferencePredictor {
    pub fn new(name: impl Into<String>, sequence: &[u8]) -> Self {
        Self {
            name: name.into(),
            sequence: sequence.to_ascii_uppercase(),
        }
    }

    /// Load the first record of a FASTA file
    pub fn from_fasta(path: &Path) -> io::Result<Self> {
        let reader = fasta::Reader::new(File::open(path)?);
        let record = reader.records().next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("No FASTA records in {:?}", path),
            )
        })??;

        debug!(
            "Loaded reference {} ({} bp) from {:?}",
            record.id(),
            record.seq().len(),
            path
        );
        Ok(Self::new(record.id(), record.seq()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    // 1-based inclusive slice; caller guarantees bounds
    fn span(&self, start: i64, end: i64) -> &[u8] {
        &self.sequence[(start - 1) as usize..end as usize]
    }

    fn base(&self, position: i64) -> u8 {
        self.sequence[(position - 1) as usize]
    }

    fn check_reference(&self, request: &PredictionRequest) -> Result<(), PredictionError> {
        let length = self.sequence.len();
        if request.position < 1 || request.position > length as i64 {
            return Err(PredictionError::PositionOutOfRange {
                position: request.position,
                length,
            });
        }

        let expected = request.reference_base.trim().to_ascii_uppercase();
        if expected.len() != 1 || !is_acgt(expected.as_bytes()[0]) {
            return Err(PredictionError::InvalidReferenceBase(
                request.reference_base.clone(),
            ));
        }

        let found = self.base(request.position);
        if expected.as_bytes()[0] != found {
            return Err(PredictionError::ReferenceMismatch {
                position: request.position,
                expected,
                found: found as char,
            });
        }
        Ok(())
    }
}

impl Predictor for ReferencePredictor {
    fn predict(&self, request: &PredictionRequest) -> Result<Prediction, PredictionError> {
        self.check_reference(request)?;

        let p = request.position;
        let arm = request.arm_length as i64;
        let lo = request.window.start.max(1);
        let hi = request.window.end.min(self.sequence.len() as i64);

        // (distance of variant from spacer centre x2, spacer length, spacer start)
        let mut best: Option<((i64, i64, i64), Prediction)> = None;

        for spacer_len in request.spacer.min.max(1)..=request.spacer.max {
            let spacer_len = spacer_len as i64;

            for start in (p - spacer_len + 1)..=p {
                let end = start + spacer_len - 1;
                let left_start = start - arm;
                let right_end = end + arm;

                // T0 positions flank both arms
                let left_t0 = left_start - 1;
                let right_t0 = right_end + 1;
                if left_t0 < lo || right_t0 > hi {
                    continue;
                }
                if self.base(left_t0) != b'T' || self.base(right_t0) != b'A' {
                    continue;
                }

                let left = self.span(left_start, start - 1);
                let right = self.span(end + 1, right_end);
                if !left.iter().chain(right).all(|&b| is_acgt(b)) {
                    continue;
                }

                let key = ((2 * p - (start + end)).abs(), spacer_len, start);
                if best.as_ref().map_or(true, |(k, _)| key < *k) {
                    // The right TALEN binds the minus strand
                    let right_bound: Vec<u8> = right.iter().rev().map(|&b| complement(b)).collect();

                    best = Some((
                        key,
                        Prediction {
                            spacer_start: start,
                            spacer_end: end,
                            left_talen: String::from_utf8_lossy(left).into_owned(),
                            right_talen: String::from_utf8_lossy(&right_bound).into_owned(),
                            left_rvd: rvd_string(left),
                            right_rvd: rvd_string(&right_bound),
                        },
                    ));
                }
            }
        }

        best.map(|(_, prediction)| prediction)
            .ok_or(PredictionError::NoValidSpacer(p))
    }
}
