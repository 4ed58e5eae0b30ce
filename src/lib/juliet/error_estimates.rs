//! Per-base error model used to compute the expected number of erroneous codons.

use log::warn;

use crate::msa::MsaByColumn;

/// Columns need more than this many reads to contribute to measured rates.
const MIN_MEASURE_COVERAGE: usize = 100;

/// Chemistries whose rates have not been trained.
const UNTRAINED_CHEMISTRIES: [&str; 2] = ["P6-C4", "S/P1-C1/beta"];

const DEFAULT_MATCH: f64 = 0.995_684_488_3;
const DEFAULT_SUBSTITUTION: f64 = 0.000_524_425_7;
const DEFAULT_DELETION: f64 = 0.003_791_086;

/// Probabilities of a base being read correctly, substituted (per target base) or deleted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorEstimates {
    pub match_rate: f64,
    pub substitution: f64,
    pub deletion: f64,
    pub insertion: f64,
}

impl Default for ErrorEstimates {
    fn default() -> Self {
        Self {
            match_rate: DEFAULT_MATCH,
            substitution: DEFAULT_SUBSTITUTION / 3.0,
            deletion: DEFAULT_DELETION,
            insertion: 0.0,
        }
    }
}

impl ErrorEstimates {
    /// Rates for a sequencing chemistry.
    #[must_use]
    pub fn from_chemistry(chemistry: &str) -> Self {
        if UNTRAINED_CHEMISTRIES.contains(&chemistry) {
            warn!(
                "Chemistry {chemistry} has not been trained. Using default error rates in \
                 permissive mode; p-values might be inaccurate."
            );
        }
        Self::default()
    }

    /// Rates from an overall substitution and deletion rate.
    #[must_use]
    pub fn from_rates(substitution: f64, deletion: f64) -> Self {
        Self {
            match_rate: 1.0 - substitution - deletion,
            substitution: substitution / 3.0,
            deletion,
            insertion: 0.0,
        }
    }

    /// Probability of observing codon `to` when `from` was sequenced.
    ///
    /// # Examples
    ///
    /// ```
    /// use minorseq_lib::juliet::ErrorEstimates;
    ///
    /// let error = ErrorEstimates::from_rates(0.03, 0.01);
    /// assert!((error.probability("ACG", "ACG") - 0.96f64.powi(3)).abs() < 1e-12);
    /// assert!((error.probability("ACG", "AC-") - 0.96 * 0.96 * 0.01).abs() < 1e-12);
    /// ```
    #[must_use]
    pub fn probability(&self, from: &str, to: &str) -> f64 {
        if from.len() != to.len() {
            return 0.0;
        }
        from.bytes()
            .zip(to.bytes())
            .map(|(a, b)| {
                if a == b'-' || b == b'-' {
                    self.deletion
                } else if a != b {
                    self.substitution
                } else {
                    self.match_rate
                }
            })
            .product()
    }
}

/// Error rates observed in an alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredErrorRates {
    pub substitution: f64,
    pub deletion: f64,
    /// Number of columns the means are taken over.
    pub columns: usize,
}

/// Mean substitution and deletion frequencies over columns with sufficient coverage.
///
/// A column's substitution rate is everything that is neither its majority base nor a
/// deletion. Returns `None` when no column is covered well enough.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn measure_error_rates(msa: &MsaByColumn) -> Option<MeasuredErrorRates> {
    let (mut substitution, mut deletion, mut columns) = (0.0, 0.0, 0usize);
    for column in msa.iter().filter(|c| c.coverage() > MIN_MEASURE_COVERAGE) {
        let del = column.frequency(b'-');
        deletion += del;
        substitution += 1.0 - del - column.frequency(column.max_base());
        columns += 1;
    }
    (columns > 0).then(|| MeasuredErrorRates {
        substitution: substitution / columns as f64,
        deletion: deletion / columns as f64,
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_read::{ArrayBase, ArrayRead};
    use crate::msa::MsaByRow;
    use noodles::sam::alignment::record::cigar::op::Kind;

    #[test]
    fn test_default_rates() {
        let error = ErrorEstimates::from_chemistry("P6-C4");
        assert_eq!(error, ErrorEstimates::default());
        assert!((error.substitution * 3.0 - DEFAULT_SUBSTITUTION).abs() < 1e-15);
        assert!(error.insertion.abs() < f64::EPSILON);
    }

    #[test]
    fn test_explicit_rates() {
        let error = ErrorEstimates::from_rates(0.06, 0.02);
        assert!((error.match_rate - 0.92).abs() < 1e-12);
        assert!((error.substitution - 0.02).abs() < 1e-12);
        assert!((error.deletion - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_probability() {
        let error = ErrorEstimates::from_rates(0.03, 0.01);
        let p = error.probability("ACG", "TCC");
        assert!((p - 0.01 * 0.96 * 0.01).abs() < 1e-12);
        assert!(error.probability("ACG", "AC").abs() < f64::EPSILON);
    }

    fn reads(seq: &str, n: usize, start_index: usize) -> Vec<ArrayRead> {
        (0..n)
            .map(|i| ArrayRead {
                index: start_index + i,
                name: format!("r{}", start_index + i),
                reference_start: 0,
                reference_end: seq.len(),
                chemistry: String::new(),
                bases: seq
                    .bytes()
                    .map(|nt| {
                        let kind = if nt == b'-' { Kind::Deletion } else { Kind::SequenceMatch };
                        ArrayBase::new(kind, nt)
                    })
                    .collect(),
            })
            .collect()
    }

    #[test]
    fn test_measure_error_rates() {
        let mut all = reads("ACGT", 180, 0);
        all.extend(reads("A-GT", 10, 180));
        all.extend(reads("ACCT", 10, 190));
        let msa = MsaByColumn::from_rows(&MsaByRow::new(&all)).unwrap();
        let rates = measure_error_rates(&msa).unwrap();
        assert_eq!(rates.columns, 4);
        // column 2 holds 5% deletions, column 3 holds 5% substitutions
        assert!((rates.deletion - 0.05 / 4.0).abs() < 1e-12);
        assert!((rates.substitution - 0.05 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_measure_error_rates_needs_coverage() {
        let msa = MsaByColumn::from_rows(&MsaByRow::new(&reads("ACGT", 100, 0))).unwrap();
        assert!(measure_error_rates(&msa).is_none());
    }
}
