//! Majority consensus of aligned reads.
//!
//! Reads are stacked into an MSA and each reference column contributes its most frequent
//! base. Frame-preserving insertions supported by more than half of a column's coverage are
//! spliced in, keeping only the best-supported one within any small neighbourhood.

use std::collections::BTreeMap;

use anyhow::Result;
use log::warn;

use crate::array_read::ArrayRead;
use crate::errors::MinorseqError;
use crate::msa::{MsaByColumn, MsaByRow};

/// Recommended minimum read coverage.
pub const DEFAULT_MIN_COVERAGE: usize = 50;

/// Fraction of a column's coverage an insertion must exceed.
const MIN_INSERTION_COVERAGE_FREQ: f64 = 0.5;

/// Neighbourhood, in reference positions, in which only one insertion is kept.
const INSERTION_WINDOW: usize = 5;

/// Best insertion per reference position: `ref_pos -> (sequence, count)`.
pub type InsertionCandidates = BTreeMap<usize, (String, usize)>;

/// Consensus of a set of aligned reads.
#[derive(Debug, Clone)]
pub struct Fuse {
    consensus: String,
}

impl Fuse {
    /// Build the consensus of `reads`.
    ///
    /// When there are fewer reads than `min_coverage`, every covered column is used.
    ///
    /// # Errors
    /// Returns [`MinorseqError::EmptyInput`] when `reads` is empty, or an error if the MSA
    /// cannot be tallied.
    pub fn new(reads: &[ArrayRead], min_coverage: usize) -> Result<Self> {
        if reads.is_empty() {
            return Err(MinorseqError::EmptyInput {
                context: "Could not find aligned records".to_string(),
            }
            .into());
        }

        let min_coverage = if reads.len() < min_coverage {
            warn!(
                "Insufficient coverage of {}! Operating in permissive mode. \
                 Recommended coverage is >{}x!",
                reads.len(),
                min_coverage
            );
            1
        } else {
            min_coverage
        };

        let msa = MsaByColumn::from_rows(&MsaByRow::new(reads))?;
        let mut candidates = collect_insertions(&msa);
        let mut selected = BTreeMap::new();
        while let Some((pos, seq)) = select_insertion(&mut candidates) {
            selected.insert(pos, seq);
        }

        let mut consensus = String::with_capacity(msa.len());
        for column in &msa {
            if let Some(seq) = selected.get(&column.ref_pos) {
                consensus.push_str(seq);
            }
            if column.coverage() >= min_coverage {
                let base = column.max_base();
                if base != b'-' && base != b' ' {
                    consensus.push(char::from(base));
                }
            }
        }

        Ok(Self { consensus })
    }

    #[must_use]
    pub fn consensus(&self) -> &str {
        &self.consensus
    }

    #[must_use]
    pub fn into_consensus(self) -> String {
        self.consensus
    }
}

/// For each column, the most frequent insertion whose length is a multiple of three and whose
/// count exceeds half the column coverage.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn collect_insertions(msa: &MsaByColumn) -> InsertionCandidates {
    let mut candidates = InsertionCandidates::new();
    for column in msa {
        let min_count = column.coverage() as f64 * MIN_INSERTION_COVERAGE_FREQ;
        let mut best: Option<(&String, usize)> = None;
        for (seq, &count) in &column.insertions {
            if seq.len() % 3 != 0 || count as f64 <= min_count {
                continue;
            }
            if best.is_none_or(|(_, best_count)| count > best_count) {
                best = Some((seq, count));
            }
        }
        if let Some((seq, count)) = best {
            candidates.insert(column.ref_pos, (seq.clone(), count));
        }
    }
    candidates
}

/// Take the best-supported candidate (lowest position on ties) and drop every candidate
/// within [`INSERTION_WINDOW`] positions before it or fewer after it.
pub fn select_insertion(candidates: &mut InsertionCandidates) -> Option<(usize, String)> {
    let mut best: Option<(usize, &String, usize)> = None;
    for (&pos, (seq, count)) in candidates.iter() {
        if best.is_none_or(|(_, _, best_count)| *count > best_count) {
            best = Some((pos, seq, *count));
        }
    }
    let (pos, seq) = best.map(|(pos, seq, _)| (pos, seq.clone()))?;

    let start = pos.saturating_sub(INSERTION_WINDOW);
    candidates.retain(|&p, _| p < start || p >= pos + INSERTION_WINDOW);
    Some((pos, seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_read::ArrayBase;
    use noodles::sam::alignment::record::cigar::op::Kind;

    fn read(index: usize, start: usize, ops: &str, bases: &str) -> ArrayRead {
        let bases: Vec<ArrayBase> = ops
            .bytes()
            .zip(bases.bytes())
            .map(|(op, nt)| ArrayBase::new(crate::sam::char_to_kind(op).unwrap(), nt))
            .collect();
        let aligned = bases.iter().filter(|b| b.cigar.consumes_reference()).count();
        ArrayRead {
            index,
            name: format!("r{index}"),
            reference_start: start,
            reference_end: start + aligned,
            chemistry: String::new(),
            bases,
        }
    }

    fn candidates(entries: &[(usize, &str, usize)]) -> InsertionCandidates {
        entries.iter().map(|&(pos, seq, count)| (pos, (seq.to_string(), count))).collect()
    }

    #[test]
    fn test_empty_input_is_error() {
        let err = Fuse::new(&[], DEFAULT_MIN_COVERAGE).unwrap_err();
        assert!(err.to_string().contains("No input records"));
    }

    #[test]
    fn test_majority_consensus_in_permissive_mode() {
        let reads = vec![
            read(0, 0, "=====", "ACGTA"),
            read(1, 0, "=====", "ACCTA"),
            read(2, 0, "==D==", "AC-TA"),
            read(3, 0, "==D==", "AC-TA"),
            read(4, 0, "==D==", "AC-TA"),
        ];
        let fuse = Fuse::new(&reads, DEFAULT_MIN_COVERAGE).unwrap();
        assert_eq!(fuse.consensus(), "ACTA");
    }

    #[test]
    fn test_min_coverage_drops_thin_columns() {
        let reads = vec![
            read(0, 0, "====", "ACGT"),
            read(1, 0, "==", "AC"),
            read(2, 0, "==", "AC"),
        ];
        assert_eq!(Fuse::new(&reads, 2).unwrap().consensus(), "AC");
        assert_eq!(Fuse::new(&reads, 50).unwrap().consensus(), "ACGT");
    }

    #[test]
    fn test_codon_insertion_is_spliced() {
        // 2 of 3 reads insert AAA before reference column 3 (1-based)
        let reads = vec![
            read(0, 0, "==III==", "ACAAAGT"),
            read(1, 0, "==III==", "ACAAAGT"),
            read(2, 0, "====", "ACGT"),
        ];
        let fuse = Fuse::new(&reads, 3).unwrap();
        assert_eq!(fuse.consensus(), "ACAAAGT");
    }

    #[test]
    fn test_frameshift_insertion_is_ignored() {
        let reads = vec![
            read(0, 0, "==II==", "ACAAGT"),
            read(1, 0, "==II==", "ACAAGT"),
            read(2, 0, "====", "ACGT"),
        ];
        assert_eq!(Fuse::new(&reads, 3).unwrap().consensus(), "ACGT");
    }

    #[test]
    fn test_collect_insertions_requires_majority() {
        let reads = vec![
            read(0, 0, "==III==", "ACAAAGT"),
            read(1, 0, "====", "ACGT"),
        ];
        let msa = MsaByColumn::from_rows(&MsaByRow::new(&reads)).unwrap();
        assert!(collect_insertions(&msa).is_empty());
    }

    #[test]
    fn test_select_insertion_windows() {
        let mut map = candidates(&[(10, "AAA", 5), (12, "CCC", 9), (16, "GGG", 9), (17, "TTT", 2)]);

        assert_eq!(select_insertion(&mut map), Some((12, "CCC".to_string())));
        // window [7, 17) removed 10, 12 and 16
        assert_eq!(map, candidates(&[(17, "TTT", 2)]));
        assert_eq!(select_insertion(&mut map), Some((17, "TTT".to_string())));
        assert!(map.is_empty());
        assert_eq!(select_insertion(&mut map), None);
    }

    #[test]
    fn test_select_insertion_near_origin() {
        let mut map = candidates(&[(2, "AAA", 3), (30, "CCC", 1)]);
        assert_eq!(select_insertion(&mut map), Some((2, "AAA".to_string())));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_pad_is_skipped() {
        let reads = vec![read(0, 0, "=P=", "A*C")];
        assert_eq!(Fuse::new(&reads, 1).unwrap().consensus(), "AC");
        assert_eq!(reads[0].bases[1].cigar, Kind::Pad);
    }
}
