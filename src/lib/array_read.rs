//! Per-base view of an aligned read.
//!
//! An [`ArrayRead`] unrolls a BAM record's CIGAR into one [`ArrayBase`] per aligned position:
//! clips are excised, deletions carry `-`, padding carries `*`, and every base that came from
//! the read keeps its quality values. The MSA builders consume these instead of raw records.

use std::collections::HashMap;

use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::data::field::Tag;

use crate::sam::{is_primary_mapped, qv_tag, record_name, string_tag};

const DELETION_QV: Tag = Tag::new(b'd', b'q');
const SUBSTITUTION_QV: Tag = Tag::new(b's', b'q');
const INSERTION_QV: Tag = Tag::new(b'i', b'q');
const READ_GROUP: Tag = Tag::new(b'R', b'G');

/// Optional minimum QVs a base must meet to be called. Unset thresholds always pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QvThresholds {
    pub qual: Option<u8>,
    pub del: Option<u8>,
    pub sub: Option<u8>,
    pub ins: Option<u8>,
}

fn meets(threshold: Option<u8>, qv: Option<u8>) -> bool {
    match (threshold, qv) {
        (Some(t), Some(q)) => q >= t,
        _ => true,
    }
}

fn probability(qv: Option<u8>) -> Option<f64> {
    qv.map(|q| 1.0 - 10f64.powf(-f64::from(q) / 10.0))
}

/// One aligned position of a read.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayBase {
    pub cigar: Kind,
    pub nucleotide: u8,
    pub qual: Option<u8>,
    pub del_qv: Option<u8>,
    pub sub_qv: Option<u8>,
    pub ins_qv: Option<u8>,
}

impl ArrayBase {
    /// A base with no quality information.
    #[must_use]
    pub fn new(cigar: Kind, nucleotide: u8) -> Self {
        Self { cigar, nucleotide, qual: None, del_qv: None, sub_qv: None, ins_qv: None }
    }

    #[must_use]
    pub fn with_qual(mut self, qual: u8) -> Self {
        self.qual = Some(qual);
        self
    }

    #[must_use]
    pub fn meets_thresholds(&self, thresholds: &QvThresholds) -> bool {
        meets(thresholds.qual, self.qual)
            && meets(thresholds.del, self.del_qv)
            && meets(thresholds.sub, self.sub_qv)
            && meets(thresholds.ins, self.ins_qv)
    }

    /// Probability that the called base is correct, from the base quality.
    #[must_use]
    pub fn prob_true(&self) -> Option<f64> {
        probability(self.qual)
    }

    #[must_use]
    pub fn prob_correct_base(&self) -> Option<f64> {
        probability(self.sub_qv)
    }

    #[must_use]
    pub fn prob_no_deletion(&self) -> Option<f64> {
        probability(self.del_qv)
    }

    #[must_use]
    pub fn prob_no_insertion(&self) -> Option<f64> {
        probability(self.ins_qv)
    }

    fn consumes_reference(&self) -> bool {
        self.cigar.consumes_reference()
    }
}

/// A read unrolled into aligned positions.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayRead {
    pub index: usize,
    pub name: String,
    /// 0-based reference position of the first aligned base.
    pub reference_start: usize,
    /// 0-based exclusive reference end.
    pub reference_end: usize,
    pub chemistry: String,
    pub bases: Vec<ArrayBase>,
}

impl ArrayRead {
    /// Build from a mapped record. Returns `None` for unmapped, secondary and supplementary
    /// records, and for records whose CIGAR aligns nothing.
    ///
    /// `chemistries` maps read group IDs to chemistry names, as produced by
    /// [`crate::header::read_group_chemistries`].
    #[must_use]
    pub fn from_record(
        record: &RecordBuf,
        index: usize,
        chemistries: &HashMap<String, String>,
    ) -> Option<Self> {
        if !is_primary_mapped(record) {
            return None;
        }
        let reference_start = usize::from(record.alignment_start()?) - 1;

        let sequence = record.sequence().as_ref();
        let qualities = record.quality_scores().as_ref();
        let rich = match (
            qv_tag(record, DELETION_QV),
            qv_tag(record, SUBSTITUTION_QV),
            qv_tag(record, INSERTION_QV),
        ) {
            (Some(dq), Some(sq), Some(iq))
                if dq.len() == sequence.len()
                    && sq.len() == sequence.len()
                    && iq.len() == sequence.len() =>
            {
                Some((dq, sq, iq))
            }
            _ => None,
        };

        let mut bases = Vec::with_capacity(sequence.len());
        let mut read_pos = 0;
        for op in record.cigar().as_ref() {
            for _ in 0..op.len() {
                match op.kind() {
                    Kind::Match
                    | Kind::SequenceMatch
                    | Kind::SequenceMismatch
                    | Kind::Insertion => {
                        let nucleotide = sequence.get(read_pos).copied().unwrap_or(b'N');
                        let mut base = ArrayBase::new(op.kind(), nucleotide.to_ascii_uppercase())
                            .with_qual(qualities.get(read_pos).copied().unwrap_or(0));
                        if let Some((dq, sq, iq)) = &rich {
                            base.del_qv = Some(dq[read_pos]);
                            base.sub_qv = Some(sq[read_pos]);
                            base.ins_qv = Some(iq[read_pos]);
                        }
                        bases.push(base);
                        read_pos += 1;
                    }
                    Kind::Deletion | Kind::Skip => bases.push(ArrayBase::new(Kind::Deletion, b'-')),
                    Kind::Pad => bases.push(ArrayBase::new(Kind::Pad, b'*')),
                    Kind::SoftClip => read_pos += 1,
                    Kind::HardClip => {}
                }
            }
        }

        let aligned = bases.iter().filter(|b| b.consumes_reference()).count();
        if aligned == 0 {
            return None;
        }

        let chemistry = string_tag(record, READ_GROUP)
            .and_then(|rg| chemistries.get(&rg).cloned())
            .unwrap_or_default();

        Some(Self {
            index,
            name: record_name(record),
            reference_start,
            reference_end: reference_start + aligned,
            chemistry,
            bases,
        })
    }

    /// Restrict the read to the 1-based inclusive region `[begin, end]`.
    ///
    /// Reference-consuming positions are kept when they fall in the region. Insertions and
    /// pads are kept only when the columns on both sides of them are inside. Returns `None`
    /// when nothing of the read overlaps the region.
    #[must_use]
    pub fn clip_to_region(&self, begin: usize, end: usize) -> Option<Self> {
        // 0-based position of the next reference column
        let mut next_col = self.reference_start;
        let mut kept = Vec::new();
        let mut first_col = None;
        let mut last_col = None;

        for base in &self.bases {
            if base.consumes_reference() {
                let one_based = next_col + 1;
                if one_based >= begin && one_based <= end {
                    first_col.get_or_insert(next_col);
                    last_col = Some(next_col);
                    kept.push(base.clone());
                }
                next_col += 1;
            } else if next_col >= begin && next_col < end {
                // column `next_col` (1-based) precedes and `next_col + 1` follows
                kept.push(base.clone());
            }
        }

        let (first, last) = (first_col?, last_col?);
        // trim non-reference bases that precede the first kept column
        let lead = kept.iter().take_while(|b| !b.consumes_reference()).count();
        let trail = kept.iter().rev().take_while(|b| !b.consumes_reference()).count();
        let bases = kept[lead..kept.len() - trail].to_vec();

        Some(Self {
            index: self.index,
            name: self.name.clone(),
            reference_start: first,
            reference_end: last + 1,
            chemistry: self.chemistry.clone(),
            bases,
        })
    }
}

/// Build array reads from records, keeping those placed on the reference.
#[must_use]
pub fn array_reads_from_records(
    records: &[RecordBuf],
    chemistries: &HashMap<String, String>,
) -> Vec<ArrayRead> {
    records
        .iter()
        .filter_map(|record| ArrayRead::from_record(record, 0, chemistries))
        .enumerate()
        .map(|(index, mut read)| {
            read.index = index;
            read
        })
        .collect()
}
