//! SAM/BAM record utilities.
//!
//! This module provides:
//! - CIGAR expansion into one operation per base and run-length collapsing back
//! - Conversions between CIGAR operation kinds and their SAM characters
//! - Tag accessors for the PacBio per-base QV strings
//! - Test utilities for building SAM/BAM records (see [`builder`])

pub mod builder;

pub use builder::{RecordBuilder, parse_cigar, single_reference_header};

use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::Cigar;
use noodles::sam::alignment::record_buf::data::field::Value;

/// SAM character for a CIGAR operation kind.
#[must_use]
pub fn kind_to_char(kind: Kind) -> u8 {
    match kind {
        Kind::Match => b'M',
        Kind::Insertion => b'I',
        Kind::Deletion => b'D',
        Kind::Skip => b'N',
        Kind::SoftClip => b'S',
        Kind::HardClip => b'H',
        Kind::Pad => b'P',
        Kind::SequenceMatch => b'=',
        Kind::SequenceMismatch => b'X',
    }
}

/// CIGAR operation kind for a SAM character, if it is one.
#[must_use]
pub fn char_to_kind(c: u8) -> Option<Kind> {
    match c {
        b'M' => Some(Kind::Match),
        b'I' => Some(Kind::Insertion),
        b'D' => Some(Kind::Deletion),
        b'N' => Some(Kind::Skip),
        b'S' => Some(Kind::SoftClip),
        b'H' => Some(Kind::HardClip),
        b'P' => Some(Kind::Pad),
        b'=' => Some(Kind::SequenceMatch),
        b'X' => Some(Kind::SequenceMismatch),
        _ => None,
    }
}

/// Expand a record's CIGAR into one kind per operation position, clips included.
#[must_use]
pub fn expand_cigar(record: &RecordBuf) -> Vec<Kind> {
    record
        .cigar()
        .as_ref()
        .iter()
        .flat_map(|op| std::iter::repeat_n(op.kind(), op.len()))
        .collect()
}

/// Collapse per-position operations into a run-length CIGAR.
#[must_use]
pub fn collapse_ops(ops: &[Kind]) -> Vec<(Kind, usize)> {
    let mut runs: Vec<(Kind, usize)> = Vec::new();
    for &kind in ops {
        match runs.last_mut() {
            Some((last, len)) if *last == kind => *len += 1,
            _ => runs.push((kind, 1)),
        }
    }
    runs
}

/// Build a record CIGAR from `(kind, length)` runs, dropping zero-length runs.
#[must_use]
pub fn to_cigar(runs: &[(Kind, usize)]) -> Cigar {
    runs.iter().filter(|(_, len)| *len > 0).map(|&(kind, len)| Op::new(kind, len)).collect()
}

/// Render `(kind, length)` runs as a CIGAR string.
#[must_use]
pub fn cigar_string(runs: &[(Kind, usize)]) -> String {
    runs.iter().map(|&(kind, len)| format!("{len}{}", char::from(kind_to_char(kind)))).collect()
}

/// Number of query bases consumed by `(kind, length)` runs.
#[must_use]
pub fn query_length(runs: &[(Kind, usize)]) -> usize {
    runs.iter().filter(|(kind, _)| kind.consumes_read()).map(|(_, len)| *len).sum()
}

/// True for records that are placed as the primary alignment of a read.
#[must_use]
pub fn is_primary_mapped(record: &RecordBuf) -> bool {
    let flags: Flags = record.flags();
    !flags.is_unmapped()
        && !flags.is_secondary()
        && !flags.is_supplementary()
        && record.alignment_start().is_some()
}

/// Query name, or an empty string for unnamed records.
#[must_use]
pub fn record_name(record: &RecordBuf) -> String {
    record.name().map(ToString::to_string).unwrap_or_default()
}

/// String value of an aux tag, if present and string typed.
#[must_use]
pub fn string_tag(record: &RecordBuf, tag: Tag) -> Option<String> {
    match record.data().get(&tag)? {
        Value::String(s) => Some(s.to_string()),
        _ => None,
    }
}

/// Decode a Phred+33 QV string tag into raw quality values.
#[must_use]
pub fn qv_tag(record: &RecordBuf, tag: Tag) -> Option<Vec<u8>> {
    string_tag(record, tag).map(|s| s.bytes().map(|b| b.saturating_sub(33)).collect())
}
