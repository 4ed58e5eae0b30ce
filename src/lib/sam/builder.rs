//! Builders for test SAM/BAM records and small fixture files.
//!
//! ## Examples
//!
//! ```rust
//! use minorseq_lib::sam::builder::RecordBuilder;
//!
//! let record = RecordBuilder::new()
//!     .name("read1")
//!     .sequence("ACGTACGT")
//!     .reference_sequence_id(0)
//!     .alignment_start(100)
//!     .cigar("4=1I3=")
//!     .build();
//! assert_eq!(record.sequence().len(), 8);
//! ```

use anyhow::Result;
use bstr::BString;
use noodles::core::Position;
use noodles::sam::Header;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value as BufValue;
use noodles::sam::alignment::record_buf::{QualityScores, RecordBuf, Sequence};
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::read_group::tag as rg_tag;
use noodles::sam::header::record::value::map::{ReadGroup, ReferenceSequence};
use std::num::NonZeroUsize;
use std::path::Path;

use crate::bam_io::{create_bam_writer, finish_bam_writer};

/// Base quality assigned when none is given.
pub const DEFAULT_BASE_QUALITY: u8 = 30;

/// Parses a CIGAR string into operations.
///
/// # Panics
///
/// Panics on malformed CIGAR strings; intended for test fixtures only.
#[must_use]
pub fn parse_cigar(cigar_str: &str) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut num_str = String::new();

    for c in cigar_str.chars() {
        if c.is_ascii_digit() {
            num_str.push(c);
        } else {
            let len: usize = num_str.parse().expect("Invalid CIGAR: expected number");
            let kind = u8::try_from(c)
                .ok()
                .and_then(super::char_to_kind)
                .unwrap_or_else(|| panic!("Unknown CIGAR operation: {c}"));
            ops.push(Op::new(kind, len));
            num_str.clear();
        }
    }

    ops
}

fn cigar_seq_len(cigar: &str) -> usize {
    parse_cigar(cigar).iter().filter(|op| op.kind().consumes_read()).map(|op| op.len()).sum()
}

/// Header with one reference sequence.
///
/// # Panics
///
/// Panics if `length` is zero.
#[must_use]
pub fn single_reference_header(name: &str, length: usize) -> Header {
    let map = Map::<ReferenceSequence>::new(NonZeroUsize::new(length).expect("length must be > 0"));
    Header::builder().add_reference_sequence(BString::from(name), map).build()
}

/// Header with one reference sequence and one read group carrying a PacBio description.
///
/// # Panics
///
/// Panics if `length` is zero.
#[must_use]
pub fn header_with_read_group(name: &str, length: usize, rg_id: &str, description: &str) -> Header {
    let map = Map::<ReferenceSequence>::new(NonZeroUsize::new(length).expect("length must be > 0"));
    let rg = Map::<ReadGroup>::builder()
        .insert(rg_tag::DESCRIPTION, description)
        .build()
        .expect("valid read group");
    Header::builder()
        .add_reference_sequence(BString::from(name), map)
        .add_read_group(BString::from(rg_id), rg)
        .build()
}

/// Write records to a BAM file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_bam(path: &Path, header: &Header, records: &[RecordBuf]) -> Result<()> {
    let mut writer = create_bam_writer(path, header, 1)?;
    for record in records {
        writer.write_alignment_record(header, record)?;
    }
    finish_bam_writer(writer)
}

/// Write `(name, sequence)` pairs to a FASTA file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_fasta(path: &Path, records: &[(&str, &str)]) -> Result<()> {
    let mut contents = String::new();
    for (name, seq) in records {
        contents.push('>');
        contents.push_str(name);
        contents.push('\n');
        contents.push_str(seq);
        contents.push('\n');
    }
    std::fs::write(path, contents)?;
    Ok(())
}

/// Builder for individual records without header management.
#[derive(Debug)]
pub struct RecordBuilder {
    name: Option<Vec<u8>>,
    flags: Flags,
    reference_sequence_id: Option<usize>,
    alignment_start: Option<usize>,
    mapping_quality: Option<u8>,
    cigar: Option<String>,
    sequence: Vec<u8>,
    qualities: Vec<u8>,
    tags: Vec<(Tag, BufValue)>,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: None,
            flags: Flags::empty(),
            reference_sequence_id: None,
            alignment_start: None,
            mapping_quality: Some(60),
            cigar: None,
            sequence: Vec::new(),
            qualities: Vec::new(),
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.as_bytes().to_vec());
        self
    }

    #[must_use]
    pub fn sequence(mut self, seq: &str) -> Self {
        self.sequence = seq.as_bytes().to_vec();
        self
    }

    #[must_use]
    pub fn qualities(mut self, quals: &[u8]) -> Self {
        self.qualities = quals.to_vec();
        self
    }

    #[must_use]
    pub fn unmapped(mut self, unmapped: bool) -> Self {
        self.flags.set(Flags::UNMAPPED, unmapped);
        self
    }

    #[must_use]
    pub fn secondary(mut self, secondary: bool) -> Self {
        self.flags.set(Flags::SECONDARY, secondary);
        self
    }

    #[must_use]
    pub fn reference_sequence_id(mut self, id: usize) -> Self {
        self.reference_sequence_id = Some(id);
        self
    }

    /// 1-based alignment start.
    #[must_use]
    pub fn alignment_start(mut self, pos: usize) -> Self {
        self.alignment_start = Some(pos);
        self
    }

    #[must_use]
    pub fn mapping_quality(mut self, mapq: u8) -> Self {
        self.mapping_quality = Some(mapq);
        self
    }

    #[must_use]
    pub fn cigar(mut self, cigar: &str) -> Self {
        self.cigar = Some(cigar.to_string());
        self
    }

    /// Adds an aux tag; tags that are not exactly two characters are ignored.
    #[must_use]
    pub fn tag<V: Into<BufValue>>(mut self, tag: &str, value: V) -> Self {
        let tag_bytes = tag.as_bytes();
        if tag_bytes.len() == 2 {
            self.tags.push((Tag::new(tag_bytes[0], tag_bytes[1]), value.into()));
        }
        self
    }

    /// Sets the RG tag.
    #[must_use]
    pub fn read_group(self, id: &str) -> Self {
        self.tag("RG", id)
    }

    /// Builds the record.
    ///
    /// With a CIGAR and no sequence, a sequence of the right length is generated. With a
    /// sequence and no CIGAR on a placed record, an all-match CIGAR is generated.
    ///
    /// # Panics
    ///
    /// Panics if the alignment start is zero or the mapping quality is 255.
    #[must_use]
    pub fn build(self) -> RecordBuf {
        let mut record = RecordBuf::default();

        if let Some(name) = self.name {
            *record.name_mut() = Some(name.into());
        }
        *record.flags_mut() = self.flags;

        if let Some(ref_id) = self.reference_sequence_id {
            *record.reference_sequence_id_mut() = Some(ref_id);
        }
        if let Some(pos) = self.alignment_start {
            *record.alignment_start_mut() =
                Some(Position::try_from(pos).expect("alignment_start must be >= 1"));
        }
        if let Some(mapq) = self.mapping_quality {
            *record.mapping_quality_mut() = Some(
                noodles::sam::alignment::record::MappingQuality::try_from(mapq)
                    .expect("mapping_quality must be valid"),
            );
        }

        let placed = self.alignment_start.is_some() && !self.flags.is_unmapped();
        let (cigar_str, sequence) = match (self.cigar, self.sequence.is_empty()) {
            (Some(cigar), true) => {
                let generated: Vec<u8> =
                    b"ACGT".iter().copied().cycle().take(cigar_seq_len(&cigar)).collect();
                (cigar, generated)
            }
            (Some(cigar), false) => (cigar, self.sequence),
            (None, false) if placed => (format!("{}M", self.sequence.len()), self.sequence),
            (None, _) => (String::new(), self.sequence),
        };

        if !cigar_str.is_empty() {
            *record.cigar_mut() = parse_cigar(&cigar_str).into_iter().collect();
        }

        let qualities = if self.qualities.is_empty() {
            vec![DEFAULT_BASE_QUALITY; sequence.len()]
        } else {
            self.qualities
        };
        *record.sequence_mut() = Sequence::from(sequence);
        *record.quality_scores_mut() = QualityScores::from(qualities);

        for (tag, value) in self.tags {
            record.data_mut().insert(tag, value);
        }

        record
    }
}
