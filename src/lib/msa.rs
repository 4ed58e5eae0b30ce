//! Multiple sequence alignment of reads against a shared reference window.
//!
//! [`MsaByRow`] lays every [`ArrayRead`] out on the window `[begin_pos, end_pos)` (1-based),
//! one character per reference column plus a side table of insertions. [`MsaByColumn`]
//! transposes that into per-column nucleotide and insertion counts.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result, bail};
use fgoxide::io::DelimFile;
use noodles::sam::alignment::record::cigar::op::Kind;
use serde::Serialize;

use crate::array_read::{ArrayRead, QvThresholds};
use crate::dna::{GAP_TAG, NUM_NUCLEOTIDES, is_coding_codon, nucleotide_to_tag};

/// Significance level for reporting indels and insertions.
pub const INDEL_ALPHA: f64 = 0.01;

/// One read laid out on the MSA window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsaRow {
    pub name: String,
    pub chemistry: String,
    /// One slot per window column; `' '` where the read does not reach.
    pub bases: Vec<u8>,
    /// Inserted bases keyed by the window index of the column that follows them.
    pub insertions: BTreeMap<usize, String>,
}

impl MsaRow {
    fn new(name: &str, chemistry: &str, width: usize) -> Self {
        Self {
            name: name.to_string(),
            chemistry: chemistry.to_string(),
            bases: vec![b' '; width],
            insertions: BTreeMap::new(),
        }
    }

    /// Up to three bases starting at `win_pos`; indices outside the row are skipped.
    #[must_use]
    pub fn codon_at(&self, win_pos: usize) -> String {
        self.bases.iter().skip(win_pos).take(3).map(|&b| char::from(b)).collect()
    }

    /// The codon at `win_pos` if the read fully covers it without gaps and it translates.
    #[must_use]
    pub fn coding_codon_at(&self, win_pos: usize) -> Option<String> {
        let codon = self.bases.get(win_pos..win_pos + 3)?;
        if codon.iter().any(|&b| b == b' ' || b == b'-') || !is_coding_codon(codon) {
            return None;
        }
        Some(String::from_utf8_lossy(codon).into_owned())
    }
}

/// Reads laid out row by row.
#[derive(Debug, Clone, Default)]
pub struct MsaByRow {
    /// 1-based first column.
    pub begin_pos: usize,
    /// 1-based exclusive end.
    pub end_pos: usize,
    pub rows: Vec<MsaRow>,
    name_to_row: HashMap<String, usize>,
}

impl MsaByRow {
    /// Lay out `reads` without QV filtering.
    #[must_use]
    pub fn new(reads: &[ArrayRead]) -> Self {
        Self::with_thresholds(reads, &QvThresholds::default())
    }

    /// Lay out `reads`, writing `N` for aligned bases that fail `thresholds`.
    #[must_use]
    pub fn with_thresholds(reads: &[ArrayRead], thresholds: &QvThresholds) -> Self {
        let begin = reads.iter().map(|r| r.reference_start).min().unwrap_or(0);
        let end = reads.iter().map(|r| r.reference_end).max().unwrap_or(0).max(begin);

        let mut msa = Self {
            begin_pos: begin + 1,
            end_pos: end + 1,
            rows: Vec::with_capacity(reads.len()),
            name_to_row: HashMap::with_capacity(reads.len()),
        };
        for read in reads {
            let row = msa.layout(read, thresholds);
            msa.name_to_row.insert(read.name.clone(), msa.rows.len());
            msa.rows.push(row);
        }
        msa
    }

    fn layout(&self, read: &ArrayRead, thresholds: &QvThresholds) -> MsaRow {
        let mut row = MsaRow::new(&read.name, &read.chemistry, self.width());
        let mut pos = read.reference_start + 1 - self.begin_pos;
        let mut insertion = String::new();

        let flush = |insertion: &mut String, pos: usize, row: &mut MsaRow| {
            if !insertion.is_empty() {
                row.insertions.insert(pos, std::mem::take(insertion));
            }
        };

        for base in &read.bases {
            match base.cigar {
                Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => {
                    flush(&mut insertion, pos, &mut row);
                    let called =
                        if base.meets_thresholds(thresholds) { base.nucleotide } else { b'N' };
                    if let Some(slot) = row.bases.get_mut(pos) {
                        *slot = called;
                    }
                    pos += 1;
                }
                Kind::Deletion | Kind::Skip => {
                    flush(&mut insertion, pos, &mut row);
                    if let Some(slot) = row.bases.get_mut(pos) {
                        *slot = b'-';
                    }
                    pos += 1;
                }
                Kind::Insertion => insertion.push(char::from(base.nucleotide)),
                Kind::Pad | Kind::SoftClip | Kind::HardClip => {
                    flush(&mut insertion, pos, &mut row);
                }
            }
        }
        row
    }

    /// Number of window columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.end_pos - self.begin_pos
    }

    #[must_use]
    pub fn row_by_name(&self, name: &str) -> Option<&MsaRow> {
        self.name_to_row.get(name).map(|&i| &self.rows[i])
    }

    /// Counts of coding codons across rows at window index `win_pos`.
    #[must_use]
    pub fn codons_at(&self, win_pos: usize) -> BTreeMap<String, usize> {
        let mut codons = BTreeMap::new();
        for codon in self.rows.iter().filter_map(|row| row.coding_codon_at(win_pos)) {
            *codons.entry(codon).or_insert(0) += 1;
        }
        codons
    }
}

/// Per-nucleotide test outcome attached to a column.
#[derive(Debug, Clone, PartialEq)]
pub struct FisherResult {
    pub p_values: [f64; NUM_NUCLEOTIDES],
    pub mask: [bool; NUM_NUCLEOTIDES],
    pub hit: bool,
    pub arg_max: usize,
}

impl Default for FisherResult {
    fn default() -> Self {
        Self {
            p_values: [1.0; NUM_NUCLEOTIDES],
            mask: [false; NUM_NUCLEOTIDES],
            hit: false,
            arg_max: 0,
        }
    }
}

/// Nucleotide and insertion counts of one reference column.
#[derive(Debug, Clone, PartialEq)]
pub struct MsaColumn {
    /// 1-based reference position.
    pub ref_pos: usize,
    pub counts: [usize; NUM_NUCLEOTIDES],
    pub insertions: BTreeMap<String, usize>,
    pub fisher: FisherResult,
    pub insertion_p_values: BTreeMap<String, f64>,
}

impl MsaColumn {
    #[must_use]
    pub fn new(ref_pos: usize) -> Self {
        Self {
            ref_pos,
            counts: [0; NUM_NUCLEOTIDES],
            insertions: BTreeMap::new(),
            fisher: FisherResult::default(),
            insertion_p_values: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn coverage(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Count of a nucleotide, 0 for anything outside `ACGT-N`.
    #[must_use]
    pub fn count(&self, base: u8) -> usize {
        nucleotide_to_tag(base).map_or(0, |tag| self.counts[tag])
    }

    /// Relative abundance of `base`; NaN on an empty column.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frequency(&self, base: u8) -> f64 {
        self.count(base) as f64 / self.coverage() as f64
    }

    /// Tag of the first most frequent nucleotide.
    #[must_use]
    pub fn max_element(&self) -> usize {
        let max = self.counts.iter().copied().max().unwrap_or(0);
        self.counts.iter().position(|&c| c == max).unwrap_or(0)
    }

    /// The most frequent nucleotide; `' '` when `N` wins.
    #[must_use]
    pub fn max_base(&self) -> u8 {
        match self.max_element() {
            5 => b' ',
            tag => crate::dna::tag_to_nucleotide(tag),
        }
    }

    /// Count of the most frequent nucleotide.
    #[must_use]
    pub fn max(&self) -> usize {
        self.counts[self.max_element()]
    }

    #[must_use]
    pub fn p_value(&self, base: u8) -> f64 {
        nucleotide_to_tag(base).map_or(1.0, |tag| self.fisher.p_values[tag])
    }

    pub fn add_fisher_result(&mut self, result: FisherResult) {
        self.fisher = result;
    }

    pub fn add_insertion_p_values(&mut self, p_values: BTreeMap<String, f64>) {
        self.insertion_p_values = p_values;
    }

    /// Insertions with a p-value below [`INDEL_ALPHA`].
    #[must_use]
    pub fn significant_insertions(&self) -> Vec<String> {
        self.insertion_p_values
            .iter()
            .filter(|&(_, &p)| p < INDEL_ALPHA)
            .map(|(seq, _)| seq.clone())
            .collect()
    }

    /// Whether a deletion or an insertion at this column passed [`INDEL_ALPHA`].
    #[must_use]
    pub fn has_significant_indel(&self) -> bool {
        self.fisher.mask[GAP_TAG] || self.insertion_p_values.values().any(|&p| p < INDEL_ALPHA)
    }

    /// Tab-separated line of the significant deletion and insertions at this column.
    #[must_use]
    pub fn indel_summary(&self) -> String {
        let mut line = format!("{}\t", self.ref_pos);
        if self.fisher.mask[GAP_TAG] {
            let (count, p) = (self.counts[GAP_TAG], self.fisher.p_values[GAP_TAG]);
            let _ = write!(line, "(-,{count},{p})\t");
        }
        for (seq, &p) in &self.insertion_p_values {
            if p < INDEL_ALPHA {
                let count = self.insertions.get(seq).copied().unwrap_or(0);
                let _ = write!(line, "({seq},{count},{p})\t");
            }
        }
        line
    }
}

/// Columns of an [`MsaByRow`].
#[derive(Debug, Clone, Default)]
pub struct MsaByColumn {
    /// 0-based first reference position.
    begin: usize,
    /// 0-based exclusive end.
    end: usize,
    columns: Vec<MsaColumn>,
}

impl MsaByColumn {
    /// Tally the rows of `msa`.
    ///
    /// # Errors
    /// Returns an error if a row holds a character other than `ACGT-N` or space.
    pub fn from_rows(msa: &MsaByRow) -> Result<Self> {
        let mut columns: Vec<MsaColumn> =
            (msa.begin_pos..msa.end_pos).map(MsaColumn::new).collect();

        for row in &msa.rows {
            for (column, &base) in columns.iter_mut().zip(&row.bases) {
                if base == b' ' {
                    continue;
                }
                let Some(tag) = nucleotide_to_tag(base) else {
                    bail!("Unexpected base '{}' in read {}", char::from(base), row.name);
                };
                column.counts[tag] += 1;
            }
            for (&win_pos, seq) in &row.insertions {
                if let Some(column) = columns.get_mut(win_pos) {
                    *column.insertions.entry(seq.clone()).or_insert(0) += 1;
                }
            }
        }

        Ok(Self { begin: msa.begin_pos - 1, end: msa.end_pos - 1, columns })
    }

    /// Whether the 0-based reference position is inside the window.
    #[must_use]
    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.begin && pos < self.end
    }

    /// Column at a 0-based reference position.
    #[must_use]
    pub fn get(&self, pos: usize) -> Option<&MsaColumn> {
        if self.contains(pos) { self.columns.get(pos - self.begin) } else { None }
    }

    pub fn get_mut(&mut self, pos: usize) -> Option<&mut MsaColumn> {
        if self.contains(pos) { self.columns.get_mut(pos - self.begin) } else { None }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MsaColumn> {
        self.columns.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, MsaColumn> {
        self.columns.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Write per-column counts as TSV with the header `pos A C G T - N`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_counts<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let rows: Vec<ColumnCounts> = self.iter().map(ColumnCounts::from).collect();
        DelimFile::default()
            .write_tsv(&path, rows)
            .with_context(|| format!("Failed to write MSA counts: {}", path.display()))
    }
}

impl<'a> IntoIterator for &'a MsaByColumn {
    type Item = &'a MsaColumn;
    type IntoIter = std::slice::Iter<'a, MsaColumn>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

#[derive(Debug, Serialize)]
struct ColumnCounts {
    pos: usize,
    #[serde(rename = "A")]
    a: usize,
    #[serde(rename = "C")]
    c: usize,
    #[serde(rename = "G")]
    g: usize,
    #[serde(rename = "T")]
    t: usize,
    #[serde(rename = "-")]
    gap: usize,
    #[serde(rename = "N")]
    n: usize,
}

impl From<&MsaColumn> for ColumnCounts {
    fn from(column: &MsaColumn) -> Self {
        let [a, c, g, t, gap, n] = column.counts;
        Self { pos: column.ref_pos, a, c, g, t, gap, n }
    }
}
