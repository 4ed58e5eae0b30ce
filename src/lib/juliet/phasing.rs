//! Haplotype reconstruction over reported variant positions.
//!
//! Each read contributes the vector of its codons at every variant position. Identical
//! vectors are collapsed into one haplotype. Haplotypes with gaps, ambiguous bases, partial
//! coverage, unexpected codons or too few reads are counted but not reported.

use std::collections::HashMap;

use log::{Level, log};
use serde::Serialize;
use serde::ser::SerializeStruct;

use crate::juliet::caller::VariantGene;
use crate::logging::format_percent;
use crate::msa::MsaByRow;

/// A codon contains a deletion.
pub const WITH_GAP: u8 = 1;
/// A codon contains an ambiguous base.
pub const WITH_HETERODUPLEX: u8 = 2;
/// The read does not cover every variant position.
pub const PARTIAL: u8 = 4;
/// Fewer than [`MIN_HAPLOTYPE_READS`] reads.
pub const LOW_COV: u8 = 8;
/// A codon is neither the reference nor a reported variant.
pub const OFFTARGET: u8 = 16;

/// Reads needed for a haplotype to be reported.
pub const MIN_HAPLOTYPE_READS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Haplotype {
    pub name: String,
    pub read_names: Vec<String>,
    /// One codon per variant position.
    pub codons: Vec<String>,
    pub flags: u8,
    pub frequency: f64,
}

impl Haplotype {
    fn new(codons: Vec<String>, flags: u8) -> Self {
        Self { name: String::new(), read_names: Vec::new(), codons, flags, frequency: 0.0 }
    }

    /// Number of reads.
    #[must_use]
    pub fn size(&self) -> usize {
        self.read_names.len()
    }

    #[must_use]
    pub fn is_generator(&self) -> bool {
        self.flags == 0
    }
}

impl Serialize for Haplotype {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Haplotype", 6)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("reads_hard", &self.read_names.len())?;
        state.serialize_field("reads_soft", &self.size())?;
        state.serialize_field("frequency", &self.frequency)?;
        state.serialize_field("read_names", &self.read_names)?;
        state.serialize_field("codons", &self.codons)?;
        state.end()
    }
}

/// Reads per haplotype category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HaplotypeReadCounts {
    pub healthy_reported: usize,
    pub healthy_low_coverage: usize,
    pub all_damaged: usize,
    pub marginal_with_gaps: usize,
    pub marginal_with_heteroduplexes: usize,
    pub marginal_partial_reads: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhasedHaplotypes {
    /// Reported haplotypes, most abundant first.
    pub haplotypes: Vec<Haplotype>,
    /// Haplotypes with at least one flag.
    pub filtered: Vec<Haplotype>,
    pub read_counts: HaplotypeReadCounts,
}

fn codon_flags(codon: &str) -> u8 {
    let mut flags = 0;
    if codon.len() < 3 {
        flags |= PARTIAL;
    }
    for base in codon.bytes() {
        match base {
            b'-' => flags |= WITH_GAP,
            b'N' => flags |= WITH_HETERODUPLEX,
            b' ' => flags |= PARTIAL,
            _ => {}
        }
    }
    flags
}

/// `A`..`Z`, or `Aa`, `Ab`, ... when there are more than 26 haplotypes.
fn haplotype_name(index: usize, count: usize) -> String {
    const LETTERS: usize = 26;
    let letter = |base: u8, offset: usize| char::from(base + (offset % LETTERS) as u8);
    if count > LETTERS {
        [letter(b'A', index / LETTERS), letter(b'a', index % LETTERS)].iter().collect()
    } else {
        letter(b'A', index).to_string()
    }
}

/// Phase the rows of `msa` over the variant positions of `genes`, recording on every variant
/// codon which reported haplotype carries it.
pub fn phase_variants(
    msa: &MsaByRow,
    genes: &mut [VariantGene],
    verbose: bool,
) -> PhasedHaplotypes {
    let mut haplotypes: Vec<Haplotype> = Vec::new();
    let mut by_codons: HashMap<Vec<String>, usize> = HashMap::new();
    {
        // without variant positions every read collapses into one empty haplotype
        let positions: Vec<_> = genes.iter().flat_map(|g| g.variant_positions.iter()).collect();
        for row in &msa.rows {
            let mut flags = 0;
            let codons: Vec<String> = positions
                .iter()
                .map(|position| {
                    let codon = row.codon_at(position.window_pos);
                    if !position.is_hit(&codon) {
                        flags |= OFFTARGET;
                    }
                    flags |= codon_flags(&codon);
                    codon
                })
                .collect();

            let index = *by_codons.entry(codons.clone()).or_insert_with(|| {
                haplotypes.push(Haplotype::new(codons, flags));
                haplotypes.len() - 1
            });
            haplotypes[index].read_names.push(row.name.clone());
        }
    }

    let (mut generators, mut filtered): (Vec<_>, Vec<_>) = haplotypes
        .into_iter()
        .map(|mut h| {
            if h.size() < MIN_HAPLOTYPE_READS {
                h.flags |= LOW_COV;
            }
            h
        })
        .partition(Haplotype::is_generator);

    generators.sort_by(|a, b| b.size().cmp(&a.size()));
    let total: usize = generators.iter().map(Haplotype::size).sum();
    let count = generators.len();
    for (i, haplotype) in generators.iter_mut().enumerate() {
        haplotype.name = haplotype_name(i, count);
        haplotype.frequency = haplotype.size() as f64 / total as f64;
    }

    let positions = genes.iter_mut().flat_map(|g| g.variant_positions.iter_mut());
    for (k, position) in positions.enumerate() {
        for codon in position.variant_codons_mut() {
            codon.haplotype_hit = generators.iter().map(|h| h.codons[k] == codon.codon).collect();
        }
    }

    let mut read_counts = HaplotypeReadCounts { healthy_reported: total, ..Default::default() };
    for haplotype in &filtered {
        let size = haplotype.size();
        if haplotype.flags == LOW_COV {
            read_counts.healthy_low_coverage += size;
        }
        if haplotype.flags & OFFTARGET != 0 {
            read_counts.all_damaged += size;
        }
        if haplotype.flags & WITH_GAP != 0 {
            read_counts.marginal_with_gaps += size;
        }
        if haplotype.flags & WITH_HETERODUPLEX != 0 {
            read_counts.marginal_with_heteroduplexes += size;
        }
        if haplotype.flags & PARTIAL != 0 {
            read_counts.marginal_partial_reads += size;
        }
    }

    let level = if verbose { Level::Info } else { Level::Debug };
    for haplotype in &generators {
        log!(
            level,
            "Haplotype {}: {} reads ({}) {}",
            haplotype.name,
            haplotype.size(),
            format_percent(haplotype.frequency, 2),
            haplotype.codons.join(" ")
        );
    }
    log!(level, "Haplotype read counts: {read_counts:?}");

    filtered.sort_by(|a, b| b.size().cmp(&a.size()));
    PhasedHaplotypes { haplotypes: generators, filtered, read_counts }
}
