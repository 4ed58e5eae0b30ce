//! Amino-acid level minor variant calling.
//!
//! Every codon position of every gene is tested: the observed count of each non-reference
//! codon is compared against the count the error model predicts from sequencing errors of
//! the reference codon, using Fisher's exact test with a Bonferroni correction over all
//! tested codons.

use std::collections::BTreeMap;

use anyhow::Result;
use log::{debug, info};
use serde::Serialize;

use crate::array_read::ArrayRead;
use crate::dna::{GAP_TAG, NUM_NUCLEOTIDES, amino_acid, is_coding_codon};
use crate::errors::MinorseqError;
use crate::juliet::error_estimates::ErrorEstimates;
use crate::juliet::phasing::{Haplotype, HaplotypeReadCounts, phase_variants};
use crate::juliet::target_config::{DMutation, TargetConfig, TargetGene};
use crate::msa::{FisherResult, INDEL_ALPHA, MsaByColumn, MsaByRow, MsaColumn};
use crate::stats::{ceil_count, fisher_exact_two_sided};

/// Significance level after multiple-testing correction.
pub const ALPHA: f64 = 0.01;

/// Name of the single gene used when the config defines none.
pub const UNNAMED_ORF: &str = "Unnamed ORF";

/// A codon above this frequency is considered the site's consensus, not a minor.
const MAX_VARIABLE_FREQUENCY: f64 = 0.8;

/// Positions around a codon start, relative to it, reported with each variant.
const MSA_CONTEXT: std::ops::RangeInclusive<isize> = -3..=5;

/// Reporting thresholds and modes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallerSettings {
    /// Minimum codon frequency in percent.
    pub min_perc: f64,
    /// Majority codons above this percentage become the alternative reference.
    pub max_perc: f64,
    /// Only report mutations listed as drug resistant.
    pub drm_only: bool,
    /// Report every observed codon regardless of significance.
    pub debug: bool,
    pub verbose: bool,
}

impl Default for CallerSettings {
    fn default() -> Self {
        Self { min_perc: 0.1, max_perc: 100.0, drm_only: false, debug: false, verbose: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantCodon {
    pub codon: String,
    pub frequency: f64,
    #[serde(rename = "pValue")]
    pub p_value: f64,
    pub known_drm: String,
    /// One flag per reported haplotype, set when the haplotype carries this codon.
    pub haplotype_hit: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantAminoAcid {
    pub amino_acid: char,
    pub variant_codons: Vec<VariantCodon>,
}

/// Nucleotide counts of one MSA column next to a variant codon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MsaCount {
    /// Offset from the codon start.
    pub rel_pos: isize,
    /// 0-based reference position.
    pub abs_pos: usize,
    #[serde(rename = "A")]
    pub a: usize,
    #[serde(rename = "C")]
    pub c: usize,
    #[serde(rename = "G")]
    pub g: usize,
    #[serde(rename = "T")]
    pub t: usize,
    #[serde(rename = "-")]
    pub gap: usize,
    #[serde(rename = "N")]
    pub n: usize,
    /// Reference base, or the column's majority base without a reference.
    pub wt: char,
}

impl MsaCount {
    fn new(rel_pos: isize, abs_pos: usize, column: &MsaColumn, wt: u8) -> Self {
        let [a, c, g, t, gap, n]: [usize; NUM_NUCLEOTIDES] = column.counts;
        Self { rel_pos, abs_pos, a, c, g, t, gap, n, wt: char::from(wt) }
    }

    /// Count of a nucleotide in `ACGT-N` order.
    #[must_use]
    pub fn counts(&self) -> [usize; NUM_NUCLEOTIDES] {
        [self.a, self.c, self.g, self.t, self.gap, self.n]
    }
}

/// A codon position with at least one reported variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantPosition {
    pub ref_codon: String,
    pub ref_amino_acid: char,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_ref_codon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_ref_amino_acid: Option<char>,
    /// 1-based amino-acid position within the gene.
    pub ref_position: usize,
    pub coverage: usize,
    pub msa: Vec<MsaCount>,
    /// Sorted by amino acid.
    pub variant_amino_acids: Vec<VariantAminoAcid>,
    /// Window index of the codon start in the MSA.
    #[serde(skip)]
    pub window_pos: usize,
}

impl VariantPosition {
    fn new(ref_codon: String, ref_amino_acid: char, ref_position: usize, window_pos: usize) -> Self {
        Self {
            ref_codon,
            ref_amino_acid,
            alt_ref_codon: None,
            alt_ref_amino_acid: None,
            ref_position,
            coverage: 0,
            msa: Vec::new(),
            variant_amino_acids: Vec::new(),
            window_pos,
        }
    }

    fn push_codon(&mut self, amino_acid: char, codon: VariantCodon) {
        match self.variant_amino_acids.binary_search_by(|v| v.amino_acid.cmp(&amino_acid)) {
            Ok(i) => self.variant_amino_acids[i].variant_codons.push(codon),
            Err(i) => self
                .variant_amino_acids
                .insert(i, VariantAminoAcid { amino_acid, variant_codons: vec![codon] }),
        }
    }

    #[must_use]
    pub fn is_variant(&self) -> bool {
        !self.variant_amino_acids.is_empty()
    }

    pub fn variant_codons(&self) -> impl Iterator<Item = &VariantCodon> {
        self.variant_amino_acids.iter().flat_map(|aa| aa.variant_codons.iter())
    }

    pub fn variant_codons_mut(&mut self) -> impl Iterator<Item = &mut VariantCodon> {
        self.variant_amino_acids.iter_mut().flat_map(|aa| aa.variant_codons.iter_mut())
    }

    /// Whether `codon` is the reference, the alternative reference or a reported variant.
    #[must_use]
    pub fn is_hit(&self, codon: &str) -> bool {
        self.ref_codon == codon
            || self.alt_ref_codon.as_deref() == Some(codon)
            || self.variant_codons().any(|v| v.codon == codon)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantGene {
    pub name: String,
    pub variant_positions: Vec<VariantPosition>,
}

/// Confusion counts against the expected minors of the target config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerformanceMetrics {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl PerformanceMetrics {
    fn record(&mut self, variable: bool, predictor: bool, significant: bool) {
        match (predictor, significant) {
            (true, true) => self.true_positives += 1,
            (true, false) => self.false_negatives += 1,
            (false, true) if variable => self.false_positives += 1,
            (false, false) if variable => self.true_negatives += 1,
            (false, _) => {}
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn validation(&self, num_tests: usize) -> ValidationMetrics {
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        ValidationMetrics {
            true_positive_rate: ratio(
                self.true_positives,
                self.true_positives + self.false_negatives,
            ),
            false_positive_rate: ratio(
                self.false_positives,
                self.false_positives + self.true_negatives,
            ),
            num_tests,
            num_false_positives: self.false_positives,
            accuracy: ratio(self.true_positives + self.true_negatives, self.total()),
        }
    }
}

/// Contents of `validation.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationMetrics {
    pub true_positive_rate: f64,
    pub false_positive_rate: f64,
    pub num_tests: usize,
    pub num_false_positives: usize,
    pub accuracy: f64,
}

/// The JSON report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JulietReport {
    /// Genes with at least one variant position.
    pub genes: Vec<VariantGene>,
    pub haplotypes: Vec<Haplotype>,
    pub haplotype_read_counts: HaplotypeReadCounts,
}

impl JulietReport {
    /// Pretty printed JSON with two-space indentation.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Calls amino-acid variants on an MSA of reads and optionally phases them.
#[derive(Debug)]
pub struct AminoAcidCaller {
    msa_by_row: MsaByRow,
    msa_by_column: MsaByColumn,
    error: ErrorEstimates,
    config: TargetConfig,
    settings: CallerSettings,
    genes: Vec<TargetGene>,
    number_of_tests: usize,
    variant_genes: Vec<VariantGene>,
    performance: PerformanceMetrics,
    haplotypes: Vec<Haplotype>,
    read_counts: HaplotypeReadCounts,
}

impl AminoAcidCaller {
    /// Lay out `reads` and call variants.
    ///
    /// # Errors
    /// Returns [`MinorseqError::EmptyInput`] when `reads` is empty, or an error if the MSA
    /// cannot be tallied.
    pub fn new(
        reads: &[ArrayRead],
        error: ErrorEstimates,
        config: TargetConfig,
        settings: CallerSettings,
    ) -> Result<Self> {
        if reads.is_empty() {
            return Err(MinorseqError::EmptyInput { context: "No reads to call".to_string() }.into());
        }
        let msa_by_row = MsaByRow::new(reads);
        let mut msa_by_column = MsaByColumn::from_rows(&msa_by_row)?;
        for column in msa_by_column.iter_mut() {
            attach_column_tests(column, &error);
        }

        let genes = if config.genes.is_empty() {
            vec![TargetGene {
                begin: msa_by_row.begin_pos,
                end: msa_by_row.end_pos,
                name: UNNAMED_ORF.to_string(),
                drms: Vec::new(),
                minors: Vec::new(),
            }]
        } else {
            config.genes.clone()
        };

        let mut caller = Self {
            msa_by_row,
            msa_by_column,
            error,
            config,
            settings,
            genes,
            number_of_tests: 1,
            variant_genes: Vec::new(),
            performance: PerformanceMetrics::default(),
            haplotypes: Vec::new(),
            read_counts: HaplotypeReadCounts::default(),
        };
        caller.call_variants();
        Ok(caller)
    }

    /// 1-based codon starts of `gene` that lie inside the MSA window.
    fn codon_starts(&self, gene: &TargetGene) -> impl Iterator<Item = usize> + use<> {
        let first = self.msa_by_row.begin_pos;
        (gene.begin..gene.end.saturating_sub(2)).step_by(3).filter(move |&i| i >= first)
    }

    #[allow(clippy::cast_precision_loss)]
    fn call_variants(&mut self) {
        let tallies: Vec<Vec<(usize, BTreeMap<String, usize>)>> = self
            .genes
            .iter()
            .map(|gene| {
                self.codon_starts(gene)
                    .map(|i| (i, self.msa_by_row.codons_at(i - self.msa_by_row.begin_pos)))
                    .collect()
            })
            .collect();
        self.number_of_tests =
            tallies.iter().flatten().map(|(_, codons)| codons.len()).sum::<usize>().max(1);
        debug!("Number of tests: {}", self.number_of_tests);

        let reference = self.config.reference_sequence.as_bytes();
        let has_reference = !reference.is_empty();
        let has_expected_minors = self.config.has_expected_minors();
        let settings = self.settings;
        let mut performance = PerformanceMetrics::default();
        let mut variant_genes = Vec::with_capacity(self.genes.len());

        for (gene, tallies) in self.genes.iter().zip(tallies) {
            let mut variant_gene =
                VariantGene { name: gene.name.clone(), variant_positions: Vec::new() };

            for (i, codons) in tallies {
                let abs = i - 1;
                let win = i - self.msa_by_row.begin_pos;
                let aa_pos = 1 + (i - gene.begin) / 3;
                let coverage: usize = codons.values().sum();
                let Some((majority, majority_count)) = majority_codon(&codons) else {
                    continue;
                };

                let mut position = if has_reference {
                    let Some(ref_codon) =
                        reference.get(abs..abs + 3).filter(|codon| is_coding_codon(codon))
                    else {
                        continue;
                    };
                    let ref_codon = String::from_utf8_lossy(ref_codon).into_owned();
                    let Some(ref_aa) = amino_acid(&ref_codon) else { continue };
                    let mut position = VariantPosition::new(ref_codon, ref_aa, aa_pos, win);
                    let majority_perc = 100.0 * majority_count as f64 / coverage as f64;
                    if majority_perc > settings.max_perc && majority != position.ref_codon {
                        position.alt_ref_amino_acid = amino_acid(majority);
                        position.alt_ref_codon = Some(majority.to_string());
                    }
                    position
                } else {
                    let Some(ref_aa) = amino_acid(majority) else { continue };
                    VariantPosition::new(majority.to_string(), ref_aa, aa_pos, win)
                };

                for (codon, &count) in &codons {
                    if position.ref_codon == *codon
                        || position.alt_ref_codon.as_deref() == Some(codon.as_str())
                    {
                        continue;
                    }
                    let Some(aa) = amino_acid(codon) else { continue };

                    let expected =
                        coverage as f64 * self.error.probability(&position.ref_codon, codon);
                    let p_value = (fisher_exact_two_sided(
                        count as u64,
                        (coverage - count) as u64,
                        ceil_count(expected),
                        ceil_count(coverage as f64 - expected),
                    ) * self.number_of_tests as f64)
                        .min(1.0);
                    let frequency = count as f64 / coverage as f64;
                    let variable = frequency < MAX_VARIABLE_FREQUENCY;
                    let predictor = gene.minors.iter().any(|minor| {
                        minor.position == aa_pos
                            && minor.aminoacid.starts_with(aa)
                            && minor.codon == *codon
                    });
                    let significant = p_value < ALPHA;
                    performance.record(variable, predictor, significant);

                    let known_drm =
                        gene.find_drms(&DMutation::new(position.ref_amino_acid, aa_pos, aa));
                    let keep = settings.debug
                        || (significant
                            && if settings.drm_only {
                                !known_drm.is_empty()
                            } else {
                                predictor || variable || !has_expected_minors
                            });
                    let frequent = settings.debug || frequency * 100.0 >= settings.min_perc;
                    if keep && frequent {
                        position.push_codon(
                            aa,
                            VariantCodon {
                                codon: codon.clone(),
                                frequency,
                                p_value,
                                known_drm,
                                haplotype_hit: Vec::new(),
                            },
                        );
                    }
                }

                if position.is_variant() {
                    position.coverage = coverage;
                    position.msa = self.msa_context(i, reference);
                    variant_gene.variant_positions.push(position);
                }
            }

            info!(
                "{}: {} variant position(s)",
                variant_gene.name,
                variant_gene.variant_positions.len()
            );
            variant_genes.push(variant_gene);
        }

        self.variant_genes = variant_genes;
        self.performance = performance;
    }

    /// Column counts around the 1-based codon start `i`, restricted to the MSA window.
    fn msa_context(&self, i: usize, reference: &[u8]) -> Vec<MsaCount> {
        MSA_CONTEXT
            .filter_map(|rel_pos| {
                let pos = i.checked_add_signed(rel_pos)?;
                if pos < self.msa_by_row.begin_pos || pos >= self.msa_by_row.end_pos {
                    return None;
                }
                let abs_pos = pos - 1;
                let column = self.msa_by_column.get(abs_pos)?;
                let wt = reference.get(abs_pos).copied().unwrap_or_else(|| column.max_base());
                Some(MsaCount::new(rel_pos, abs_pos, column, wt))
            })
            .collect()
    }

    /// Reconstruct haplotypes over the reported variant positions.
    pub fn phase_variants(&mut self) {
        let phased = phase_variants(&self.msa_by_row, &mut self.variant_genes, self.settings.verbose);
        self.haplotypes = phased.haplotypes;
        self.read_counts = phased.read_counts;
    }

    #[must_use]
    pub fn report(&self) -> JulietReport {
        JulietReport {
            genes: self
                .variant_genes
                .iter()
                .filter(|gene| !gene.variant_positions.is_empty())
                .cloned()
                .collect(),
            haplotypes: self.haplotypes.clone(),
            haplotype_read_counts: self.read_counts,
        }
    }

    /// Validation metrics when the config lists expected minors.
    #[must_use]
    pub fn validation(&self) -> Option<ValidationMetrics> {
        self.config
            .has_expected_minors()
            .then(|| self.performance.validation(self.number_of_tests))
    }

    #[must_use]
    pub fn number_of_tests(&self) -> usize {
        self.number_of_tests
    }

    #[must_use]
    pub fn variant_genes(&self) -> &[VariantGene] {
        &self.variant_genes
    }

    #[must_use]
    pub fn performance(&self) -> PerformanceMetrics {
        self.performance
    }

    #[must_use]
    pub fn msa_by_column(&self) -> &MsaByColumn {
        &self.msa_by_column
    }

    #[must_use]
    pub fn config(&self) -> &TargetConfig {
        &self.config
    }
}

/// Test every minority nucleotide and insertion of `column` against the error model.
///
/// Substitutions and `N` use the substitution rate. Deletions and insertions use the
/// deletion rate. p-values are not corrected for multiple testing.
#[allow(clippy::cast_precision_loss)]
fn attach_column_tests(column: &mut MsaColumn, error: &ErrorEstimates) {
    let coverage = column.coverage();
    if coverage == 0 {
        return;
    }
    let test = |count: usize, rate: f64| {
        let count = count.min(coverage);
        let expected = coverage as f64 * rate;
        fisher_exact_two_sided(
            count as u64,
            (coverage - count) as u64,
            ceil_count(expected),
            ceil_count(coverage as f64 - expected),
        )
    };

    let arg_max = column.max_element();
    let mut fisher = FisherResult { arg_max, ..FisherResult::default() };
    for (tag, &count) in column.counts.iter().enumerate() {
        if tag == arg_max || count == 0 {
            continue;
        }
        let rate = if tag == GAP_TAG { error.deletion } else { error.substitution };
        fisher.p_values[tag] = test(count, rate);
        fisher.mask[tag] = fisher.p_values[tag] < INDEL_ALPHA;
    }
    fisher.hit = fisher.mask.iter().any(|&m| m);

    let insertion_p_values = column
        .insertions
        .iter()
        .map(|(seq, &count)| (seq.clone(), test(count, error.deletion)))
        .collect();
    column.add_fisher_result(fisher);
    column.add_insertion_p_values(insertion_p_values);
}

/// The first codon with the strictly highest count.
fn majority_codon(codons: &BTreeMap<String, usize>) -> Option<(&str, usize)> {
    let mut best: Option<(&str, usize)> = None;
    for (codon, &count) in codons {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((codon, count));
        }
    }
    best.filter(|&(codon, count)| count > 0 && is_coding_codon(codon.as_bytes()))
}
