//! Minor variant calling on codons, with optional haplotype phasing.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail, ensure};
use clap::Parser;
use itertools::Itertools;
use log::{debug, info, warn};
use rayon::prelude::*;

use minorseq_lib::array_read::ArrayRead;
use minorseq_lib::dataset::output_prefix;
use minorseq_lib::errors::MinorseqError;
use minorseq_lib::juliet::error_estimates::{ErrorEstimates, measure_error_rates};
use minorseq_lib::juliet::html::write_html;
use minorseq_lib::juliet::target_config::TargetConfig;
use minorseq_lib::juliet::{AminoAcidCaller, CallerSettings};
use minorseq_lib::logging::{OperationTimer, format_percent};
use minorseq_lib::msa::{MsaByColumn, MsaByRow};
use minorseq_lib::validation::{
    validate_file_exists, validate_min_max, validate_range, validate_rate,
};

use crate::commands::command::Command;
use crate::commands::common::{ThreadingOptions, load_array_reads, resolve_bam};

/// Written next to the reports when the target config lists expected minors.
const VALIDATION_FILE: &str = "validation.json";

/// A 1-based inclusive reference region given as `BEGIN-END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub begin: usize,
    pub end: usize,
}

impl FromStr for Region {
    type Err = MinorseqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| MinorseqError::InvalidParameter {
            parameter: "region".to_string(),
            reason: format!("'{s}' {reason}"),
        };
        let (begin, end) =
            s.split_once('-').ok_or_else(|| invalid("is not of the form BEGIN-END"))?;
        let parse = |v: &str| v.trim().parse::<i64>().map_err(|_| invalid("is not numeric"));
        let (begin, end) = (parse(begin)?, parse(end)?);
        if begin <= 0 || end <= 0 {
            return Err(invalid("must be 1-based"));
        }
        let to_usize = |v: i64| usize::try_from(v).map_err(|_| invalid("is out of range"));
        Ok(Self { begin: to_usize(begin)?, end: to_usize(end)? })
    }
}

/// What juliet computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnalysisMode {
    Amino,
    Phasing,
    Error,
}

/// Report files requested on the command line.
#[derive(Debug, Default, PartialEq, Eq)]
struct Outputs {
    json: Option<PathBuf>,
    html: Option<PathBuf>,
    msa: Option<PathBuf>,
}

impl Outputs {
    fn is_empty(&self) -> bool {
        self.json.is_none() && self.html.is_none() && self.msa.is_none()
    }

    /// Directory of the first requested report.
    fn directory(&self) -> PathBuf {
        [&self.json, &self.html, &self.msa]
            .into_iter()
            .flatten()
            .find_map(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_default()
    }
}

/// Call minor variants at the codon level.
#[derive(Debug, Parser)]
#[command(
    name = "juliet",
    about = "\x1b[38;5;166m[VARIANTS]\x1b[0m       \x1b[36mMinor variant calling on codons\x1b[0m",
    long_about = r#"
Juliet, minimal minor variant calling.

Every codon of every gene of the target config is tested. The count of each non-reference
codon is compared with the count expected from sequencing errors of the reference codon using
Fisher's exact test, Bonferroni corrected over all tested codons. Significant codons are
reported with their amino acid, frequency, p-value and known drug-resistance mutations.

Positional files ending in .json, .html or .msa are outputs; any other file is the input, an
aligned BAM or ConsensusAlignmentSet. Without outputs, <input prefix>.html and
<input prefix>.json are written. The .msa output lists the nucleotide counts of every column.

With --mode-phasing, reads are clustered into haplotypes over the reported variant positions.

Error rates default to those of the reads' sequencing chemistry. Give both --sub and --del to
override them. All reads must come from the same chemistry.

Attention: juliet is for research usage only. Predictions have not been validated.

Example usage:
  minorseq juliet --config HIV_HXB2 cleric.consensusalignmentset.xml
  minorseq juliet --mode-phasing --region 2253-3869 in.bam out.json out.html
"#
)]
#[allow(clippy::struct_excessive_bools)]
pub struct JulietCommand {
    /// Input BAM/DataSet and optional .json, .html and .msa outputs
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Clip reads to this 1-based region, given as BEGIN-END
    #[arg(short = 'r', long = "region", help_heading = "Restrictions")]
    pub region: Option<Region>,

    /// Only report variants listed as drug-resistance mutations in the target config
    #[arg(short = 'k', long = "drm-only", help_heading = "Restrictions")]
    pub drm_only: bool,

    /// Minimum variant frequency to report, in percent
    #[arg(short = 'm', long = "min-perc", default_value_t = 0.1, help_heading = "Restrictions")]
    pub min_perc: f64,

    /// Majority codons above this percentage become the alternative reference
    #[arg(short = 'n', long = "max-perc", default_value_t = 100.0, help_heading = "Restrictions")]
    pub max_perc: f64,

    /// Target config: HIV_HXB2, a JSON file or a JSON string
    #[arg(short = 'c', long = "config", default_value = "", help_heading = "Configuration")]
    pub config: String,

    /// Phase variants and cluster haplotypes
    #[arg(short = 'p', long = "mode-phasing", help_heading = "Configuration")]
    pub mode_phasing: bool,

    /// Predefined target config tag, overrides --config
    #[arg(
        long = "target-config-tc",
        default_value = "none",
        value_parser = ["none", "HIV_HXB2"],
        hide = true
    )]
    pub target_config_tc: String,

    /// Print alignment error rates of each input instead of calling variants
    #[arg(long = "mode-error", conflicts_with = "mode_phasing", hide = true)]
    pub mode_error: bool,

    /// Substitution rate, overrides the chemistry rate together with --del
    #[arg(short = 's', long = "sub", default_value_t = 0.0, help_heading = "Chemistry override")]
    pub substitution_rate: f64,

    /// Deletion rate, overrides the chemistry rate together with --sub
    #[arg(short = 'd', long = "del", default_value_t = 0.0, help_heading = "Chemistry override")]
    pub deletion_rate: f64,

    /// Log every phased haplotype
    #[arg(long = "verbose")]
    pub verbose: bool,

    /// Report every observed codon regardless of significance
    #[arg(long = "debug")]
    pub debug: bool,

    #[command(flatten)]
    pub threading: ThreadingOptions,
}

impl JulietCommand {
    fn mode(&self) -> Result<AnalysisMode> {
        match (self.mode_phasing, self.mode_error) {
            (true, true) => bail!("Overriding mode is mutually exclusive"),
            (true, false) => Ok(AnalysisMode::Phasing),
            (false, true) => Ok(AnalysisMode::Error),
            (false, false) => Ok(AnalysisMode::Amino),
        }
    }

    fn validate(&self) -> Result<()> {
        validate_range(self.min_perc, 0.0, 100.0, "min-perc")?;
        validate_range(self.max_perc, 0.0, 100.0, "max-perc")?;
        validate_min_max(self.min_perc, self.max_perc, "min-perc", "max-perc")?;
        validate_rate(self.substitution_rate, "sub")?;
        validate_rate(self.deletion_rate, "del")?;
        Ok(())
    }

    fn target_config_input(&self) -> &str {
        if self.target_config_tc == "none" { &self.config } else { &self.target_config_tc }
    }

    fn settings(&self) -> CallerSettings {
        CallerSettings {
            min_perc: self.min_perc,
            max_perc: self.max_perc,
            drm_only: self.drm_only,
            debug: self.debug,
            verbose: self.verbose,
        }
    }

    /// Split the positional files into the input and the requested reports.
    fn classify_files(&self) -> Result<(PathBuf, Outputs)> {
        let mut outputs = Outputs::default();
        let mut input = None;
        for file in &self.files {
            let slot = match file.extension().and_then(|e| e.to_str()) {
                Some("json") => Some((&mut outputs.json, "json")),
                Some("html") => Some((&mut outputs.html, "html")),
                Some("msa") => Some((&mut outputs.msa, "msa")),
                _ => None,
            };
            match slot {
                Some((slot, kind)) => {
                    ensure!(slot.is_none(), "Only one {kind} output file allowed");
                    *slot = Some(file.clone());
                }
                None => input = Some(file.clone()),
            }
        }

        let input = input.context("Missing input file")?;
        if outputs.is_empty() {
            let prefix = output_prefix(&input);
            outputs.html = Some(PathBuf::from(format!("{}.html", prefix.display())));
            outputs.json = Some(PathBuf::from(format!("{}.json", prefix.display())));
        }
        Ok((input, outputs))
    }

    /// Reads of `input`, clipped to the region when one is given.
    fn load_reads(&self, input: &Path) -> Result<Vec<ArrayRead>> {
        let bam = resolve_bam(input)?;
        let reads = load_array_reads(&bam, self.threading.threads)?;
        Ok(match self.region {
            Some(region) => {
                let clipped: Vec<_> = reads
                    .iter()
                    .filter_map(|read| read.clip_to_region(region.begin, region.end))
                    .collect();
                info!(
                    "Clipped to region {}-{}: {} of {} reads remain",
                    region.begin,
                    region.end,
                    clipped.len(),
                    reads.len()
                );
                clipped
            }
            None => reads,
        })
    }

    fn error_estimates(&self, reads: &[ArrayRead]) -> Result<ErrorEstimates> {
        let chemistries: Vec<&str> = reads.iter().map(|r| r.chemistry.as_str()).unique().collect();
        if chemistries.len() > 1 {
            return Err(MinorseqError::MixedChemistry { chemistries: chemistries.join(", ") }.into());
        }
        if self.substitution_rate != 0.0 && self.deletion_rate != 0.0 {
            info!("Using error rates sub={} del={}", self.substitution_rate, self.deletion_rate);
            Ok(ErrorEstimates::from_rates(self.substitution_rate, self.deletion_rate))
        } else {
            let chemistry = chemistries.first().copied().unwrap_or_default();
            info!("Using error rates of chemistry '{chemistry}'");
            Ok(ErrorEstimates::from_chemistry(chemistry))
        }
    }

    fn call_variants(&self, mode: AnalysisMode, command_line: &str) -> Result<()> {
        let (input, outputs) = self.classify_files()?;
        validate_file_exists(&input, "Input")?;
        info!("Input: {}", input.display());

        let reads = self.load_reads(&input)?;
        if reads.is_empty() {
            return Err(MinorseqError::EmptyInput { context: input.display().to_string() }.into());
        }
        let error = self.error_estimates(&reads)?;
        let config = TargetConfig::resolve(self.target_config_input())?;
        info!("Target genes: {}", config.genes.iter().map(|g| g.name.as_str()).join(", "));

        let mut caller = AminoAcidCaller::new(&reads, error, config, self.settings())?;
        for column in caller.msa_by_column().iter().filter(|c| c.has_significant_indel()) {
            debug!("Significant indels at {}", column.indel_summary().trim_end());
        }
        if mode == AnalysisMode::Phasing {
            caller.phase_variants();
        }
        let report = caller.report();
        info!(
            "Reported {} variant positions in {} genes",
            report.genes.iter().map(|g| g.variant_positions.len()).sum::<usize>(),
            report.genes.len()
        );

        if let Some(path) = &outputs.json {
            let json = report.to_json()?;
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("Failed to write JSON report: {}", path.display()))?;
            info!("Wrote {}", path.display());
        }

        if let Some(path) = &outputs.html {
            let file = File::create(path)
                .with_context(|| format!("Failed to create HTML report: {}", path.display()))?;
            let mut out = BufWriter::new(file);
            write_html(
                &mut out,
                &report,
                caller.config(),
                self.drm_only,
                &input.display().to_string(),
                command_line,
            )?;
            out.flush()?;
            info!("Wrote {}", path.display());
        }

        if let Some(path) = &outputs.msa {
            caller.msa_by_column().write_counts(path)?;
            info!("Wrote {}", path.display());
        }

        if let Some(validation) = caller.validation() {
            let path = outputs.directory().join(VALIDATION_FILE);
            std::fs::write(&path, serde_json::to_string_pretty(&validation)?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(
                "Validation: TPR {} FPR {} accuracy {}",
                format_percent(validation.true_positive_rate, 2),
                format_percent(validation.false_positive_rate, 4),
                format_percent(validation.accuracy, 4)
            );
        }
        Ok(())
    }

    fn measure_errors(&self) -> Result<()> {
        let rows = self
            .files
            .par_iter()
            .map(|input| -> Result<String> {
                let reads = self.load_reads(input)?;
                let msa = MsaByColumn::from_rows(&MsaByRow::new(&reads))?;
                let rates = measure_error_rates(&msa);
                Ok(match rates {
                    Some(rates) => {
                        info!(
                            "{}: sub {} del {} over {} columns",
                            input.display(),
                            rates.substitution,
                            rates.deletion,
                            rates.columns
                        );
                        format!("{}\t{}\t{}", input.display(), rates.substitution, rates.deletion)
                    }
                    None => {
                        warn!("{}: no column is covered well enough", input.display());
                        format!("{}\tNA\tNA", input.display())
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "file\tsub\tdel")?;
        for row in rows {
            writeln!(out, "{row}")?;
        }
        Ok(())
    }
}

impl Command for JulietCommand {
    fn execute(&self, command_line: &str) -> Result<()> {
        let mode = self.mode()?;
        self.validate()?;
        let timer = OperationTimer::new("Calling minor variants");
        info!("Starting Juliet in {mode:?} mode");

        match mode {
            AnalysisMode::Amino | AnalysisMode::Phasing => self.call_variants(mode, command_line)?,
            AnalysisMode::Error => self.measure_errors()?,
        }
        timer.log_completion(self.files.len() as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn command(files: &[&str]) -> JulietCommand {
        JulietCommand {
            files: files.iter().map(PathBuf::from).collect(),
            region: None,
            drm_only: false,
            min_perc: 0.1,
            max_perc: 100.0,
            config: String::new(),
            mode_phasing: false,
            target_config_tc: "none".to_string(),
            mode_error: false,
            substitution_rate: 0.0,
            deletion_rate: 0.0,
            verbose: false,
            debug: false,
            threading: ThreadingOptions { threads: 1 },
        }
    }

    fn read_with_chemistry(chemistry: &str) -> ArrayRead {
        ArrayRead {
            index: 0,
            name: "r".to_string(),
            reference_start: 0,
            reference_end: 0,
            chemistry: chemistry.to_string(),
            bases: Vec::new(),
        }
    }

    #[rstest]
    #[case("2253-3869", 2253, 3869)]
    #[case("1-1", 1, 1)]
    #[case(" 10 - 20", 10, 20)]
    fn test_region_parse(#[case] s: &str, #[case] begin: usize, #[case] end: usize) {
        assert_eq!(s.parse::<Region>().unwrap(), Region { begin, end });
    }

    #[rstest]
    #[case("0-100")]
    #[case("100")]
    #[case("a-b")]
    fn test_region_parse_errors(#[case] s: &str) {
        let err = s.parse::<Region>().unwrap_err();
        assert!(err.to_string().contains("Invalid parameter 'region'"));
    }

    #[test]
    fn test_default_outputs() {
        let (input, outputs) =
            command(&["dir/in.consensusalignmentset.xml"]).classify_files().unwrap();
        assert_eq!(input, PathBuf::from("dir/in.consensusalignmentset.xml"));
        assert_eq!(outputs.html, Some(PathBuf::from("dir/in.html")));
        assert_eq!(outputs.json, Some(PathBuf::from("dir/in.json")));
        assert_eq!(outputs.msa, None);
    }

    #[test]
    fn test_explicit_outputs() {
        let (input, outputs) =
            command(&["out/report.msa", "in.bam", "out/report.json"]).classify_files().unwrap();
        assert_eq!(input, PathBuf::from("in.bam"));
        assert_eq!(outputs.json, Some(PathBuf::from("out/report.json")));
        assert_eq!(outputs.html, None);
        assert_eq!(outputs.msa, Some(PathBuf::from("out/report.msa")));
        assert_eq!(outputs.directory(), PathBuf::from("out"));
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let err = command(&["in.bam", "a.json", "b.json"]).classify_files().unwrap_err();
        assert!(err.to_string().contains("Only one json output"));
    }

    #[test]
    fn test_missing_input_rejected() {
        let err = command(&["a.json"]).classify_files().unwrap_err();
        assert!(err.to_string().contains("Missing input"));
    }

    #[test]
    fn test_mode() {
        let mut cmd = command(&["in.bam"]);
        assert_eq!(cmd.mode().unwrap(), AnalysisMode::Amino);
        cmd.mode_phasing = true;
        assert_eq!(cmd.mode().unwrap(), AnalysisMode::Phasing);
        cmd.mode_error = true;
        assert!(cmd.mode().is_err());
        cmd.mode_phasing = false;
        assert_eq!(cmd.mode().unwrap(), AnalysisMode::Error);
    }

    #[rstest]
    #[case(0.1, 100.0, 0.0, 0.0, true)]
    #[case(5.0, 1.0, 0.0, 0.0, false)]
    #[case(0.1, 120.0, 0.0, 0.0, false)]
    #[case(0.1, 100.0, 1.5, 0.0, false)]
    #[case(0.1, 100.0, 0.0, -0.1, false)]
    fn test_validate(
        #[case] min_perc: f64,
        #[case] max_perc: f64,
        #[case] sub: f64,
        #[case] del: f64,
        #[case] ok: bool,
    ) {
        let mut cmd = command(&["in.bam"]);
        cmd.min_perc = min_perc;
        cmd.max_perc = max_perc;
        cmd.substitution_rate = sub;
        cmd.deletion_rate = del;
        assert_eq!(cmd.validate().is_ok(), ok);
    }

    #[test]
    fn test_target_config_tag_overrides_config() {
        let mut cmd = command(&["in.bam"]);
        cmd.config = "custom.json".to_string();
        assert_eq!(cmd.target_config_input(), "custom.json");
        cmd.target_config_tc = "HIV_HXB2".to_string();
        assert_eq!(cmd.target_config_input(), "HIV_HXB2");
    }

    #[test]
    fn test_mixed_chemistries_rejected() {
        let reads = [read_with_chemistry("S/P2-C2"), read_with_chemistry("P6-C4")];
        let err = command(&["in.bam"]).error_estimates(&reads).unwrap_err();
        let err = err.downcast::<MinorseqError>().unwrap();
        assert!(matches!(err, MinorseqError::MixedChemistry { .. }));
    }

    #[test]
    fn test_explicit_rates_need_both() {
        let reads = [read_with_chemistry("S/P2-C2")];
        let mut cmd = command(&["in.bam"]);
        cmd.substitution_rate = 0.01;
        assert_eq!(cmd.error_estimates(&reads).unwrap(), ErrorEstimates::default());
        cmd.deletion_rate = 0.02;
        assert_eq!(cmd.error_estimates(&reads).unwrap(), ErrorEstimates::from_rates(0.01, 0.02));
    }
}
