//! Re-target aligned reads onto a new reference.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use clap::Parser;
use log::{info, warn};
use noodles::sam::alignment::io::Write as AlignmentWrite;

use minorseq_lib::bam_io::{create_bam_writer, finish_bam_writer, read_all_records};
use minorseq_lib::cleric::Cleric;
use minorseq_lib::dataset::{DataSet, DataSetKind, output_prefix};
use minorseq_lib::errors::MinorseqError;
use minorseq_lib::header::{first_reference_name, retarget_header};
use minorseq_lib::logging::OperationTimer;
use minorseq_lib::progress::ProgressTracker;
use minorseq_lib::reference::{FastaRecord, read_fasta};
use minorseq_lib::validation::validate_file_exists;

use crate::commands::command::Command;
use crate::commands::common::{ThreadingOptions, add_pg_record};

/// Suffix of a dataset output; the BAM is written beside it.
const ALIGNMENT_SET_SUFFIX: &str = ".consensusalignmentset.xml";

/// Re-target reads aligned to one reference onto another reference.
#[derive(Debug, Parser)]
#[command(
    name = "cleric",
    about = "\x1b[38;5;180m[ALIGNMENT]\x1b[0m      \x1b[36mRe-target alignments to a new reference\x1b[0m",
    long_about = r#"
Re-target reads aligned to one reference onto another reference without re-mapping.

The two references are aligned to each other, then every read's CIGAR is replayed over that
alignment and rewritten against the new reference. Matches are refined into =/X and NM is
recomputed. Unmapped reads and reads that fall entirely outside the new reference are dropped.

Positional files are classified by content:
  - an aligned BAM or AlignmentSet/ConsensusAlignmentSet XML is the input. The reference
    the reads were mapped to is the first @SQ line of its header;
  - FASTA files or ReferenceSet XMLs provide the original reference (the record named like
    the first @SQ line) and the new reference (the first other record);
  - a path that does not exist yet is the output.

With only a BAM and an output, the pairwise alignment of the two references must be given
with --aln as a FASTA of two equal-length gapped records.

The output defaults to <input prefix>_cleric.bam. A .consensusalignmentset.xml output is
written as a BAM beside a DataSet XML that references it.

Example usage:
  minorseq cleric mix.consensusalignmentset.xml consensus.referenceset.xml \
      hxb2.referenceset.xml cleric.consensusalignmentset.xml
  minorseq cleric --aln pair.fasta mapped.bam retargeted.bam
"#
)]
pub struct ClericCommand {
    /// Pre-aligned FASTA of the original and new reference
    #[arg(long = "aln")]
    pub aln: Option<PathBuf>,

    /// Input BAM/DataSet, reference FASTA/DataSets and the output path
    #[arg(required = true, num_args = 2..=4)]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub threading: ThreadingOptions,
}

/// Positional files sorted into their roles.
#[derive(Debug, Default)]
struct ClericInputs {
    bam: Option<PathBuf>,
    fastas: Vec<PathBuf>,
    output: Option<PathBuf>,
}

/// Original and new reference records gathered from the FASTA inputs.
#[derive(Debug, Default)]
struct ReferencePair {
    source: Option<Vec<u8>>,
    target: Option<FastaRecord>,
}

fn classify_inputs(files: &[PathBuf]) -> Result<ClericInputs> {
    let mut inputs = ClericInputs::default();
    for file in files {
        if !file.exists() {
            if let Some(previous) = &inputs.output {
                bail!(
                    "Only one output file allowed. Following files do not exist: {} and {}",
                    previous.display(),
                    file.display()
                );
            }
            inputs.output = Some(file.clone());
            continue;
        }

        let dataset = DataSet::read(file)?;
        match dataset.kind {
            DataSetKind::Subread | DataSetKind::Alignment | DataSetKind::ConsensusAlignment => {
                ensure!(inputs.bam.is_none(), "Only one BAM input is allowed");
                inputs.bam = Some(dataset.single_bam(file)?);
            }
            DataSetKind::Reference => {
                let fastas = dataset.fasta_files();
                ensure!(
                    fastas.len() == 1,
                    "Only one FASTA file allowed per dataset: {}",
                    file.display()
                );
                inputs.fastas.extend(fastas);
            }
            kind => bail!("Unsupported input file: {} of type {kind}", file.display()),
        }
    }
    Ok(inputs)
}

/// Split the records of `fastas` into the original reference and the new reference.
fn collect_references(fastas: &[PathBuf], from_name: &str) -> Result<ReferencePair> {
    let mut pair = ReferencePair::default();
    for fasta in fastas {
        for record in read_fasta(fasta)? {
            let record = record.to_uppercase();
            if record.name == from_name {
                ensure!(pair.source.is_none(), "Multiple original references provided");
                pair.source = Some(record.sequence);
            } else {
                ensure!(pair.target.is_none(), "Multiple target references provided");
                pair.target = Some(record);
            }
        }
    }
    Ok(pair)
}

/// Gapped original and new reference from a two-record pre-aligned FASTA.
fn read_prealigned(path: &Path, from_name: &str) -> Result<(Vec<u8>, FastaRecord)> {
    ensure!(path.exists(), "The pre-aligned FASTA file '{}' does not exist", path.display());
    let mut records = read_fasta(path)?;
    ensure!(
        records.len() == 2,
        "The pre-aligned FASTA file '{}' has to contain exactly 2 sequences (contains {})",
        path.display(),
        records.len()
    );

    let Some(source_index) = records.iter().position(|r| r.name == from_name) else {
        bail!(
            "The pre-aligned FASTA file '{}' does not contain a sequence with name '{from_name}'",
            path.display()
        );
    };
    let source = records.remove(source_index);
    let target = records.remove(0);
    ensure!(
        source.sequence.len() == target.sequence.len(),
        "The reference sequence '{}' and the query sequence '{}' have different lengths \
         ({} vs {})",
        source.name,
        target.name,
        source.sequence.len(),
        target.sequence.len()
    );
    Ok((source.sequence, target))
}

/// Output BAM path, plus the DataSet XML to write beside it.
fn output_paths(output: Option<&Path>, bam: &Path) -> (PathBuf, Option<PathBuf>) {
    let Some(output) = output else {
        return (PathBuf::from(format!("{}_cleric.bam", output_prefix(bam).display())), None);
    };
    let name = output.to_string_lossy();
    match name.to_ascii_lowercase().strip_suffix(ALIGNMENT_SET_SUFFIX) {
        Some(stem) => {
            (PathBuf::from(format!("{}.bam", &name[..stem.len()])), Some(output.to_path_buf()))
        }
        None => (output.to_path_buf(), None),
    }
}

impl Command for ClericCommand {
    fn execute(&self, command_line: &str) -> Result<()> {
        let timer = OperationTimer::new("Re-targeting reads");
        info!("Starting Cleric");

        let inputs = classify_inputs(&self.files)?;
        let Some(bam) = inputs.bam else {
            bail!("Please provide a BAM input, see --help");
        };
        let (header, records) = read_all_records(&bam, self.threading.threads)?;
        let from_name = first_reference_name(&header)
            .context("Could not find reference sequence name in the BAM header")?;
        info!("Input: {}", bam.display());
        info!("Original reference: {from_name}");

        let (cleric, target_name) = if self.files.len() == 2 {
            let Some(aln) = &self.aln else {
                bail!("You need to provide a pre-aligned FASTA file with --aln");
            };
            validate_file_exists(aln, "Pre-aligned FASTA")?;
            let (source, target) = read_prealigned(aln, &from_name)?;
            (Cleric::from_gapped(&source, &target.sequence)?, target.name)
        } else {
            let pair = collect_references(&inputs.fastas, &from_name)?;
            let source = pair
                .source
                .ok_or_else(|| MinorseqError::ReferenceNotFound { ref_name: from_name.clone() })?;
            let target = pair.target.context("No target reference was provided")?;
            (Cleric::from_sequences(&source, &target.sequence)?, target.name)
        };
        info!("Target reference: {target_name} ({} bp)", cleric.dest_gapless().len());

        let (output, dataset_xml) = output_paths(inputs.output.as_deref(), &bam);
        info!("Output: {}", output.display());

        let header = retarget_header(&header, &target_name, cleric.dest_gapless().len())?;
        let header = add_pg_record(header, command_line)?;
        let mut writer = create_bam_writer(&output, &header, self.threading.threads)?;

        let progress = ProgressTracker::new("Re-targeted records").with_interval(100_000);
        let mut written = 0u64;
        for record in &records {
            match cleric.retarget_record(record) {
                Ok(Some(retargeted)) => {
                    writer.write_alignment_record(&header, &retargeted)?;
                    written += 1;
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping record: {e}"),
            }
            progress.log_if_needed(1);
        }
        progress.log_final();
        finish_bam_writer(writer)?;

        if let Some(xml) = dataset_xml {
            DataSet::write_alignment_set(&xml, &output)?;
            info!("Wrote {}", xml.display());
        }

        info!("Wrote {written} of {} records", records.len());
        timer.log_completion(written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minorseq_lib::reference::write_fasta;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case(None, "dir/in.bam", "dir/in_cleric.bam", None)]
    #[case(Some("out.bam"), "in.bam", "out.bam", None)]
    #[case(
        Some("d/out.consensusalignmentset.xml"),
        "in.bam",
        "d/out.bam",
        Some("d/out.consensusalignmentset.xml")
    )]
    fn test_output_paths(
        #[case] output: Option<&str>,
        #[case] bam: &str,
        #[case] expected_bam: &str,
        #[case] expected_xml: Option<&str>,
    ) {
        let (out, xml) = output_paths(output.map(Path::new), Path::new(bam));
        assert_eq!(out, PathBuf::from(expected_bam));
        assert_eq!(xml, expected_xml.map(PathBuf::from));
    }

    #[test]
    fn test_classify_inputs() {
        let dir = TempDir::new().unwrap();
        let fasta = dir.path().join("refs.fasta");
        write_fasta(&fasta, &[FastaRecord::new("a", "ACGT")]).unwrap();
        let bam = dir.path().join("in.bam");
        std::fs::write(&bam, b"").unwrap();
        let out = dir.path().join("out.bam");

        let inputs = classify_inputs(&[bam.clone(), fasta.clone(), out.clone()]).unwrap();
        assert_eq!(inputs.bam, Some(bam));
        assert_eq!(inputs.fastas, vec![fasta]);
        assert_eq!(inputs.output, Some(out));
    }

    #[test]
    fn test_two_missing_outputs_rejected() {
        let dir = TempDir::new().unwrap();
        let files = [dir.path().join("a.bam"), dir.path().join("b.bam")];
        let err = classify_inputs(&files).unwrap_err();
        assert!(err.to_string().contains("Only one output file"));
    }

    #[test]
    fn test_collect_references() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("from.fasta");
        let second = dir.path().join("to.fasta");
        write_fasta(&first, &[FastaRecord::new("hxb2", "acgt")]).unwrap();
        write_fasta(&second, &[FastaRecord::new("consensus", "ACGA")]).unwrap();

        let pair = collect_references(&[first, second], "hxb2").unwrap();
        assert_eq!(pair.source.as_deref(), Some(b"ACGT".as_slice()));
        let target = pair.target.unwrap();
        assert_eq!(target.name, "consensus");
        assert_eq!(target.sequence, b"ACGA");
    }

    #[test]
    fn test_collect_references_rejects_second_target() {
        let dir = TempDir::new().unwrap();
        let fasta = dir.path().join("refs.fasta");
        write_fasta(&fasta, &[FastaRecord::new("x", "AC"), FastaRecord::new("y", "AC")]).unwrap();
        let err = collect_references(&[fasta], "hxb2").unwrap_err();
        assert!(err.to_string().contains("Multiple target references"));
    }

    #[test]
    fn test_read_prealigned_either_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pair.fasta");
        write_fasta(&path, &[FastaRecord::new("new", "AC-T"), FastaRecord::new("old", "ACGT")])
            .unwrap();
        let (source, target) = read_prealigned(&path, "old").unwrap();
        assert_eq!(source, b"ACGT");
        assert_eq!(target.name, "new");
        assert_eq!(target.sequence, b"AC-T");
    }

    #[rstest]
    #[case(&[("old", "ACGT")], "exactly 2 sequences")]
    #[case(&[("a", "ACGT"), ("b", "ACGT")], "does not contain a sequence")]
    #[case(&[("old", "ACGT"), ("new", "ACG")], "different lengths")]
    fn test_read_prealigned_errors(#[case] records: &[(&str, &str)], #[case] message: &str) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pair.fasta");
        let records: Vec<_> = records.iter().map(|(n, s)| FastaRecord::new(*n, *s)).collect();
        write_fasta(&path, &records).unwrap();
        let err = read_prealigned(&path, "old").unwrap_err();
        assert!(err.to_string().contains(message), "{err}");
    }
}
