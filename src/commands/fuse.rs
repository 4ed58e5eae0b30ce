//! Majority consensus of reads aligned to a reference.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use minorseq_lib::dataset::output_prefix;
use minorseq_lib::fuse::{DEFAULT_MIN_COVERAGE, Fuse};
use minorseq_lib::logging::OperationTimer;
use minorseq_lib::reference::{FastaRecord, write_fasta};
use minorseq_lib::validation::validate_file_exists;

use crate::commands::command::Command;
use crate::commands::common::{ThreadingOptions, load_array_reads, resolve_bam};

/// Name of the record written to the output FASTA.
const CONSENSUS_NAME: &str = "CONSENSUS";

/// Suffix of a ReferenceSet output, replaced by `.fasta`.
const REFERENCE_SET_SUFFIX: &str = ".referenceset.xml";

/// Collapse aligned reads into their majority consensus.
#[derive(Debug, Parser)]
#[command(
    name = "fuse",
    about = "\x1b[38;5;72m[CONSENSUS]\x1b[0m      \x1b[36mMajority consensus of aligned reads\x1b[0m",
    long_about = r#"
Collapse reads aligned to a reference into a single majority consensus sequence.

Every reference column contributes its most frequent base. Codon-sized insertions carried by
more than half of a column's reads are spliced in, keeping only the best supported one within
a few positions. Columns with less than --min-coverage reads are dropped; when the input has
fewer reads than that, every covered column is used.

The input is an aligned BAM or a DataSet XML referencing one. The output is a FASTA with a
single record named CONSENSUS and defaults to <input prefix>.fasta.

Example usage:
  minorseq fuse aligned.consensusalignmentset.xml consensus.fasta
  minorseq fuse --min-coverage 20 aligned.bam
"#
)]
pub struct FuseCommand {
    /// Aligned BAM or DataSet XML
    pub input: PathBuf,

    /// Output FASTA; a .referenceset.xml name is written as .fasta
    pub output: Option<PathBuf>,

    /// Minimum coverage for a column to enter the consensus
    #[arg(short = 'c', long = "min-coverage", default_value_t = DEFAULT_MIN_COVERAGE)]
    pub min_coverage: usize,

    #[command(flatten)]
    pub threading: ThreadingOptions,
}

impl FuseCommand {
    fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(output) => {
                let name = output.to_string_lossy();
                let lower = name.to_ascii_lowercase();
                match lower.strip_suffix(REFERENCE_SET_SUFFIX) {
                    Some(stem) => PathBuf::from(format!("{}.fasta", &name[..stem.len()])),
                    None => output.clone(),
                }
            }
            None => PathBuf::from(format!("{}.fasta", output_prefix(&self.input).display())),
        }
    }
}

impl Command for FuseCommand {
    fn execute(&self, _command_line: &str) -> Result<()> {
        validate_file_exists(&self.input, "Input")?;
        let timer = OperationTimer::new("Building consensus");
        let output = self.output_path();

        info!("Starting Fuse");
        info!("Input: {}", self.input.display());
        info!("Output: {}", output.display());
        info!("Minimum coverage: {}", self.min_coverage);

        let bam = resolve_bam(&self.input)?;
        let reads = load_array_reads(&bam, self.threading.threads)?;
        let fuse = Fuse::new(&reads, self.min_coverage)?;
        info!("Consensus length: {}", fuse.consensus().len());

        write_fasta(&output, &[FastaRecord::new(CONSENSUS_NAME, fuse.into_consensus())])?;
        timer.log_completion(reads.len() as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn command(input: &str, output: Option<&str>) -> FuseCommand {
        FuseCommand {
            input: PathBuf::from(input),
            output: output.map(PathBuf::from),
            min_coverage: DEFAULT_MIN_COVERAGE,
            threading: ThreadingOptions { threads: 1 },
        }
    }

    #[rstest]
    #[case("in.bam", None, "in.fasta")]
    #[case("dir/in.consensusalignmentset.xml", None, "dir/in.fasta")]
    #[case("in.bam", Some("out.fasta"), "out.fasta")]
    #[case("in.bam", Some("out.referenceset.xml"), "out.fasta")]
    #[case("in.bam", Some("Out.ReferenceSet.XML"), "Out.fasta")]
    fn test_output_path(#[case] input: &str, #[case] output: Option<&str>, #[case] expected: &str) {
        assert_eq!(command(input, output).output_path(), PathBuf::from(expected));
    }
}
