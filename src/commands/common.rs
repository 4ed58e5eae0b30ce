//! Options and helpers shared across commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use log::info;
use noodles::sam::Header;

use minorseq_lib::array_read::{ArrayRead, array_reads_from_records};
use minorseq_lib::bam_io::read_all_records;
use minorseq_lib::dataset::{DataSet, DataSetKind};
use minorseq_lib::header::read_group_chemistries;

use crate::version::VERSION;

/// Options for BGZF threading.
#[derive(Debug, Clone, Args)]
pub struct ThreadingOptions {
    /// Number of threads used to decompress and compress BAM files.
    #[arg(short = 'j', long = "threads", default_value_t = 1)]
    pub threads: usize,
}

/// Add a @PG record for this run, chained to the last existing program.
///
/// # Errors
///
/// Returns an error if the program record cannot be built or added.
pub fn add_pg_record(header: Header, command_line: &str) -> Result<Header> {
    minorseq_lib::header::add_pg_record(header, VERSION.as_str(), command_line)
}

/// The BAM behind `input`, which is either a BAM or a DataSet XML with a single BAM.
///
/// # Errors
///
/// Returns an error if the dataset cannot be read, is not a subread or alignment dataset, or
/// does not reference exactly one BAM.
pub fn resolve_bam(input: &Path) -> Result<PathBuf> {
    let dataset = DataSet::read(input)
        .with_context(|| format!("Failed to read input: {}", input.display()))?;
    match dataset.kind {
        kind if kind == DataSetKind::Subread || kind.is_alignment() => dataset.single_bam(input),
        kind => bail!("Unsupported input file: {} of type {kind}", input.display()),
    }
}

/// Load the primary mapped reads of `bam` as array reads with their chemistry.
///
/// # Errors
///
/// Returns an error if the BAM cannot be read.
pub fn load_array_reads(bam: &Path, threads: usize) -> Result<Vec<ArrayRead>> {
    let (header, records) = read_all_records(bam, threads)?;
    let chemistries = read_group_chemistries(&header);
    let reads = array_reads_from_records(&records, &chemistries);
    info!("Loaded {} aligned reads of {} records", reads.len(), records.len());
    Ok(reads)
}
