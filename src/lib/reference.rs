//! FASTA reading and writing.
//!
//! Reference inputs here are a handful of viral genomes or amplicon consensus sequences, so
//! every record is loaded into memory with noodles' sequential reader.

use anyhow::{Context, Result};
use log::debug;
use noodles::fasta;
use noodles::fasta::record::{Definition, Sequence};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A named sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub name: String,
    pub sequence: Vec<u8>,
}

impl FastaRecord {
    #[must_use]
    pub fn new(name: impl Into<String>, sequence: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), sequence: sequence.into() }
    }

    /// Copy with the sequence upper-cased.
    #[must_use]
    pub fn to_uppercase(&self) -> Self {
        Self { name: self.name.clone(), sequence: self.sequence.to_ascii_uppercase() }
    }
}

/// Read every record of a FASTA file.
///
/// # Errors
/// Returns an error if the file cannot be opened or parsed.
pub fn read_fasta<P: AsRef<Path>>(path: P) -> Result<Vec<FastaRecord>> {
    let path = path.as_ref();
    let mut reader = fasta::io::reader::Builder
        .build_from_path(path)
        .with_context(|| format!("Failed to open FASTA: {}", path.display()))?;

    let mut records = Vec::new();
    for result in reader.records() {
        let record =
            result.with_context(|| format!("Failed to parse FASTA: {}", path.display()))?;
        let name = String::from_utf8_lossy(record.name()).into_owned();
        let sequence: &[u8] = record.sequence().as_ref();
        records.push(FastaRecord::new(name, sequence.to_vec()));
    }

    debug!("Loaded {} sequences from {}", records.len(), path.display());
    Ok(records)
}

/// Write records to a FASTA file.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_fasta<P: AsRef<Path>>(path: P, records: &[FastaRecord]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create FASTA: {}", path.display()))?;
    let mut writer = fasta::io::Writer::new(BufWriter::new(file));
    for record in records {
        let definition = Definition::new(record.name.as_str(), None);
        let sequence = Sequence::from(record.sequence.clone());
        writer
            .write_record(&fasta::Record::new(definition, sequence))
            .with_context(|| format!("Failed to write FASTA: {}", path.display()))?;
    }
    writer.get_mut().flush().with_context(|| format!("Failed to flush FASTA: {}", path.display()))
}
