//! Small amplicon fixtures and a runner for the `minorseq` binary.

#![allow(dead_code)]

use std::path::Path;
use std::process::{Command, Output};

use minorseq_lib::sam::builder::{RecordBuilder, header_with_read_group, write_bam};
use noodles::sam::alignment::record_buf::RecordBuf;

/// Read group description of a Sequel II CCS run.
pub const SEQUEL_DESCRIPTION: &str =
    "READTYPE=CCS;BINDINGKIT=101-789-500;SEQUENCINGKIT=101-826-100;BASECALLERVERSION=5.0";

/// Run the binary with `args`.
///
/// # Panics
///
/// Panics if the binary cannot be started.
pub fn run_minorseq(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_minorseq"))
        .args(args)
        .output()
        .expect("Failed to run minorseq")
}

/// `count` reads named `<prefix>_<i>`, each aligned with `cigar` at 1-based `start`.
pub fn reads(prefix: &str, count: usize, start: usize, sequence: &str, cigar: &str) -> Vec<RecordBuf> {
    (0..count)
        .map(|i| {
            RecordBuilder::new()
                .name(&format!("{prefix}_{i}"))
                .sequence(sequence)
                .reference_sequence_id(0)
                .alignment_start(start)
                .cigar(cigar)
                .read_group("rg1")
                .build()
        })
        .collect()
}

/// Write `records` aligned to `reference` of `length` bases, in a single read group.
///
/// # Panics
///
/// Panics if the BAM cannot be written.
pub fn write_amplicon_bam(path: &Path, reference: &str, length: usize, records: &[RecordBuf]) {
    let header = header_with_read_group(reference, length, "rg1", SEQUEL_DESCRIPTION);
    write_bam(path, &header, records).expect("Failed to write BAM");
}

/// Convert a path for use as a command argument.
///
/// # Panics
///
/// Panics if the path is not valid UTF-8.
pub fn arg(path: &Path) -> &str {
    path.to_str().expect("path is UTF-8")
}
