//! End-to-end CLI tests for the fuse command.

use std::fs;

use tempfile::TempDir;

use crate::helpers::{arg, reads, run_minorseq, write_amplicon_bam};

/// Majority bases win and a well supported codon insertion is spliced in.
#[test]
fn test_fuse_majority_with_insertion() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let output = temp_dir.path().join("consensus.fasta");

    let mut records = reads("plain", 4, 1, "ACGTACGTAC", "10=");
    records.extend(reads("ins", 8, 1, "ACGTAGGGCGTAC", "5=3I5="));
    records.extend(reads("snp", 2, 1, "ACGTTCGTAC", "4=1X5="));
    write_amplicon_bam(&input, "ref", 10, &records);

    let result = run_minorseq(&["fuse", arg(&input), arg(&output)]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let fasta = fs::read_to_string(&output).unwrap();
    let mut lines = fasta.lines();
    assert_eq!(lines.next(), Some(">CONSENSUS"));
    let sequence: String = lines.collect();
    assert_eq!(sequence, "ACGTAGGGCGTAC");
}

/// Without an explicit output the FASTA is written next to the input.
#[test]
fn test_fuse_default_output() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("sample.bam");
    write_amplicon_bam(&input, "ref", 8, &reads("r", 3, 1, "ACGTACGT", "8="));

    let result = run_minorseq(&["fuse", arg(&input)]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let fasta = fs::read_to_string(temp_dir.path().join("sample.fasta")).unwrap();
    assert!(fasta.contains("ACGTACGT"));
}

/// A BAM without aligned reads is an error.
#[test]
fn test_fuse_empty_input_fails() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("empty.bam");
    let output = temp_dir.path().join("out.fasta");
    write_amplicon_bam(&input, "ref", 8, &[]);

    let result = run_minorseq(&["fuse", arg(&input), arg(&output)]);
    assert!(!result.status.success());
    assert!(!output.exists());
}
