//! End-to-end CLI tests for the cleric command.

use std::fs;

use minorseq_lib::bam_io::read_all_records;
use minorseq_lib::sam::builder::write_fasta;
use minorseq_lib::sam::kind_to_char;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use tempfile::TempDir;

use crate::helpers::{arg, reads, run_minorseq, write_amplicon_bam};

fn cigar_string(record: &noodles::sam::alignment::RecordBuf) -> String {
    record
        .cigar()
        .as_ref()
        .iter()
        .map(|op| format!("{}{}", op.len(), char::from(kind_to_char(op.kind()))))
        .collect()
}

/// Reads move onto the shorter new reference and the header names it.
#[test]
fn test_cleric_retargets_onto_new_reference() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let from = temp_dir.path().join("from.fasta");
    let to = temp_dir.path().join("to.fasta");
    let output = temp_dir.path().join("retargeted.bam");

    write_amplicon_bam(&input, "old", 12, &reads("r", 3, 3, "ACGTACGT", "8="));
    write_fasta(&from, &[("old", "TTACGTACGTTT")]).unwrap();
    write_fasta(&to, &[("new", "acgtacgt")]).unwrap();

    let result = run_minorseq(&["cleric", arg(&input), arg(&from), arg(&to), arg(&output)]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let (header, records) = read_all_records(&output, 1).unwrap();
    let sequences: Vec<(String, usize)> = header
        .reference_sequences()
        .iter()
        .map(|(name, map)| (name.to_string(), usize::from(map.length())))
        .collect();
    assert_eq!(sequences, vec![("new".to_string(), 8)]);
    assert!(!header.programs().as_ref().is_empty());

    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(record.alignment_start().map(usize::from), Some(1));
        assert_eq!(cigar_string(record), "8=");
        assert_eq!(record.data().get(&Tag::EDIT_DISTANCE), Some(&Value::from(0)));
    }
}

/// With only a BAM and an output, the gapped pair comes from --aln.
#[test]
fn test_cleric_prealigned() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let aln = temp_dir.path().join("pair.fasta");
    let output = temp_dir.path().join("out.consensusalignmentset.xml");

    write_amplicon_bam(&input, "old", 10, &reads("r", 2, 4, "ACGAAC", "6M"));
    write_fasta(&aln, &[("new", "---ACGTACG"), ("old", "GGGACGTACG")]).unwrap();

    let result = run_minorseq(&["cleric", "--aln", arg(&aln), arg(&input), arg(&output)]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let xml = fs::read_to_string(&output).unwrap();
    assert!(xml.contains("ConsensusAlignmentSet"));
    assert!(xml.contains("out.bam"));

    let (_, records) = read_all_records(temp_dir.path().join("out.bam"), 1).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].alignment_start().map(usize::from), Some(1));
    assert_eq!(records[0].data().get(&Tag::EDIT_DISTANCE), Some(&Value::from(1)));
}

/// Two files without --aln is rejected.
#[test]
fn test_cleric_two_files_require_aln() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let output = temp_dir.path().join("out.bam");
    write_amplicon_bam(&input, "old", 10, &reads("r", 1, 1, "ACGT", "4="));

    let result = run_minorseq(&["cleric", arg(&input), arg(&output)]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("--aln"));
}

/// The BAM's reference must be among the FASTA records.
#[test]
fn test_cleric_missing_original_reference() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let to = temp_dir.path().join("to.fasta");
    let output = temp_dir.path().join("out.bam");
    write_amplicon_bam(&input, "old", 12, &reads("r", 1, 3, "ACGTACGT", "8="));
    write_fasta(&to, &[("new", "ACGTACGT")]).unwrap();

    let result = run_minorseq(&["cleric", arg(&input), arg(&to), arg(&output)]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("Reference sequence 'old' not found"));
    assert!(!output.exists());
}
