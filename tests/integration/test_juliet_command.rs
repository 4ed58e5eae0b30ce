//! End-to-end CLI tests for the juliet command.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tempfile::TempDir;

use crate::helpers::{arg, reads, run_minorseq, write_amplicon_bam};

/// 200 reads of the reference codons and 40 with AAA -> AGA at the second codon.
fn write_population(path: &Path) {
    let mut records = reads("wt", 200, 1, "ATGAAACCCGGG", "12=");
    records.extend(reads("mut", 40, 1, "ATGAGACCCGGG", "4=1X7="));
    write_amplicon_bam(path, "ref", 12, &records);
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

/// Without outputs, an HTML and a JSON report land next to the input.
#[test]
fn test_juliet_default_reports() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("sample.bam");
    write_population(&input);

    let result = run_minorseq(&["juliet", arg(&input)]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let json = read_json(&temp_dir.path().join("sample.json"));
    let gene = &json["genes"][0];
    assert_eq!(gene["name"], "Unnamed ORF");
    let position = &gene["variant_positions"][0];
    assert_eq!(position["ref_codon"], "AAA");
    assert_eq!(position["ref_amino_acid"], "K");
    assert_eq!(position["ref_position"], 2);
    assert_eq!(position["coverage"], 240);
    let amino_acid = &position["variant_amino_acids"][0];
    assert_eq!(amino_acid["amino_acid"], "R");
    assert_eq!(amino_acid["variant_codons"][0]["codon"], "AGA");
    assert!(amino_acid["variant_codons"][0]["pValue"].as_f64().unwrap() < 0.01);
    assert!(json["haplotypes"].as_array().unwrap().is_empty());

    let html = fs::read_to_string(temp_dir.path().join("sample.html")).unwrap();
    assert!(html.contains("Juliet Minor Variant Summary"));
    assert!(html.contains("Unnamed ORF"));
}

/// Phasing reports the two haplotypes, and the MSA output lists every column.
#[test]
fn test_juliet_phasing_with_explicit_outputs() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let json = temp_dir.path().join("report.json");
    let msa = temp_dir.path().join("counts.msa");
    write_population(&input);

    let result = run_minorseq(&["juliet", "--mode-phasing", arg(&input), arg(&json), arg(&msa)]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));
    assert!(!temp_dir.path().join("input.html").exists());

    let report = read_json(&json);
    let haplotypes = report["haplotypes"].as_array().unwrap();
    assert_eq!(haplotypes.len(), 2);
    assert_eq!(haplotypes[0]["name"], "A");
    assert_eq!(haplotypes[0]["reads_hard"], 200);
    assert_eq!(haplotypes[1]["codons"][0], "AGA");
    assert_eq!(report["haplotype_read_counts"]["healthy_reported"], 240);

    let counts = fs::read_to_string(&msa).unwrap();
    let lines: Vec<&str> = counts.lines().collect();
    assert_eq!(lines.len(), 13);
    assert!(lines[0].starts_with("pos"));
    assert!(lines[1].starts_with('1'));
}

/// Region clipping restricts the tested codons to the region.
#[test]
fn test_juliet_region() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let json = temp_dir.path().join("report.json");
    write_population(&input);

    let result = run_minorseq(&["juliet", "--region", "4-9", arg(&input), arg(&json)]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let report = read_json(&json);
    let position = &report["genes"][0]["variant_positions"][0];
    assert_eq!(position["ref_codon"], "AAA");
    assert_eq!(position["ref_position"], 1);
}

/// Error mode prints one TSV row per input.
#[test]
fn test_juliet_error_mode() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    write_population(&input);

    let result = run_minorseq(&["juliet", "--mode-error", arg(&input)]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let stdout = String::from_utf8(result.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "file\tsub\tdel");
    let fields: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(fields[0], arg(&input));
    let substitution: f64 = fields[1].parse().unwrap();
    let deletion: f64 = fields[2].parse().unwrap();
    // one of twelve columns carries 40 of 240 non-majority bases
    assert!((substitution - 40.0 / 240.0 / 12.0).abs() < 1e-9);
    assert!(deletion.abs() < f64::EPSILON);
}

#[test]
fn test_juliet_modes_are_exclusive() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    write_population(&input);

    let result = run_minorseq(&["juliet", "--mode-phasing", "--mode-error", arg(&input)]);
    assert!(!result.status.success());
}

#[test]
fn test_juliet_rejects_non_positive_region() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    write_population(&input);

    let result = run_minorseq(&["juliet", "--region", "0-9", arg(&input)]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("1-based"));
}
