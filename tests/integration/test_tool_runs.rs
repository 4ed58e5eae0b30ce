//! Smoke runs of each tool on the shared amplicon test data.
//!
//! The data lives outside the repository. Every test returns early when the directory is
//! missing; set `MINORSEQ_TESTDATA` to point at another copy.

use std::path::PathBuf;

use tempfile::TempDir;

use crate::helpers::{arg, run_minorseq};

const DEFAULT_TESTDATA: &str = "/pbi/dept/secondary/siv/testdata/minorseq-test";

/// The test data directory, or `None` when it is not available.
fn testdata() -> Option<PathBuf> {
    let dir = std::env::var_os("MINORSEQ_TESTDATA")
        .map_or_else(|| PathBuf::from(DEFAULT_TESTDATA), PathBuf::from);
    if dir.is_dir() {
        Some(dir)
    } else {
        eprintln!("Skipping: test data directory {} not found", dir.display());
        None
    }
}

#[test]
fn test_fuse_runs() {
    let Some(data) = testdata() else { return };
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("consensus.fasta");

    let result = run_minorseq(&[
        "fuse",
        arg(&data.join("mix_hxb2.consensusalignmentset.xml")),
        arg(&output),
    ]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));
}

#[test]
fn test_cleric_runs() {
    let Some(data) = testdata() else { return };
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("cleric.bam");

    let result = run_minorseq(&[
        "cleric",
        arg(&data.join("mix_hxb2.consensusalignmentset.xml")),
        arg(&data.join("consensus.referenceset.xml")),
        arg(&data.join("hxb2.referenceset.xml")),
        arg(&output),
    ]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));
}

#[test]
fn test_juliet_runs() {
    let Some(data) = testdata() else { return };
    let temp_dir = TempDir::new().unwrap();
    let json = temp_dir.path().join("juliet.json");
    let html = temp_dir.path().join("juliet.html");

    let result = run_minorseq(&[
        "juliet",
        arg(&data.join("cleric.consensusalignmentset.xml")),
        arg(&json),
        arg(&html),
    ]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));
}
