//! BAM file I/O utilities.
//!
//! Readers and writers with consistent error handling and header management.
//!
//! # Threading Model
//!
//! BAM files use BGZF compression, which can be parallelized for both reading and writing:
//!
//! - **Single-threaded**: `threads=1` (lower overhead, the default for amplicon-sized inputs)
//! - **Multi-threaded**: `threads>1` (higher throughput for large inputs)

use anyhow::{Context, Result};
use noodles::bgzf::io::{
    MultithreadedReader, MultithreadedWriter, Reader as BgzfReader, Writer as BgzfWriter,
};
use noodles::sam::Header;
use noodles::sam::alignment::RecordBuf;
use std::fs::File;
use std::io::{self, BufRead, Read, Write};
use std::num::NonZero;
use std::path::Path;

use crate::progress::ProgressTracker;

/// Single-threaded or multi-threaded BGZF reader behind one interface.
pub enum BgzfReaderEnum {
    /// Single-threaded BGZF reader
    SingleThreaded(BgzfReader<File>),
    /// Multi-threaded BGZF reader
    MultiThreaded(MultithreadedReader<File>),
}

impl Read for BgzfReaderEnum {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BgzfReaderEnum::SingleThreaded(r) => r.read(buf),
            BgzfReaderEnum::MultiThreaded(r) => r.read(buf),
        }
    }
}

impl BufRead for BgzfReaderEnum {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            BgzfReaderEnum::SingleThreaded(r) => r.fill_buf(),
            BgzfReaderEnum::MultiThreaded(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            BgzfReaderEnum::SingleThreaded(r) => r.consume(amt),
            BgzfReaderEnum::MultiThreaded(r) => r.consume(amt),
        }
    }
}

/// BAM reader over either BGZF reader flavour.
pub type BamReaderAuto = noodles::bam::io::Reader<BgzfReaderEnum>;

/// Single-threaded or multi-threaded BGZF writer behind one interface.
pub enum BgzfWriterEnum {
    /// Single-threaded BGZF writer
    SingleThreaded(BgzfWriter<File>),
    /// Multi-threaded BGZF writer
    MultiThreaded(MultithreadedWriter<File>),
}

impl Write for BgzfWriterEnum {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            BgzfWriterEnum::SingleThreaded(w) => w.write(buf),
            BgzfWriterEnum::MultiThreaded(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            BgzfWriterEnum::SingleThreaded(w) => w.flush(),
            BgzfWriterEnum::MultiThreaded(w) => w.flush(),
        }
    }
}

impl BgzfWriterEnum {
    /// Flush all blocks and write the BGZF EOF marker.
    ///
    /// # Errors
    /// Returns an error if flushing or finalizing the writer fails.
    pub fn finish(self) -> io::Result<()> {
        match self {
            BgzfWriterEnum::SingleThreaded(w) => w.finish().map(|_| ()),
            BgzfWriterEnum::MultiThreaded(mut w) => w.finish().map(|_| ()),
        }
    }
}

/// BAM writer over either BGZF writer flavour.
pub type BamWriter = noodles::bam::io::Writer<BgzfWriterEnum>;

/// Open a BAM file and read its header.
///
/// # Errors
/// Returns an error if the file cannot be opened or the header cannot be read
pub fn create_bam_reader<P: AsRef<Path>>(
    path: P,
    threads: usize,
) -> Result<(BamReaderAuto, Header)> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open input BAM: {}", path_ref.display()))?;

    let bgzf_reader = match NonZero::new(threads).filter(|n| n.get() > 1) {
        Some(worker_count) => {
            BgzfReaderEnum::MultiThreaded(MultithreadedReader::with_worker_count(worker_count, file))
        }
        None => BgzfReaderEnum::SingleThreaded(BgzfReader::new(file)),
    };

    let mut reader = noodles::bam::io::Reader::from(bgzf_reader);
    let header = reader
        .read_header()
        .with_context(|| format!("Failed to read header from: {}", path_ref.display()))?;

    Ok((reader, header))
}

/// Create a BAM file and write `header` to it.
///
/// # Errors
/// Returns an error if the file cannot be created or the header cannot be written
pub fn create_bam_writer<P: AsRef<Path>>(
    path: P,
    header: &Header,
    threads: usize,
) -> Result<BamWriter> {
    let path_ref = path.as_ref();
    let output_file = File::create(path_ref)
        .with_context(|| format!("Failed to create output BAM: {}", path_ref.display()))?;

    let bgzf_writer = match NonZero::new(threads).filter(|n| n.get() > 1) {
        Some(worker_count) => BgzfWriterEnum::MultiThreaded(MultithreadedWriter::with_worker_count(
            worker_count,
            output_file,
        )),
        None => BgzfWriterEnum::SingleThreaded(BgzfWriter::new(output_file)),
    };

    let mut writer = noodles::bam::io::Writer::from(bgzf_writer);
    writer
        .write_header(header)
        .with_context(|| format!("Failed to write header to: {}", path_ref.display()))?;
    Ok(writer)
}

/// Finish a writer from [`create_bam_writer`], writing the EOF block.
///
/// # Errors
/// Returns an error if the final blocks cannot be flushed
pub fn finish_bam_writer(writer: BamWriter) -> Result<()> {
    writer.into_inner().finish().context("Failed to finish output BAM")
}

/// Read every record of a BAM file into memory, logging progress.
///
/// Amplicon inputs fit comfortably in memory and every consumer here needs random access
/// to the full pileup, so records are not streamed.
///
/// # Errors
/// Returns an error if the file cannot be opened or a record cannot be decoded
pub fn read_all_records<P: AsRef<Path>>(
    path: P,
    threads: usize,
) -> Result<(Header, Vec<RecordBuf>)> {
    let path_ref = path.as_ref();
    let (mut reader, header) = create_bam_reader(path_ref, threads)?;
    let progress = ProgressTracker::new("Read records").with_interval(100_000);

    let mut records = Vec::new();
    for result in reader.record_bufs(&header) {
        let record =
            result.with_context(|| format!("Failed to read record from: {}", path_ref.display()))?;
        records.push(record);
        progress.log_if_needed(1);
    }
    progress.log_final();

    Ok((header, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sam::builder::{RecordBuilder, single_reference_header};
    use noodles::sam::alignment::io::Write as AlignmentWrite;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bam");
        let header = single_reference_header("ref", 100);

        let mut writer = create_bam_writer(&path, &header, 1).unwrap();
        for i in 0..3 {
            let record = RecordBuilder::new()
                .name(&format!("r{i}"))
                .sequence("ACGTACGT")
                .reference_sequence_id(0)
                .alignment_start(10 + i)
                .cigar("8=")
                .build();
            writer.write_alignment_record(&header, &record).unwrap();
        }
        finish_bam_writer(writer).unwrap();

        let (read_header, records) = read_all_records(&path, 1).unwrap();
        assert_eq!(read_header.reference_sequences().len(), 1);
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].alignment_start().map(usize::from), Some(12));
    }

    #[test]
    fn test_multithreaded_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mt.bam");
        let header = single_reference_header("ref", 100);

        let mut writer = create_bam_writer(&path, &header, 2).unwrap();
        let record = RecordBuilder::new()
            .name("r")
            .sequence("ACGT")
            .reference_sequence_id(0)
            .alignment_start(1)
            .build();
        writer.write_alignment_record(&header, &record).unwrap();
        finish_bam_writer(writer).unwrap();

        let (_, records) = read_all_records(&path, 2).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_missing_input_has_context() {
        let err = create_bam_reader("/no/such/input.bam", 1).err().expect("expected an error opening a missing BAM");
        assert!(format!("{err:#}").contains("Failed to open input BAM"));
    }
}
