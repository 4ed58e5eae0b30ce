//! PacBio DataSet XML handling.
//!
//! A DataSet XML is a thin wrapper naming one or more external resources (BAM or FASTA files).
//! Only the parts needed to locate those resources are read: the root element, which gives the
//! dataset type, and every `ExternalResource` element's `ResourceId` and `MetaType`
//! attributes. Writing produces a minimal `ConsensusAlignmentSet` that references one BAM.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use regex::Regex;

use crate::errors::MinorseqError;

static ROOT_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:[A-Za-z_][\w.\-]*:)?([A-Za-z_][\w.\-]*)").expect("valid regex")
});
static EXTERNAL_RESOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:[A-Za-z_][\w.\-]*:)?ExternalResource\b([^>]*)>").expect("valid regex")
});
static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Za-z_][\w.\-]*)\s*=\s*"([^"]*)""#).expect("valid regex"));

/// Type of a dataset, taken from its root element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSetKind {
    Subread,
    Alignment,
    ConsensusAlignment,
    ConsensusRead,
    Reference,
    Unknown,
}

impl DataSetKind {
    fn from_root(name: &str) -> Self {
        match name {
            "SubreadSet" => Self::Subread,
            "AlignmentSet" => Self::Alignment,
            "ConsensusAlignmentSet" => Self::ConsensusAlignment,
            "ConsensusReadSet" => Self::ConsensusRead,
            "ReferenceSet" => Self::Reference,
            _ => Self::Unknown,
        }
    }

    /// True for datasets whose resources are aligned BAM files.
    #[must_use]
    pub fn is_alignment(self) -> bool {
        matches!(self, Self::Alignment | Self::ConsensusAlignment)
    }
}

impl fmt::Display for DataSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Subread => "SubreadSet",
            Self::Alignment => "AlignmentSet",
            Self::ConsensusAlignment => "ConsensusAlignmentSet",
            Self::ConsensusRead => "ConsensusReadSet",
            Self::Reference => "ReferenceSet",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// One `ExternalResource` of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalResource {
    pub path: PathBuf,
    pub meta_type: String,
}

/// A parsed DataSet XML, or a bare BAM/FASTA file treated as a one-resource dataset.
#[derive(Debug, Clone)]
pub struct DataSet {
    pub kind: DataSetKind,
    pub resources: Vec<ExternalResource>,
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// True when `path` names a FASTA file.
#[must_use]
pub fn is_fasta(path: &Path) -> bool {
    has_extension(path, &["fasta", "fa", "fna", "fsa"])
}

/// True when `path` names a BAM file.
#[must_use]
pub fn is_bam(path: &Path) -> bool {
    has_extension(path, &["bam"])
}

/// File name with its dataset suffix removed, e.g. `in.consensusalignmentset.xml` -> `in`.
#[must_use]
pub fn output_prefix(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let lower = name.to_ascii_lowercase();
    let stem = if let Some(idx) = lower.find("set.xml") {
        // drop ".<kind>set.xml"
        name[..idx].rfind('.').map_or(&name[..idx], |dot| &name[..dot])
    } else {
        name.rfind('.').map_or(name.as_str(), |dot| &name[..dot])
    };
    path.with_file_name(stem)
}

impl DataSet {
    /// Read a dataset. BAM and FASTA paths are wrapped without parsing.
    ///
    /// # Errors
    /// Returns an error if the XML cannot be read or names no resources.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if is_bam(path) {
            let meta_type = "PacBio.AlignmentFile.AlignmentBamFile";
            return Ok(Self::single(DataSetKind::Alignment, path, meta_type));
        }
        if is_fasta(path) {
            let meta_type = "PacBio.ReferenceFile.ReferenceFastaFile";
            return Ok(Self::single(DataSetKind::Reference, path, meta_type));
        }

        let xml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read DataSet XML: {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let dataset = Self::parse(&xml, base_dir);
        if dataset.resources.is_empty() {
            return Err(MinorseqError::InvalidFileFormat {
                file_type: "DataSet XML".to_string(),
                path: path.display().to_string(),
                reason: "no ExternalResource with a ResourceId".to_string(),
            }
            .into());
        }
        Ok(dataset)
    }

    fn single(kind: DataSetKind, path: &Path, meta_type: &str) -> Self {
        Self {
            kind,
            resources: vec![ExternalResource {
                path: path.to_path_buf(),
                meta_type: meta_type.to_string(),
            }],
        }
    }

    /// Parse XML text, resolving relative resource ids against `base_dir`.
    #[must_use]
    pub fn parse(xml: &str, base_dir: &Path) -> Self {
        let kind = ROOT_ELEMENT
            .captures(xml)
            .map_or(DataSetKind::Unknown, |c| DataSetKind::from_root(&c[1]));

        let resources = EXTERNAL_RESOURCE
            .captures_iter(xml)
            .filter_map(|c| {
                let mut resource_id = None;
                let mut meta_type = String::new();
                for attr in ATTRIBUTE.captures_iter(&c[1]) {
                    match &attr[1] {
                        "ResourceId" => resource_id = Some(attr[2].to_string()),
                        "MetaType" => meta_type = attr[2].to_string(),
                        _ => {}
                    }
                }
                let id = resource_id?;
                let id = id.strip_prefix("file://").unwrap_or(&id);
                let path = Path::new(id);
                let path = if path.is_absolute() { path.to_path_buf() } else { base_dir.join(path) };
                Some(ExternalResource { path, meta_type })
            })
            .collect();

        Self { kind, resources }
    }

    /// Kind of the dataset at `path` without keeping the resources.
    ///
    /// # Errors
    /// Returns an error if the XML cannot be read.
    pub fn kind_of<P: AsRef<Path>>(path: P) -> Result<DataSetKind> {
        Ok(Self::read(path)?.kind)
    }

    /// BAM resources, skipping scraps files.
    #[must_use]
    pub fn bam_files(&self) -> Vec<PathBuf> {
        self.resources
            .iter()
            .filter(|r| is_bam(&r.path) && !r.meta_type.contains("Scraps"))
            .map(|r| r.path.clone())
            .collect()
    }

    /// FASTA resources.
    #[must_use]
    pub fn fasta_files(&self) -> Vec<PathBuf> {
        self.resources.iter().filter(|r| is_fasta(&r.path)).map(|r| r.path.clone()).collect()
    }

    /// The single BAM of an alignment dataset.
    ///
    /// # Errors
    /// Returns an error if the dataset has zero or several BAM resources.
    pub fn single_bam(&self, source: &Path) -> Result<PathBuf> {
        match self.bam_files().as_slice() {
            [bam] => Ok(bam.clone()),
            bams => Err(MinorseqError::InvalidFileFormat {
                file_type: "DataSet XML".to_string(),
                path: source.display().to_string(),
                reason: format!("expected exactly one BAM resource, found {}", bams.len()),
            }
            .into()),
        }
    }

    /// Write a `ConsensusAlignmentSet` XML at `xml_path` that references `bam_path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_alignment_set(xml_path: &Path, bam_path: &Path) -> Result<()> {
        let seconds =
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let name = format!("minorseq_consensusalignmentset-{seconds}");
        let resource_id = match (bam_path.parent(), xml_path.parent()) {
            (Some(bam_dir), Some(xml_dir)) if bam_dir == xml_dir => {
                bam_path.file_name().map_or_else(|| bam_path.to_path_buf(), PathBuf::from)
            }
            _ => bam_path.to_path_buf(),
        };
        let resource_id = xml_escape(&resource_id.display().to_string());

        let xml = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<pbds:ConsensusAlignmentSet MetaType="PacBio.DataSet.ConsensusAlignmentSet" Name="{name}" Tags="" UniqueId="{set_id}" Version="3.0.1" xmlns="http://pacificbiosciences.com/PacBioDatasets.xsd" xmlns:pbbase="http://pacificbiosciences.com/PacBioBaseDataModel.xsd" xmlns:pbds="http://pacificbiosciences.com/PacBioDatasets.xsd">
    <pbbase:ExternalResources>
        <pbbase:ExternalResource MetaType="PacBio.ConsensusReadFile.ConsensusReadBamFile" ResourceId="{resource_id}" TimeStampedName="{name}-bam" UniqueId="{bam_id}"/>
    </pbbase:ExternalResources>
</pbds:ConsensusAlignmentSet>
"#,
            set_id = pseudo_uuid(&(xml_path, seconds)),
            bam_id = pseudo_uuid(&(bam_path, seconds)),
        );
        std::fs::write(xml_path, xml)
            .with_context(|| format!("Failed to write DataSet XML: {}", xml_path.display()))
    }
}

/// Escape the characters that cannot appear in an XML attribute value.
#[must_use]
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn pseudo_uuid<T: Hash>(seed: &T) -> String {
    let mut h1 = DefaultHasher::new();
    seed.hash(&mut h1);
    let a = h1.finish();
    let mut h2 = DefaultHasher::new();
    (seed, a).hash(&mut h2);
    let b = h2.finish();
    format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        a >> 32,
        (a >> 16) & 0xffff,
        a & 0x0fff,
        (b >> 48) | 0x8000,
        b & 0xffff_ffff_ffff
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    const ALIGNMENT_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!-- consensus alignments -->
<pbds:ConsensusAlignmentSet CreatedAt="2016-01-01T00:00:00" MetaType="PacBio.DataSet.ConsensusAlignmentSet" xmlns:pbds="x">
  <pbbase:ExternalResources>
    <pbbase:ExternalResource MetaType="PacBio.ConsensusReadFile.ConsensusReadBamFile" ResourceId="mix.bam">
      <pbbase:FileIndices>
        <pbbase:FileIndex MetaType="PacBio.Index.PacBioIndex" ResourceId="mix.bam.pbi"/>
      </pbbase:FileIndices>
    </pbbase:ExternalResource>
  </pbbase:ExternalResources>
</pbds:ConsensusAlignmentSet>
"#;

    #[test]
    fn test_parse_alignment_set() {
        let dataset = DataSet::parse(ALIGNMENT_XML, Path::new("/data"));
        assert_eq!(dataset.kind, DataSetKind::ConsensusAlignment);
        assert!(dataset.kind.is_alignment());
        assert_eq!(dataset.bam_files(), vec![PathBuf::from("/data/mix.bam")]);
        assert!(dataset.fasta_files().is_empty());
    }

    #[test]
    fn test_parse_reference_set_with_file_uri() {
        let xml = r#"<ReferenceSet><ExternalResources>
            <ExternalResource ResourceId="file:///refs/hxb2.fasta" MetaType="PacBio.ReferenceFile.ReferenceFastaFile"/>
        </ExternalResources></ReferenceSet>"#;
        let dataset = DataSet::parse(xml, Path::new("/ignored"));
        assert_eq!(dataset.kind, DataSetKind::Reference);
        assert_eq!(dataset.fasta_files(), vec![PathBuf::from("/refs/hxb2.fasta")]);
    }

    #[test]
    fn test_scraps_are_not_bam_inputs() {
        let xml = r#"<pbds:SubreadSet>
            <pbbase:ExternalResource MetaType="PacBio.SubreadFile.SubreadBamFile" ResourceId="a.subreads.bam">
              <pbbase:ExternalResources>
                <pbbase:ExternalResource MetaType="PacBio.SubreadFile.ScrapsBamFile" ResourceId="a.scraps.bam"/>
              </pbbase:ExternalResources>
            </pbbase:ExternalResource></pbds:SubreadSet>"#;
        let dataset = DataSet::parse(xml, Path::new("d"));
        assert_eq!(dataset.kind, DataSetKind::Subread);
        assert_eq!(dataset.resources.len(), 2);
        assert_eq!(dataset.bam_files(), vec![PathBuf::from("d/a.subreads.bam")]);
    }

    #[test]
    fn test_bare_files_are_single_resource_datasets() {
        let bam = DataSet::read("reads.bam").unwrap();
        assert_eq!(bam.kind, DataSetKind::Alignment);
        assert_eq!(bam.single_bam(Path::new("reads.bam")).unwrap(), PathBuf::from("reads.bam"));

        let fasta = DataSet::read("ref.FASTA").unwrap();
        assert_eq!(fasta.kind, DataSetKind::Reference);
    }

    #[test]
    fn test_read_rejects_xml_without_resources() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.alignmentset.xml");
        std::fs::write(&path, "<pbds:AlignmentSet></pbds:AlignmentSet>").unwrap();
        let err = DataSet::read(&path).unwrap_err();
        assert!(err.to_string().contains("no ExternalResource"));
    }

    #[test]
    fn test_write_then_read_alignment_set() {
        let dir = TempDir::new().unwrap();
        let xml = dir.path().join("cleric.consensusalignmentset.xml");
        let bam = dir.path().join("cleric.bam");
        DataSet::write_alignment_set(&xml, &bam).unwrap();

        let dataset = DataSet::read(&xml).unwrap();
        assert_eq!(dataset.kind, DataSetKind::ConsensusAlignment);
        assert_eq!(dataset.single_bam(&xml).unwrap(), bam);
        assert_eq!(DataSet::kind_of(&xml).unwrap(), DataSetKind::ConsensusAlignment);
        assert!(DataSet::kind_of(&xml).unwrap().is_alignment());
    }

    #[rstest]
    #[case("/a/mix_hxb2.consensusalignmentset.xml", "/a/mix_hxb2")]
    #[case("/a/ref.referenceset.xml", "/a/ref")]
    #[case("/a/reads.bam", "/a/reads")]
    #[case("reads", "reads")]
    fn test_output_prefix(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(output_prefix(Path::new(input)), PathBuf::from(expected));
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape(r#"a&b<"c">"#), "a&amp;b&lt;&quot;c&quot;&gt;");
    }
}
