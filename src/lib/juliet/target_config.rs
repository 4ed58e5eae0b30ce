//! Genes of interest, their drug-resistance mutations and expected minor variants.
//!
//! A config is JSON and can be supplied as a predefined tag, a path to a JSON file or the JSON
//! text itself:
//!
//! ```json
//! {
//!   "referenceName": "HXB2",
//!   "genes": [
//!     {
//!       "name": "Protease", "begin": 2253, "end": 2550,
//!       "drms": [{ "name": "ATV/r", "positions": ["V32I", "L33F"] }],
//!       "minors": [{ "position": 32, "aminoacid": "I", "codon": "ATA" }]
//!     }
//!   ]
//! }
//! ```
//!
//! Gene coordinates are 1-based in reference space with an exclusive end.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::MinorseqError;

/// Tag of the predefined HIV config.
pub const HIV_HXB2: &str = "HIV_HXB2";

const HIV_HXB2_CONFIG: &str = r#"{
  "referenceName": "HXB2",
  "version": "1.0",
  "dbVersion": "IAS-USA drug resistance mutations",
  "genes": [
    {
      "name": "Protease", "begin": 2253, "end": 2550,
      "drms": [
        { "name": "ATV/r", "positions": [
          "V32I", "L33F", "M46I", "M46L", "I47V", "G48V", "G48M", "I50L", "I54V", "I54T",
          "I54A", "I54L", "I54M", "D60E", "I62V", "I64L", "I64M", "I64V", "A71V", "A71I",
          "A71T", "A71L", "G73C", "G73S", "G73T", "G73A", "V82A", "V82T", "V82F", "V82I",
          "I84V", "I85V", "N88S", "L90M"] },
        { "name": "DRV/r", "positions": [
          "V11I", "V32I", "L33F", "I47V", "I50V", "I54M", "I54L", "T74P", "L76V", "I84V",
          "L89V"] },
        { "name": "LPV/r", "positions": [
          "L10F", "K20M", "K20R", "L24I", "V32I", "L33F", "M46I", "M46L", "I47V", "I47A",
          "G48V", "G48M", "I50V", "F53L", "I54V", "L63P", "A71V", "A71T", "G73S", "L76V",
          "V82A", "V82F", "V82T", "V82S", "I84V", "L90M"] }
      ]
    },
    {
      "name": "Reverse Transcriptase", "begin": 2550, "end": 4230,
      "drms": [
        { "name": "NNRTI", "positions": [
          "L100I", "K101P", "K103N", "K103S", "V106A", "V106M", "V108I", "Y181C", "Y181I",
          "Y188C", "Y188H", "Y188L", "G190A", "G190S", "P225H"] },
        { "name": "3TC/FTC", "positions": ["K65R", "M184V", "M184I"] },
        { "name": "TDF", "positions": ["K65R", "K70E"] },
        { "name": "AZT", "positions": [
          "M41L", "D67N", "K70R", "L210W", "T215Y", "T215F", "K219Q", "K219E"] }
      ]
    },
    {
      "name": "Integrase", "begin": 4230, "end": 5094,
      "drms": [
        { "name": "RAL", "positions": [
          "T66I", "E92Q", "E138K", "G140S", "G140A", "Y143R", "Y143C", "Y143H", "S147G",
          "Q148H", "Q148R", "Q148K", "N155H"] },
        { "name": "EVG", "positions": [
          "T66I", "T66A", "T66K", "E92Q", "E92G", "T97A", "S147G", "Q148H", "Q148R", "Q148K",
          "N155H"] },
        { "name": "DTG", "positions": [
          "E138A", "E138K", "G140S", "G140A", "Q148H", "Q148R", "R263K"] }
      ]
    }
  ]
}"#;

/// A mutation of one amino acid, written as `<ref><position><alt>`, e.g. `K103N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DMutation {
    pub ref_aa: char,
    /// 1-based amino-acid position within the gene.
    pub position: usize,
    pub cur_aa: char,
}

impl DMutation {
    #[must_use]
    pub fn new(ref_aa: char, position: usize, cur_aa: char) -> Self {
        Self { ref_aa, position, cur_aa }
    }
}

impl fmt::Display for DMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.ref_aa, self.position, self.cur_aa)
    }
}

impl FromStr for DMutation {
    type Err = MinorseqError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = |reason: &str| MinorseqError::InvalidParameter {
            parameter: "drm".to_string(),
            reason: format!("'{s}' {reason}"),
        };
        let mut chars = s.chars();
        let (Some(ref_aa), Some(cur_aa)) = (chars.next(), chars.next_back()) else {
            return Err(invalid("is too short"));
        };
        let position = chars
            .as_str()
            .parse::<usize>()
            .map_err(|_| invalid("does not have the form <ref><position><alt>"))?;
        Ok(Self { ref_aa, position, cur_aa })
    }
}

impl TryFrom<String> for DMutation {
    type Error = MinorseqError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DMutation> for String {
    fn from(value: DMutation) -> Self {
        value.to_string()
    }
}

/// A drug and the mutations conferring resistance to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drm {
    pub name: String,
    #[serde(default)]
    pub positions: Vec<DMutation>,
}

/// A minor variant known to be present in the sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedMinor {
    pub position: usize,
    pub aminoacid: String,
    pub codon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGene {
    pub begin: usize,
    pub end: usize,
    pub name: String,
    #[serde(default)]
    pub drms: Vec<Drm>,
    #[serde(default)]
    pub minors: Vec<ExpectedMinor>,
}

impl TargetGene {
    /// Names of drugs affected by `mutation`, joined by ` + `.
    #[must_use]
    pub fn find_drms(&self, mutation: &DMutation) -> String {
        self.drms
            .iter()
            .filter(|drm| drm.positions.contains(mutation))
            .map(|drm| drm.name.as_str())
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    #[serde(default)]
    pub genes: Vec<TargetGene>,
    #[serde(default)]
    pub reference_name: String,
    #[serde(default)]
    pub reference_sequence: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub db_version: String,
}

impl TargetConfig {
    /// Resolve a user supplied config: empty, a predefined tag, a JSON file or JSON text.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the JSON cannot be parsed.
    pub fn resolve(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Ok(Self::default());
        }
        if input == HIV_HXB2 {
            return Self::from_json(HIV_HXB2_CONFIG);
        }
        let path = Path::new(input);
        if path.is_file() {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read target config: {}", path.display()))?;
            return Self::from_json(&json)
                .with_context(|| format!("Invalid target config file: {}", path.display()));
        }
        Self::from_json(input)
    }

    /// Parse a config from JSON text.
    ///
    /// # Errors
    /// Returns an error if `json` is not a valid config.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Self =
            serde_json::from_str(json).context("Failed to parse target config JSON")?;
        config.reference_sequence.make_ascii_uppercase();
        Ok(config)
    }

    #[must_use]
    pub fn num_expected_minors(&self) -> usize {
        self.genes.iter().map(|g| g.minors.len()).sum()
    }

    #[must_use]
    pub fn has_expected_minors(&self) -> bool {
        self.num_expected_minors() > 0
    }

    #[must_use]
    pub fn has_reference(&self) -> bool {
        !self.reference_name.is_empty() && !self.reference_sequence.is_empty()
    }
}
