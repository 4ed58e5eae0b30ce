//! Amino-acid minor variant calling and haplotype phasing.
//!
//! - [`error_estimates`] - Per-base error model and measured alignment error rates
//! - [`target_config`] - Genes, drug-resistance mutations and expected minors
//! - [`caller`] - Codon-level variant calling and the JSON report
//! - [`phasing`] - Haplotype reconstruction over variant positions
//! - [`html`] - HTML rendering of the report

pub mod caller;
pub mod error_estimates;
pub mod html;
pub mod phasing;
pub mod target_config;

pub use caller::{AminoAcidCaller, CallerSettings, JulietReport, ValidationMetrics};
pub use error_estimates::{ErrorEstimates, MeasuredErrorRates, measure_error_rates};
pub use target_config::{DMutation, TargetConfig};
