//! Input validation utilities
//!
//! Common checks for command-line parameters and file paths with consistent error messages.
//! All functions return structured errors from [`crate::errors`].

use crate::errors::{MinorseqError, Result};
use std::path::Path;

/// Validate that a file exists
///
/// # Errors
/// Returns an error if the file does not exist
///
/// # Example
/// ```
/// use minorseq_lib::validation::validate_file_exists;
///
/// assert!(validate_file_exists("/nonexistent/file.bam", "Input file").is_err());
/// ```
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        return Err(MinorseqError::InvalidFileFormat {
            file_type: description.to_string(),
            path: path_ref.display().to_string(),
            reason: "File does not exist".to_string(),
        });
    }
    Ok(())
}

/// Validate that a floating point parameter lies in `[min, max]`.
///
/// # Errors
/// Returns an error if the value is outside the range or is NaN
///
/// # Example
/// ```
/// use minorseq_lib::validation::validate_range;
///
/// assert!(validate_range(0.1, 0.0, 100.0, "min-perc").is_ok());
/// assert!(validate_range(101.0, 0.0, 100.0, "min-perc").is_err());
/// ```
pub fn validate_range(value: f64, min: f64, max: f64, name: &str) -> Result<()> {
    if value.is_nan() || value < min || value > max {
        return Err(MinorseqError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("must be between {min} and {max}, got {value}"),
        });
    }
    Ok(())
}

/// Validate that a per-base error rate is a probability.
///
/// # Errors
/// Returns an error if the rate is outside `[0, 1]`
pub fn validate_rate(value: f64, name: &str) -> Result<()> {
    validate_range(value, 0.0, 1.0, name)
}

/// Validate that the minimum does not exceed the maximum.
///
/// # Errors
/// Returns an error if `min > max`
pub fn validate_min_max(min: f64, max: f64, min_name: &str, max_name: &str) -> Result<()> {
    if min > max {
        return Err(MinorseqError::InvalidParameter {
            parameter: min_name.to_string(),
            reason: format!("{min_name} ({min}) must be <= {max_name} ({max})"),
        });
    }
    Ok(())
}
