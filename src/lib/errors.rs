//! Custom error types for minorseq operations.

use thiserror::Error;

/// Result type alias for minorseq operations
pub type Result<T> = std::result::Result<T, MinorseqError>;

/// Error type for minorseq operations
#[derive(Error, Debug)]
pub enum MinorseqError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// File format error
    #[error("Invalid {file_type} file '{path}': {reason}")]
    InvalidFileFormat {
        /// Type of file (e.g., "BAM", "DataSet XML")
        file_type: String,
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Required reference sequence not found
    #[error("Reference sequence '{ref_name}' not found")]
    ReferenceNotFound {
        /// The reference sequence name
        ref_name: String,
    },

    /// No usable records in the input
    #[error("No input records: {context}")]
    EmptyInput {
        /// Where the empty input was detected
        context: String,
    },

    /// Reads in one analysis came from more than one sequencing chemistry
    #[error("Mixed chemistries are not supported: {chemistries}")]
    MixedChemistry {
        /// The distinct chemistries, comma separated
        chemistries: String,
    },

    /// A CIGAR that cannot be interpreted
    #[error("Invalid CIGAR for read '{read_name}': {reason}")]
    InvalidCigar {
        /// The query name
        read_name: String,
        /// Explanation of the problem
        reason: String,
    },
}
