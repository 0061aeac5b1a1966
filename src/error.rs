//! Error types for image-quant operations.

use thiserror::Error;

/// Result type alias for image-quant operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preprocessing, modelling or plotting.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A measurement row cannot yield a group or image identifier.
    ///
    /// The preprocessor counts and drops these rows; the variant only
    /// escapes when a single record is parsed directly.
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord {
        /// 1-based line number in the source table (header is line 1).
        line: usize,
        /// Reason the row was rejected.
        reason: String,
    },

    /// A required column is absent from the input header.
    #[error("Missing required column '{column}' (found: {found})")]
    MissingColumn {
        /// Canonical column name.
        column: String,
        /// Comma-separated header row as read.
        found: String,
    },

    /// Error decoding the CSV input.
    #[error("CSV import error at line {line}: {reason}")]
    CsvImport {
        /// Line number where the error occurred.
        line: usize,
        /// Reason for the failure.
        reason: String,
    },

    /// A configured group or comparison endpoint has no retained rows.
    #[error("Group '{group}' has no retained measurements ({context})")]
    EmptyGroup {
        /// The group label.
        group: String,
        /// Where the group was referenced (whitelist or comparison).
        context: String,
    },

    /// Preprocessing left nothing to analyze.
    #[error("No usable measurement rows: {rows_read} read, {dropped} dropped")]
    EmptyDataset {
        /// Rows read from the input.
        rows_read: usize,
        /// Rows dropped during preprocessing.
        dropped: usize,
    },

    /// One image contributed rows to two different groups.
    #[error("Image '{image_id}' maps to groups '{first}' and '{second}'")]
    InconsistentImageGroup {
        /// The offending image identifier.
        image_id: String,
        /// Group seen first.
        first: String,
        /// Conflicting group.
        second: String,
    },

    /// A comparison is not a pair of two distinct group labels.
    #[error("Invalid comparison: {0}")]
    InvalidComparison(String),

    /// The dependent variable is not one of the modelable columns.
    #[error("Unsupported dependent variable '{name}' (supported: {supported})")]
    UnsupportedDependentVariable {
        /// Name as given.
        name: String,
        /// Allowed names.
        supported: String,
    },

    /// The multiple-comparison correction method is not supported.
    #[error("Unsupported p-value correction method '{method}' (supported: {supported})")]
    UnsupportedCorrectionMethod {
        /// Method name as given.
        method: String,
        /// Allowed names.
        supported: String,
    },

    /// A configuration value is out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The mixed-model fit did not converge.
    #[error("Mixed model for '{dependent_variable}' did not converge (groups: {groups}): {reason}")]
    ModelConvergence {
        /// Dependent variable being modelled.
        dependent_variable: String,
        /// Groups included in the fit.
        groups: String,
        /// Why the fit was rejected.
        reason: String,
    },

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
