use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the cohort analyzer.
///
/// Cohort evaluation itself never fails: unknown operations, comparators and
/// logic tokens degrade to documented fallbacks. These variants cover
/// creation-time validation, I/O and export.
#[derive(Error, Debug)]
pub enum CohortError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be created or written.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A timestamp string did not match any recognised format.
    #[error("Invalid timestamp format: {0}")]
    TimestampParse(String),

    /// A cohort or condition definition is structurally invalid.
    #[error("Invalid cohort definition: {0}")]
    Validation(String),

    /// The configured event source does not exist.
    #[error("Event source not found: {0}")]
    EventsNotFound(PathBuf),

    /// A cohort evaluation task exceeded its deadline.
    #[error("Evaluation of cohort {cohort_id} timed out")]
    EvaluationTimeout { cohort_id: u64 },

    /// Both the rich export and its fallback failed.
    #[error("Export failed: {0}")]
    Export(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the cohort crates.
pub type Result<T> = std::result::Result<T, CohortError>;
