//! Error taxonomy shared by every pipeline stage

use polars::error::PolarsError;
use thiserror::Error;

/// Errors raised by the analysis pipeline
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("unsupported file format: {0} (expected .csv, .xlsx or .xls)")]
    UnsupportedFormat(String),
    #[error("failed to load {path}: {reason}")]
    LoadFailure { path: String, reason: String },
    #[error("no data loaded, load a table first")]
    NotLoaded,
    #[error("data not preprocessed, run preprocessing first")]
    NotPreprocessed,
    #[error("PCA not performed, reduce the data first")]
    NotReduced,
    #[error("no clustering performed, run K-means first")]
    NotClustered,
    #[error("invalid cluster count {k}: must be between {min} and {max}")]
    InvalidK { k: usize, min: usize, max: usize },
    #[error("empty matrix: {0}")]
    EmptyMatrix(String),
    #[error("failed to write {path}: {reason}")]
    WriteFailure { path: String, reason: String },
    #[error("numeric routine failed: {0}")]
    Numeric(String),
    #[error("plotting failed: {0}")]
    Plot(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<PolarsError> for AnalysisError {
    fn from(e: PolarsError) -> Self {
        AnalysisError::Numeric(e.to_string())
    }
}

impl AnalysisError {
    pub(crate) fn load(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        AnalysisError::LoadFailure {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        AnalysisError::WriteFailure {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, AnalysisError>;
