//! Questionnaire Analyzer: exploratory analysis of survey data
//!
//! Loads a CSV or spreadsheet, standardizes its numeric columns, reduces them
//! with Principal Component Analysis, clusters the projection with K-means
//! and writes the cluster assignments next to the original data.

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod output;
pub mod pca;
pub mod sample;
pub mod summary;
pub mod viz;

// Re-export public items for easier access
pub use analyzer::{Analyzer, RunOptions, RunReport, Stage, StageFailure};
pub use cli::Args;
pub use config::AnalysisConfig;
pub use data::{load_table, preprocess, RawTable, StandardizedMatrix};
pub use error::{AnalysisError, Result};
pub use model::{fit_kmeans, select_k, ClusterAssignment, ClusterSearch};
pub use pca::{reduce, PcaProjection};
pub use summary::{summarize, ClusterSummary, CLUSTER_COLUMN};
