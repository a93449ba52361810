//! Stateful analysis pipeline: raw table, standardized matrix, PCA projection,
//! cluster labels and cluster characteristics.
//!
//! Every stage reads the artifact of the previous one and stores its own.
//! Re-running an earlier stage does not clear later ones; run the whole chain
//! again to keep them consistent.

use std::fmt;
use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;
use tracing::{error, info};

use crate::config::AnalysisConfig;
use crate::data::{self, RawTable, StandardizedMatrix};
use crate::error::{AnalysisError, Result};
use crate::model::{self, ClusterAssignment, ClusterSearch};
use crate::output;
use crate::pca::{self, PcaProjection};
use crate::summary::{self, ClusterSummary};
use crate::viz;

/// Pipeline stage, used to report where a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Preprocess,
    Reduce,
    SelectK,
    Cluster,
    Summarize,
    Save,
    Plot,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Preprocess => "preprocess",
            Stage::Reduce => "PCA",
            Stage::SelectK => "cluster-count selection",
            Stage::Cluster => "K-means",
            Stage::Summarize => "cluster summary",
            Stage::Save => "save results",
            Stage::Plot => "plotting",
        };
        f.write_str(name)
    }
}

/// A run that stopped at `stage`
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub source: AnalysisError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure> {
        self.map_err(|source| {
            error!(%stage, "{source}");
            StageFailure { stage, source }
        })
    }
}

/// Caller-facing parameters of a full run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub exclude_columns: Vec<String>,
    /// Cluster count; selected by silhouette score when `None`
    pub n_clusters: Option<usize>,
    pub output_path: PathBuf,
    /// Directory for PNG plots; nothing is rendered when `None`
    pub plot_dir: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            exclude_columns: Vec::new(),
            n_clusters: None,
            output_path: PathBuf::from("cluster_results.csv"),
            plot_dir: None,
        }
    }
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub n_clusters: usize,
    pub n_components: usize,
    pub explained_variance: f64,
    pub output_path: PathBuf,
    pub plots: Vec<PathBuf>,
}

/// Holds each stage's artifact of the questionnaire analysis
#[derive(Debug, Default)]
pub struct Analyzer {
    pub config: AnalysisConfig,
    table: Option<RawTable>,
    standardized: Option<StandardizedMatrix>,
    projection: Option<PcaProjection>,
    search: Option<ClusterSearch>,
    assignment: Option<ClusterAssignment>,
    summary: Option<ClusterSummary>,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn table(&self) -> Option<&RawTable> {
        self.table.as_ref()
    }

    pub fn standardized(&self) -> Option<&StandardizedMatrix> {
        self.standardized.as_ref()
    }

    pub fn projection(&self) -> Option<&PcaProjection> {
        self.projection.as_ref()
    }

    pub fn search(&self) -> Option<&ClusterSearch> {
        self.search.as_ref()
    }

    pub fn assignment(&self) -> Option<&ClusterAssignment> {
        self.assignment.as_ref()
    }

    pub fn summary(&self) -> Option<&ClusterSummary> {
        self.summary.as_ref()
    }

    /// Load a CSV or spreadsheet file. On failure no table is kept.
    pub fn load_data(&mut self, path: impl AsRef<Path>) -> Result<&RawTable> {
        self.table = None;
        let table = data::load_table(path)?;
        info!(columns = ?table.column_names(), "columns");
        Ok(self.table.insert(table))
    }

    pub fn preprocess<S: AsRef<str>>(
        &mut self,
        exclude_columns: &[S],
    ) -> Result<&StandardizedMatrix> {
        let table = self.table.as_ref().ok_or(AnalysisError::NotLoaded)?;
        let matrix = data::preprocess(table, exclude_columns)?;
        Ok(self.standardized.insert(matrix))
    }

    /// Run PCA with an explicit component count, or the configured variance
    /// threshold when `n_components` is `None`.
    pub fn reduce(&mut self, n_components: Option<usize>) -> Result<&PcaProjection> {
        let matrix = self
            .standardized
            .as_ref()
            .ok_or(AnalysisError::NotPreprocessed)?;
        let projection = pca::reduce(matrix, n_components, self.config.variance_threshold)?;
        Ok(self.projection.insert(projection))
    }

    /// Search k in `[2, max_k]` and return the best silhouette score's k
    pub fn select_k(&mut self, max_k: usize) -> Result<usize> {
        let projection = self.projection.as_ref().ok_or(AnalysisError::NotReduced)?;
        let (k, search) = model::select_k(&projection.projected, max_k, &self.config)?;
        self.search = Some(search);
        Ok(k)
    }

    pub fn cluster(&mut self, n_clusters: usize) -> Result<&ClusterAssignment> {
        let projection = self.projection.as_ref().ok_or(AnalysisError::NotReduced)?;
        let assignment = model::fit_kmeans(&projection.projected, n_clusters, &self.config)?;

        for (cluster, size) in assignment.cluster_sizes().iter().enumerate() {
            info!(cluster, size, "cluster size");
        }
        Ok(self.assignment.insert(assignment))
    }

    fn clustered(&self) -> Result<(&RawTable, &ClusterAssignment)> {
        let table = self.table.as_ref().ok_or(AnalysisError::NotLoaded)?;
        let assignment = self.assignment.as_ref().ok_or(AnalysisError::NotClustered)?;
        Ok((table, assignment))
    }

    pub fn summarize(&mut self) -> Result<&ClusterSummary> {
        let (table, assignment) = self.clustered()?;
        let summary = summary::summarize(table, assignment)?;
        Ok(self.summary.insert(summary))
    }

    /// Original data with the `Cluster` column appended
    pub fn data_with_clusters(&self) -> Result<DataFrame> {
        let (table, assignment) = self.clustered()?;
        summary::join_clusters(table, assignment)
    }

    pub fn save_results(&self, path: impl AsRef<Path>) -> Result<()> {
        let (table, assignment) = self.clustered()?;
        let projection = self.projection.as_ref().ok_or(AnalysisError::NotReduced)?;
        let mut results =
            output::build_results(table, assignment, projection, self.config.pc_columns_saved)?;
        output::save_results(&mut results, path)
    }

    pub fn plot(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let projection = self.projection.as_ref().ok_or(AnalysisError::NotReduced)?;
        let assignment = self.assignment.as_ref().ok_or(AnalysisError::NotClustered)?;
        viz::generate_visualization_report(projection, self.search.as_ref(), assignment, dir)
    }

    /// Load, preprocess, reduce, pick k (unless given), cluster, summarize,
    /// save and optionally plot, stopping at the first failing stage. State
    /// from the stages that succeeded is kept.
    pub fn run(
        &mut self,
        path: impl AsRef<Path>,
        options: &RunOptions,
    ) -> std::result::Result<RunReport, StageFailure> {
        self.load_data(path).at(Stage::Load)?;
        self.preprocess(&options.exclude_columns).at(Stage::Preprocess)?;

        let projection = self.reduce(self.config.n_components).at(Stage::Reduce)?;
        let n_components = projection.n_components();
        let explained_variance = projection.total_explained_variance();

        let n_clusters = match options.n_clusters {
            Some(k) => k,
            None => self.select_k(self.config.max_k).at(Stage::SelectK)?,
        };

        self.cluster(n_clusters).at(Stage::Cluster)?;
        self.summarize().at(Stage::Summarize)?;
        self.save_results(&options.output_path).at(Stage::Save)?;

        let plots = match &options.plot_dir {
            Some(dir) => self.plot(dir).at(Stage::Plot)?,
            None => Vec::new(),
        };

        Ok(RunReport {
            n_clusters,
            n_components,
            explained_variance,
            output_path: options.output_path.clone(),
            plots,
        })
    }
}
