//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::analyzer::RunOptions;
use crate::config::AnalysisConfig;

/// Questionnaire analysis CLI: standardization, PCA and K-means clustering
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input file (.csv, .xlsx or .xls)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Columns to leave out of the analysis, comma separated or repeated
    /// Example: --exclude "ID,姓名"
    #[arg(short, long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Number of clusters; chosen by silhouette score when omitted
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,

    /// Fixed number of principal components
    #[arg(long)]
    pub components: Option<usize>,

    /// Cumulative explained variance used to pick the component count
    #[arg(long, default_value = "0.95")]
    pub variance_threshold: f64,

    /// Largest cluster count evaluated by the automatic search
    #[arg(long, default_value = "10")]
    pub max_k: usize,

    /// Number of K-means restarts
    #[arg(long, default_value = "10")]
    pub n_init: usize,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Random seed for K-means initialisation and sample generation
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Output path for the clustered data
    #[arg(short, long, default_value = "cluster_results.csv")]
    pub output: PathBuf,

    /// Directory to write PNG plots into
    #[arg(long)]
    pub plot_dir: Option<PathBuf>,

    /// Write the cluster characteristics as JSON to this path
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Create a synthetic questionnaire at the input path if it does not exist
    #[arg(long)]
    pub generate_sample: bool,

    /// Rows of the synthetic questionnaire
    #[arg(long, default_value = "200")]
    pub sample_rows: usize,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Reject parameter combinations the pipeline cannot honour
    pub fn validate(&self) -> crate::Result<()> {
        use crate::AnalysisError;

        if !(self.variance_threshold > 0.0 && self.variance_threshold <= 1.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "variance threshold must be in (0, 1], got {}",
                self.variance_threshold
            )));
        }
        if self.max_k < 2 {
            return Err(AnalysisError::InvalidConfig(format!(
                "--max-k must be at least 2, got {}",
                self.max_k
            )));
        }
        if self.n_init == 0 {
            return Err(AnalysisError::InvalidConfig(
                "at least one K-means restart is required".to_string(),
            ));
        }
        if self.clusters == Some(0) {
            return Err(AnalysisError::InvalidConfig(
                "--clusters must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn config(&self) -> AnalysisConfig {
        AnalysisConfig {
            variance_threshold: self.variance_threshold,
            n_components: self.components,
            max_k: self.max_k,
            n_init: self.n_init,
            max_iterations: self.max_iters,
            tolerance: self.tolerance,
            seed: self.seed,
            ..AnalysisConfig::default()
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            exclude_columns: self
                .exclude
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            n_clusters: self.clusters,
            output_path: self.output.clone(),
            plot_dir: self.plot_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AnalysisError;

    #[test]
    fn test_parse_defaults() {
        let args =
            Args::try_parse_from(["questionnaire-analyzer", "--input", "survey.csv"]).unwrap();

        assert_eq!(args.input, PathBuf::from("survey.csv"));
        assert!(args.exclude.is_empty());
        assert_eq!(args.clusters, None);
        assert_eq!(args.output, PathBuf::from("cluster_results.csv"));
        assert!(args.validate().is_ok());
        assert_eq!(args.config(), AnalysisConfig::default());
    }

    #[test]
    fn test_parse_exclude_list() {
        let args = Args::try_parse_from([
            "questionnaire-analyzer",
            "-i",
            "survey.xlsx",
            "--exclude",
            "ID, 姓名",
            "--exclude",
            "备注",
            "-k",
            "3",
        ])
        .unwrap();

        let options = args.run_options();
        assert_eq!(options.exclude_columns, vec!["ID", "姓名", "备注"]);
        assert_eq!(options.n_clusters, Some(3));
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let mut args =
            Args::try_parse_from(["questionnaire-analyzer", "--input", "survey.csv"]).unwrap();

        args.variance_threshold = 1.5;
        assert!(matches!(
            args.validate(),
            Err(AnalysisError::InvalidConfig(_))
        ));

        args.variance_threshold = 0.9;
        args.max_k = 1;
        let message = args.validate().unwrap_err().to_string();
        assert_eq!(message, "invalid configuration: --max-k must be at least 2, got 1");

        args.max_k = 10;
        args.clusters = Some(0);
        assert!(matches!(
            args.validate(),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_input_is_required() {
        assert!(Args::try_parse_from(["questionnaire-analyzer"]).is_err());
    }
}
