//! Tunable parameters of the analysis pipeline

/// Parameters controlling PCA, the cluster search and K-means.
///
/// The defaults reproduce the reference analysis: 95% explained variance,
/// a search over k = 2..=10, ten K-means restarts and seed 42.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Cumulative explained-variance ratio used when `n_components` is unset
    pub variance_threshold: f64,
    /// Fixed number of principal components, bypassing the threshold search
    pub n_components: Option<usize>,
    /// Largest cluster count evaluated by the automatic search
    pub max_k: usize,
    /// Independent K-means restarts; the lowest-inertia run wins
    pub n_init: usize,
    /// Maximum Lloyd iterations per restart
    pub max_iterations: u64,
    /// Centroid movement below which a restart is considered converged
    pub tolerance: f64,
    /// Seed for the K-means initialisation
    pub seed: u64,
    /// Number of leading principal components written to the result file
    pub pc_columns_saved: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            variance_threshold: 0.95,
            n_components: None,
            max_k: 10,
            n_init: 10,
            max_iterations: 300,
            tolerance: 1e-4,
            seed: 42,
            pc_columns_saved: 5,
        }
    }
}
