//! Principal component analysis on standardized data

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, Axis};
use tracing::info;

use crate::data::StandardizedMatrix;
use crate::error::{AnalysisError, Result};

/// Full eigen-decomposition of the covariance matrix
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Eigenvalues, descending, clamped at zero
    pub eigenvalues: Array1<f64>,
    /// Unit eigenvectors, one per column, in eigenvalue order
    pub eigenvectors: Array2<f64>,
}

impl EigenDecomposition {
    /// Decompose the sample covariance (ddof 1) of `data`
    pub fn of_covariance(data: &Array2<f64>) -> Result<Self> {
        let (n_rows, n_cols) = data.dim();
        if n_cols == 0 {
            return Err(AnalysisError::EmptyMatrix(
                "no numeric columns left to decompose".to_string(),
            ));
        }
        if n_rows < 2 {
            return Err(AnalysisError::EmptyMatrix(format!(
                "PCA needs at least 2 rows, got {n_rows}"
            )));
        }

        let cov = covariance_matrix(data);
        let eigen = SymmetricEigen::new(DMatrix::from_fn(n_cols, n_cols, |i, j| cov[[i, j]]));

        let mut order: Vec<usize> = (0..n_cols).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let eigenvalues = Array1::from_iter(order.iter().map(|&i| eigen.eigenvalues[i].max(0.0)));
        let mut eigenvectors = Array2::zeros((n_cols, n_cols));
        for (new_idx, &old_idx) in order.iter().enumerate() {
            let vector = eigen.eigenvectors.column(old_idx);
            // Deterministic sign: the largest loading is positive
            let pivot = vector
                .iter()
                .copied()
                .fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
            let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
            for j in 0..n_cols {
                eigenvectors[[j, new_idx]] = sign * vector[j];
            }
        }

        if !eigenvalues.iter().all(|v| v.is_finite()) {
            return Err(AnalysisError::Numeric(
                "covariance eigen-decomposition produced non-finite values".to_string(),
            ));
        }

        Ok(Self {
            eigenvalues,
            eigenvectors,
        })
    }

    /// Fraction of the total variance carried by each component.
    ///
    /// Only the first `min(rows, columns)` components are meaningful and
    /// returned.
    pub fn explained_variance_ratio(&self, n_rows: usize) -> Array1<f64> {
        let available = n_rows.min(self.eigenvalues.len());
        let total: f64 = self.eigenvalues.sum();
        if total <= 0.0 {
            return Array1::zeros(available);
        }
        self.eigenvalues
            .slice(ndarray::s![..available])
            .mapv(|v| v / total)
    }
}

/// Calculate covariance matrix with `n - 1` normalisation
pub fn covariance_matrix(data: &Array2<f64>) -> Array2<f64> {
    let n = data.nrows() as f64;
    let mean = data
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(data.ncols()));
    let centered = data - &mean;
    centered.t().dot(&centered) / (n - 1.0)
}

/// Smallest `k` whose cumulative explained-variance ratio reaches `threshold`.
///
/// Falls back to every available component when no prefix reaches the
/// threshold.
pub fn select_n_components(ratios: &Array1<f64>, threshold: f64) -> usize {
    let mut cumulative = 0.0;
    for (i, ratio) in ratios.iter().enumerate() {
        cumulative += ratio;
        if cumulative >= threshold {
            return i + 1;
        }
    }
    ratios.len()
}

/// PCA result: projected data plus per-component explained variance
#[derive(Debug, Clone)]
pub struct PcaProjection {
    /// Data in the principal component basis (n_rows, k)
    pub projected: Array2<f64>,
    /// Principal axes (n_columns, k), orthonormal columns
    pub components: Array2<f64>,
    /// Explained-variance ratio of the retained components
    pub explained_variance_ratio: Array1<f64>,
    /// Explained-variance ratio of every available component
    pub full_variance_ratio: Array1<f64>,
}

impl PcaProjection {
    pub fn n_components(&self) -> usize {
        self.projected.ncols()
    }

    pub fn total_explained_variance(&self) -> f64 {
        self.explained_variance_ratio.sum()
    }
}

/// Project a standardized matrix onto its leading principal components.
///
/// With `n_components` unset the count is the smallest `k` reaching
/// `variance_threshold` cumulative explained variance.
pub fn reduce(
    matrix: &StandardizedMatrix,
    n_components: Option<usize>,
    variance_threshold: f64,
) -> Result<PcaProjection> {
    let data = &matrix.values;
    let decomposition = EigenDecomposition::of_covariance(data)?;
    let full_variance_ratio = decomposition.explained_variance_ratio(data.nrows());
    let available = full_variance_ratio.len();

    let k = match n_components {
        Some(k) if k == 0 || k > available => {
            return Err(AnalysisError::Numeric(format!(
                "requested {k} components, only 1..={available} available"
            )))
        }
        Some(k) => k,
        None => select_n_components(&full_variance_ratio, variance_threshold),
    };

    let components = decomposition
        .eigenvectors
        .slice(ndarray::s![.., ..k])
        .to_owned();
    let mean = data
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(data.ncols()));
    let projected = (data - &mean).dot(&components);
    let explained_variance_ratio = full_variance_ratio.slice(ndarray::s![..k]).to_owned();

    info!(
        original_dims = data.ncols(),
        reduced_dims = k,
        explained = explained_variance_ratio.sum(),
        "PCA complete"
    );

    Ok(PcaProjection {
        projected,
        components,
        explained_variance_ratio,
        full_variance_ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StandardScaler;
    use ndarray::array;

    fn standardized(raw: Array2<f64>) -> StandardizedMatrix {
        let scaler = StandardScaler::fit(&raw);
        let values = scaler.transform(&raw);
        let columns = (0..values.ncols()).map(|j| format!("c{j}")).collect();
        StandardizedMatrix {
            values,
            columns,
            scaler,
            dropped_non_numeric: Vec::new(),
        }
    }

    fn correlated_data() -> Array2<f64> {
        array![
            [1.0, 2.1, 0.5, 3.0],
            [2.0, 3.9, 0.1, 2.0],
            [3.0, 6.2, 0.9, 4.0],
            [4.0, 8.1, 0.3, 1.0],
            [5.0, 9.8, 0.7, 5.0],
            [6.0, 12.2, 0.2, 2.5],
            [7.0, 13.9, 0.8, 3.5],
        ]
    }

    #[test]
    fn test_full_ratios_sum_to_one() {
        let matrix = standardized(correlated_data());
        let pca = reduce(&matrix, Some(4), 0.95).unwrap();

        let total = pca.full_variance_ratio.sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(pca.full_variance_ratio.iter().all(|&r| r >= 0.0));
        for pair in pca.full_variance_ratio.as_slice().unwrap().windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn test_components_are_orthonormal() {
        let matrix = standardized(correlated_data());
        let pca = reduce(&matrix, Some(3), 0.95).unwrap();

        let gram = pca.components.t().dot(&pca.components);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_projected_variance_matches_eigenvalues() {
        let matrix = standardized(correlated_data());
        let pca = reduce(&matrix, Some(2), 0.95).unwrap();
        let decomposition = EigenDecomposition::of_covariance(&matrix.values).unwrap();

        let variance = pca.projected.column(0).var(1.0);
        assert!((variance - decomposition.eigenvalues[0]).abs() < 1e-9);
    }

    #[test]
    fn test_select_n_components_first_crossing() {
        let ratios = array![0.5, 0.3, 0.15, 0.05];
        assert_eq!(select_n_components(&ratios, 0.5), 1);
        assert_eq!(select_n_components(&ratios, 0.8), 2);
        assert_eq!(select_n_components(&ratios, 0.81), 3);
        assert_eq!(select_n_components(&ratios, 0.95), 3);
        assert_eq!(select_n_components(&ratios, 1.0), 4);
    }

    #[test]
    fn test_lower_threshold_never_needs_more_components() {
        let matrix = standardized(correlated_data());
        let mut previous = usize::MAX;
        for threshold in [0.99, 0.95, 0.9, 0.8, 0.6, 0.4, 0.2] {
            let k = reduce(&matrix, None, threshold).unwrap().n_components();
            assert!(k <= previous);
            previous = k;
        }
    }

    #[test]
    fn test_component_count_limited_by_rows() {
        let matrix = standardized(array![[1.0, 5.0, 2.0], [2.0, 3.0, 7.0]]);
        let pca = reduce(&matrix, None, 0.95).unwrap();
        assert_eq!(pca.full_variance_ratio.len(), 2);
        assert!(reduce(&matrix, Some(3), 0.95).is_err());
    }

    #[test]
    fn test_empty_matrix_is_rejected() {
        let matrix = standardized(Array2::zeros((5, 0)));
        let result = reduce(&matrix, None, 0.95);
        assert!(matches!(result, Err(AnalysisError::EmptyMatrix(_))));
    }
}
