//! Per-cluster characteristics of the original (unstandardized) columns

use std::fmt;
use std::path::Path;

use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::data::RawTable;
use crate::error::{AnalysisError, Result};
use crate::model::ClusterAssignment;

/// Name of the label column joined onto the original data
pub const CLUSTER_COLUMN: &str = "Cluster";

const COUNT_ALIAS: &str = "__count";

/// Mean and sample standard deviation of one column within one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub column: String,
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

/// Sample count and column statistics of a single cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub count: usize,
    pub stats: Vec<ColumnStats>,
}

/// Characteristics of every cluster, ordered by cluster label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    /// Numeric columns described, in file order
    pub columns: Vec<String>,
    pub clusters: Vec<ClusterProfile>,
}

impl ClusterSummary {
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn profile(&self, cluster: usize) -> Option<&ClusterProfile> {
        self.clusters.iter().find(|p| p.cluster == cluster)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| AnalysisError::Numeric(e.to_string()))
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| AnalysisError::write(path, e))
    }
}

fn fmt_stat(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"))
}

impl fmt::Display for ClusterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cluster characteristics")?;
        writeln!(f, "{}", "=".repeat(50))?;
        for profile in &self.clusters {
            writeln!(f, "\nCluster {}", profile.cluster)?;
            writeln!(f, "  Samples: {}", profile.count)?;
            for stat in &profile.stats {
                writeln!(
                    f,
                    "  {}: mean={}, std={}",
                    stat.column,
                    fmt_stat(stat.mean),
                    fmt_stat(stat.std)
                )?;
            }
        }
        Ok(())
    }
}

/// Copy of the original data with the cluster labels appended as
/// [`CLUSTER_COLUMN`], replacing any existing column of that name.
pub fn join_clusters(table: &RawTable, assignment: &ClusterAssignment) -> Result<DataFrame> {
    if assignment.labels.len() != table.n_rows() {
        return Err(AnalysisError::Numeric(format!(
            "{} cluster labels for {} rows",
            assignment.labels.len(),
            table.n_rows()
        )));
    }

    let labels: Vec<i64> = assignment.labels.iter().map(|&l| l as i64).collect();
    let mut joined = table.frame().clone();
    joined
        .with_column(Column::new(CLUSTER_COLUMN.into(), labels))
        ?;
    Ok(joined)
}

/// Group the original numeric columns by cluster and compute mean and
/// standard deviation (ddof 1) of each.
///
/// Returns an empty summary when the table has no numeric columns.
pub fn summarize(table: &RawTable, assignment: &ClusterAssignment) -> Result<ClusterSummary> {
    let columns: Vec<String> = table
        .numeric_column_names()
        .into_iter()
        .filter(|name| name != CLUSTER_COLUMN)
        .collect();

    if columns.is_empty() {
        info!("no numeric columns to summarize");
        return Ok(ClusterSummary {
            columns,
            clusters: Vec::new(),
        });
    }

    let joined = join_clusters(table, assignment)?;

    let mut aggregations = vec![len().alias(COUNT_ALIAS)];
    for (i, name) in columns.iter().enumerate() {
        let values = col(name.as_str()).cast(DataType::Float64);
        aggregations.push(values.clone().mean().alias(format!("__mean_{i}")));
        aggregations.push(values.std(1).alias(format!("__std_{i}")));
    }

    let stats = joined
        .lazy()
        .group_by([col(CLUSTER_COLUMN)])
        .agg(aggregations)
        .sort_by_exprs([col(CLUSTER_COLUMN)], SortMultipleOptions::default())
        .collect()
        ?;

    let clusters = int_values(&stats, CLUSTER_COLUMN)?;
    let counts = int_values(&stats, COUNT_ALIAS)?;
    let mut means = Vec::with_capacity(columns.len());
    let mut stds = Vec::with_capacity(columns.len());
    for i in 0..columns.len() {
        means.push(float_values(&stats, &format!("__mean_{i}"))?);
        stds.push(float_values(&stats, &format!("__std_{i}"))?);
    }

    let profiles = (0..stats.height())
        .map(|row| ClusterProfile {
            cluster: clusters[row].unwrap_or_default() as usize,
            count: counts[row].unwrap_or_default() as usize,
            stats: columns
                .iter()
                .enumerate()
                .map(|(i, name)| ColumnStats {
                    column: name.clone(),
                    mean: means[i][row],
                    std: stds[i][row],
                })
                .collect(),
        })
        .collect();

    Ok(ClusterSummary {
        columns,
        clusters: profiles,
    })
}

fn int_values(frame: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let column = frame
        .column(name)
        .and_then(|c| c.cast(&DataType::Int64))
        ?;
    let values = column.i64()?;
    Ok(values.into_iter().collect())
}

fn float_values(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = frame
        .column(name)
        .and_then(|c| c.cast(&DataType::Float64))
        ?;
    let values = column.f64()?;
    Ok(values
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn test_table() -> RawTable {
        let frame = df!(
            "姓名" => ["a", "b", "c", "d", "e"],
            "年龄" => [20i64, 30, 40, 50, 60],
            "满意度" => [Some(8.0), Some(6.0), None, Some(2.0), Some(4.0)]
        )
        .unwrap();
        RawTable::from_frame(frame)
    }

    fn assignment(labels: ndarray::Array1<usize>, n_clusters: usize) -> ClusterAssignment {
        ClusterAssignment {
            n_clusters,
            labels,
            centroids: Array2::zeros((n_clusters, 1)),
            inertia: 0.0,
        }
    }

    #[test]
    fn test_summarize_per_cluster_statistics() {
        let table = test_table();
        let summary = summarize(&table, &assignment(array![0, 0, 0, 1, 1], 2)).unwrap();

        assert_eq!(summary.columns, vec!["年龄", "满意度"]);
        assert_eq!(summary.clusters.len(), 2);

        let first = summary.profile(0).unwrap();
        assert_eq!(first.count, 3);
        assert!((first.stats[0].mean.unwrap() - 30.0).abs() < 1e-9);
        assert!((first.stats[0].std.unwrap() - 10.0).abs() < 1e-9);
        // Missing satisfaction is skipped: mean of 8 and 6
        assert!((first.stats[1].mean.unwrap() - 7.0).abs() < 1e-9);

        let second = summary.profile(1).unwrap();
        assert_eq!(second.count, 2);
        assert!((second.stats[0].mean.unwrap() - 55.0).abs() < 1e-9);
        assert!((second.stats[1].mean.unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_member_cluster_has_no_std() {
        let table = test_table();
        let summary = summarize(&table, &assignment(array![0, 0, 0, 0, 1], 2)).unwrap();

        let lonely = summary.profile(1).unwrap();
        assert_eq!(lonely.count, 1);
        assert_eq!(lonely.stats[0].mean, Some(60.0));
        assert_eq!(lonely.stats[0].std, None);
    }

    #[test]
    fn test_no_numeric_columns_is_noop() {
        let frame = df!("姓名" => ["a", "b"]).unwrap();
        let table = RawTable::from_frame(frame);
        let summary = summarize(&table, &assignment(array![0, 1], 2)).unwrap();
        assert!(summary.is_empty());
    }

    #[test]
    fn test_join_replaces_existing_cluster_column() {
        let frame = df!("Cluster" => [9i64, 9], "x" => [1.0, 2.0]).unwrap();
        let table = RawTable::from_frame(frame);
        let joined = join_clusters(&table, &assignment(array![1, 0], 2)).unwrap();

        assert_eq!(joined.width(), 2);
        let labels = int_values(&joined, CLUSTER_COLUMN).unwrap();
        assert_eq!(labels, vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_report_mentions_every_cluster() {
        let table = test_table();
        let summary = summarize(&table, &assignment(array![0, 1, 0, 1, 0], 2)).unwrap();
        let report = summary.to_string();

        assert!(report.contains("Cluster 0"));
        assert!(report.contains("Cluster 1"));
        assert!(report.contains("年龄: mean="));

        let json = summary.to_json().unwrap();
        assert!(json.contains("\"clusters\""));
    }
}
