//! Visualization of the PCA and clustering results using Plotters

use std::ops::Range;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::info;

use crate::error::{AnalysisError, Result};
use crate::model::{ClusterAssignment, ClusterSearch};
use crate::pca::PcaProjection;

/// Color palette for the first clusters; later ones come from `Palette99`
const CLUSTER_COLORS: [RGBColor; 5] = [RED, BLUE, GREEN, MAGENTA, CYAN];

pub const VARIANCE_PLOT: &str = "pca_variance.png";
pub const SEARCH_PLOT: &str = "cluster_search.png";
pub const CLUSTER_PLOT: &str = "clusters.png";

type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;
type Panel<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

fn plot_err(path: &Path, e: Box<dyn std::error::Error>) -> AnalysisError {
    AnalysisError::Plot(format!("{}: {e}", path.display()))
}

pub fn cluster_color(cluster: usize) -> RGBAColor {
    match CLUSTER_COLORS.get(cluster) {
        Some(color) => color.to_rgba(),
        None => Palette99::pick(cluster).to_rgba(),
    }
}

/// Axis range covering `values` with a margin of 5% (or 0.5 for a flat series)
pub fn padded_range(values: impl IntoIterator<Item = f64>) -> Range<f64> {
    let (min, max) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() {
        return -1.0..1.0;
    }
    let pad = if max > min { (max - min) * 0.05 } else { 0.5 };
    (min - pad)..(max + pad)
}

/// Per-component and cumulative explained variance curves
pub fn plot_pca_variance(projection: &PcaProjection, path: &Path) -> Result<()> {
    let ratios = projection.full_variance_ratio.to_vec();
    draw_variance(&ratios, path).map_err(|e| plot_err(path, e))?;
    info!("variance plot saved to {}", path.display());
    Ok(())
}

fn draw_variance(ratios: &[f64], path: &Path) -> DrawResult {
    let root = BitMapBackend::new(path, (1200, 500)).into_drawing_area();
    root.fill(&WHITE)?;
    let (left, right) = root.split_horizontally(600);

    let xs: Vec<f64> = (1..=ratios.len()).map(|i| i as f64).collect();
    let cumulative: Vec<f64> = ratios
        .iter()
        .scan(0.0, |acc, r| {
            *acc += r;
            Some(*acc)
        })
        .collect();

    draw_curve(
        &left,
        "Explained variance per component",
        ("Principal component", "Explained variance ratio"),
        &xs,
        ratios,
        &BLUE,
    )?;
    draw_curve(
        &right,
        "Cumulative explained variance",
        ("Number of components", "Cumulative ratio"),
        &xs,
        &cumulative,
        &RED,
    )?;

    root.present()?;
    Ok(())
}

/// Elbow (inertia) and silhouette curves of the cluster-count search
pub fn plot_cluster_search(search: &ClusterSearch, path: &Path) -> Result<()> {
    draw_search(search, path).map_err(|e| plot_err(path, e))?;
    info!("cluster search plot saved to {}", path.display());
    Ok(())
}

fn draw_search(search: &ClusterSearch, path: &Path) -> DrawResult {
    let root = BitMapBackend::new(path, (1200, 500)).into_drawing_area();
    root.fill(&WHITE)?;
    let (left, right) = root.split_horizontally(600);

    let ks: Vec<f64> = search.k_values.iter().map(|&k| k as f64).collect();
    draw_curve(
        &left,
        "Elbow method",
        ("Number of clusters", "Inertia"),
        &ks,
        &search.inertias,
        &BLUE,
    )?;
    draw_curve(
        &right,
        "Silhouette score",
        ("Number of clusters", "Silhouette score"),
        &ks,
        &search.silhouette_scores,
        &RED,
    )?;

    root.present()?;
    Ok(())
}

fn draw_curve(
    area: &Panel<'_>,
    caption: &str,
    (x_desc, y_desc): (&str, &str),
    xs: &[f64],
    ys: &[f64],
    color: &RGBColor,
) -> DrawResult {
    if xs.is_empty() {
        return Ok(());
    }

    let x_range = (xs[0] - 0.5)..(xs[xs.len() - 1] + 0.5);
    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, padded_range(ys.iter().copied()))?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    let points: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
    chart.draw_series(LineSeries::new(points.clone(), color))?;
    chart.draw_series(
        points
            .into_iter()
            .map(|point| Circle::new(point, 4, color.filled())),
    )?;
    Ok(())
}

/// 2D scatter, 3D scatter (with at least three components) and cluster sizes
pub fn plot_clusters(
    projection: &PcaProjection,
    assignment: &ClusterAssignment,
    path: &Path,
) -> Result<()> {
    draw_clusters(&projection.projected, assignment, path).map_err(|e| plot_err(path, e))?;
    info!("cluster plot saved to {}", path.display());
    Ok(())
}

fn draw_clusters(
    projected: &Array2<f64>,
    assignment: &ClusterAssignment,
    path: &Path,
) -> DrawResult {
    let root = BitMapBackend::new(path, (1500, 500)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, 3));

    draw_scatter_2d(&panels[0], projected, assignment)?;
    if projected.ncols() >= 3 {
        draw_scatter_3d(&panels[1], projected, assignment)?;
    }
    draw_cluster_sizes(&panels[2], assignment)?;

    root.present()?;
    Ok(())
}

fn draw_scatter_2d(
    area: &Panel<'_>,
    projected: &Array2<f64>,
    assignment: &ClusterAssignment,
) -> DrawResult {
    let xs = projected.column(0);
    let ys: Vec<f64> = if projected.ncols() >= 2 {
        projected.column(1).to_vec()
    } else {
        vec![0.0; projected.nrows()]
    };

    let mut chart = ChartBuilder::on(area)
        .caption("Clusters (PC1 vs PC2)", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            padded_range(xs.iter().copied()),
            padded_range(ys.iter().copied()),
        )?;

    chart
        .configure_mesh()
        .x_desc("PC1")
        .y_desc("PC2")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(
        xs.iter()
            .zip(ys.iter())
            .zip(assignment.labels.iter())
            .map(|((&x, &y), &label)| Circle::new((x, y), 3, cluster_color(label).filled())),
    )?;
    Ok(())
}

fn draw_scatter_3d(
    area: &Panel<'_>,
    projected: &Array2<f64>,
    assignment: &ClusterAssignment,
) -> DrawResult {
    let mut chart = ChartBuilder::on(area)
        .caption("Clusters (PC1-PC3)", ("sans-serif", 24))
        .margin(10)
        .build_cartesian_3d(
            padded_range(projected.column(0).iter().copied()),
            padded_range(projected.column(1).iter().copied()),
            padded_range(projected.column(2).iter().copied()),
        )?;

    chart.configure_axes().draw()?;

    chart.draw_series(projected.outer_iter().zip(assignment.labels.iter()).map(
        |(row, &label)| Circle::new((row[0], row[1], row[2]), 3, cluster_color(label).filled()),
    ))?;
    Ok(())
}

fn draw_cluster_sizes(area: &Panel<'_>, assignment: &ClusterAssignment) -> DrawResult {
    let cluster_sizes = assignment.cluster_sizes();
    let max_size = cluster_sizes.iter().copied().max().unwrap_or(1).max(1) as f64;

    let mut chart = ChartBuilder::on(area)
        .caption("Cluster sizes", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            -0.5f64..(assignment.n_clusters as f64 - 0.5),
            0f64..(max_size * 1.1),
        )?;

    chart
        .configure_mesh()
        .x_desc("Cluster")
        .y_desc("Samples")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(cluster_sizes.iter().enumerate().map(|(cluster_id, &size)| {
        Rectangle::new(
            [
                (cluster_id as f64 - 0.4, 0.0),
                (cluster_id as f64 + 0.4, size as f64),
            ],
            cluster_color(cluster_id).filled(),
        )
    }))?;
    Ok(())
}

/// Render every plot into `dir`, creating it if needed; returns the files written
pub fn generate_visualization_report(
    projection: &PcaProjection,
    search: Option<&ClusterSearch>,
    assignment: &ClusterAssignment,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| AnalysisError::write(dir, e))?;
    let mut written = Vec::new();

    let variance_path = dir.join(VARIANCE_PLOT);
    plot_pca_variance(projection, &variance_path)?;
    written.push(variance_path);

    if let Some(search) = search {
        let search_path = dir.join(SEARCH_PLOT);
        plot_cluster_search(search, &search_path)?;
        written.push(search_path);
    }

    let cluster_path = dir.join(CLUSTER_PLOT);
    plot_clusters(projection, assignment, &cluster_path)?;
    written.push(cluster_path);

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_range() {
        let range = padded_range([1.0, 3.0, 2.0]);
        assert!((range.start - 0.9).abs() < 1e-12);
        assert!((range.end - 3.1).abs() < 1e-12);

        let flat = padded_range([2.0, 2.0]);
        assert_eq!(flat, 1.5..2.5);

        let empty = padded_range(std::iter::empty());
        assert_eq!(empty, -1.0..1.0);

        let with_nan = padded_range([f64::NAN, 0.0, 10.0]);
        assert!((with_nan.start + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_cluster_colors_are_distinct() {
        let colors: Vec<_> = (0..8).map(|i| cluster_color(i).rgb()).collect();
        for i in 0..colors.len() {
            for j in (i + 1)..colors.len() {
                assert_ne!(colors[i], colors[j]);
            }
        }
    }
}
