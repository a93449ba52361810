//! Synthetic questionnaire data for demos and end-to-end tests

use std::path::Path;

use polars::prelude::*;
use rand::distributions::WeightedIndex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp, Normal, Poisson};
use tracing::info;

use crate::data::RawTable;
use crate::error::{AnalysisError, Result};
use crate::output::save_results;

/// Default seed of the generated survey
pub const SAMPLE_SEED: u64 = 42;

fn distr_err(e: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::Numeric(format!("invalid sample distribution: {e}"))
}

fn clipped_normal(
    rng: &mut StdRng,
    n_rows: usize,
    mean: f64,
    std: f64,
    (lo, hi): (f64, f64),
) -> Result<Vec<f64>> {
    let normal = Normal::new(mean, std).map_err(distr_err)?;
    Ok((0..n_rows)
        .map(|_| normal.sample(rng).clamp(lo, hi))
        .collect())
}

/// Generate `n_rows` survey responses: age, income, education level,
/// satisfaction, usage frequency, willingness to recommend, number of
/// reported problems and response time.
pub fn generate_sample(n_rows: usize, seed: u64) -> Result<RawTable> {
    let mut rng = StdRng::seed_from_u64(seed);

    let age = clipped_normal(&mut rng, n_rows, 35.0, 10.0, (18.0, 70.0))?;
    let income = clipped_normal(&mut rng, n_rows, 50_000.0, 15_000.0, (20_000.0, 100_000.0))?;

    let levels = [1i64, 2, 3, 4];
    let level_weights = WeightedIndex::new([0.2, 0.3, 0.3, 0.2]).map_err(distr_err)?;
    let education: Vec<i64> = (0..n_rows)
        .map(|_| levels[level_weights.sample(&mut rng)])
        .collect();

    let satisfaction = clipped_normal(&mut rng, n_rows, 7.0, 2.0, (1.0, 10.0))?;
    let usage = clipped_normal(&mut rng, n_rows, 5.0, 2.0, (1.0, 10.0))?;
    let recommend = clipped_normal(&mut rng, n_rows, 6.0, 2.0, (1.0, 10.0))?;

    let poisson = Poisson::new(3.0).map_err(distr_err)?;
    let problems: Vec<i64> = (0..n_rows)
        .map(|_| {
            let draw: f64 = poisson.sample(&mut rng);
            draw as i64
        })
        .collect();

    let exp = Exp::new(0.5).map_err(distr_err)?;
    let response_time: Vec<f64> = (0..n_rows)
        .map(|_| exp.sample(&mut rng).clamp(0.1, 10.0))
        .collect();

    let frame = DataFrame::new(vec![
        Column::new("年龄".into(), age),
        Column::new("收入".into(), income),
        Column::new("教育程度".into(), education),
        Column::new("满意度".into(), satisfaction),
        Column::new("使用频率".into(), usage),
        Column::new("推荐意愿".into(), recommend),
        Column::new("问题数量".into(), problems),
        Column::new("响应时间".into(), response_time),
    ])?;

    Ok(RawTable::from_frame(frame))
}

/// Generate a sample survey and write it to `path` as UTF-8 CSV with BOM
pub fn write_sample(path: impl AsRef<Path>, n_rows: usize, seed: u64) -> Result<RawTable> {
    let path = path.as_ref();
    let table = generate_sample(n_rows, seed)?;
    let mut frame = table.frame().clone();
    save_results(&mut frame, path)?;
    info!(rows = n_rows, "sample questionnaire written to {}", path.display());
    Ok(table)
}
