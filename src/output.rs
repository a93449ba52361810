//! Persisting the clustered data set as a spreadsheet friendly CSV

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::data::RawTable;
use crate::error::{AnalysisError, Result};
use crate::model::ClusterAssignment;
use crate::pca::PcaProjection;
use crate::summary::join_clusters;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Original columns, then `Cluster`, then `PC1..PCk` with `k = min(max_pcs, components)`
pub fn build_results(
    table: &RawTable,
    assignment: &ClusterAssignment,
    projection: &PcaProjection,
    max_pcs: usize,
) -> Result<DataFrame> {
    let mut results = join_clusters(table, assignment)?;
    if projection.projected.nrows() != table.n_rows() {
        return Err(AnalysisError::Numeric(format!(
            "projection has {} rows, table has {}",
            projection.projected.nrows(),
            table.n_rows()
        )));
    }

    for i in 0..max_pcs.min(projection.n_components()) {
        let values: Vec<f64> = projection.projected.column(i).to_vec();
        results.with_column(Column::new(format!("PC{}", i + 1).into(), values))?;
    }

    Ok(results)
}

/// Write `results` as UTF-8 CSV with a byte-order mark
pub fn save_results(results: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| AnalysisError::write(path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(UTF8_BOM)
        .map_err(|e| AnalysisError::write(path, e))?;

    CsvWriter::new(&mut writer)
        .include_header(true)
        .finish(results)
        .map_err(|e| AnalysisError::write(path, e))?;
    writer.flush().map_err(|e| AnalysisError::write(path, e))?;

    info!(rows = results.height(), "results saved to {}", path.display());
    Ok(())
}
