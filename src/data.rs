//! Questionnaire loading and numeric preprocessing using Polars

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use tracing::{info, warn};

use crate::error::{AnalysisError, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Cell contents read as missing values, in addition to empty cells
const NA_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Loaded survey data, columns in file order with their original names
#[derive(Debug, Clone)]
pub struct RawTable {
    frame: DataFrame,
}

impl RawTable {
    pub fn from_frame(frame: DataFrame) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn n_rows(&self) -> usize {
        self.frame.height()
    }

    pub fn n_columns(&self) -> usize {
        self.frame.width()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    /// Names of the integer and floating point columns, in file order
    pub fn numeric_column_names(&self) -> Vec<String> {
        self.frame
            .get_columns()
            .iter()
            .filter(|column| is_numeric_dtype(column.dtype()))
            .map(|column| column.name().to_string())
            .collect()
    }

    /// Values of a numeric column as `f64`, with nulls and NaNs reported as `None`
    pub fn numeric_values(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let column = self
            .frame
            .column(name)
            .map_err(|e| AnalysisError::Numeric(e.to_string()))?;
        let values = column
            .cast(&DataType::Float64)
            .map_err(|e| AnalysisError::Numeric(e.to_string()))?;
        let chunked = values
            .f64()
            .map_err(|e| AnalysisError::Numeric(e.to_string()))?;

        Ok(chunked
            .into_iter()
            .map(|value| value.filter(|v| !v.is_nan()))
            .collect())
    }
}

pub(crate) fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Load a questionnaire file, dispatching on its extension.
///
/// `.csv` files are parsed as comma separated text with a header row (a UTF-8
/// byte-order mark is accepted). `.xlsx`/`.xls` workbooks are read from their
/// first sheet, whose first row is the header.
pub fn load_table(path: impl AsRef<Path>) -> Result<RawTable> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let table = match extension.as_str() {
        "csv" => read_csv(path)?,
        "xlsx" | "xls" => read_spreadsheet(path)?,
        _ => return Err(AnalysisError::UnsupportedFormat(path.display().to_string())),
    };

    info!(
        rows = table.n_rows(),
        columns = table.n_columns(),
        "loaded {}",
        path.display()
    );
    Ok(table)
}

fn read_csv(path: &Path) -> Result<RawTable> {
    let bytes = std::fs::read(path).map_err(|e| AnalysisError::load(path, e))?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes).to_vec();

    let null_values = NullValues::AllColumns(NA_TOKENS.iter().map(|&t| t.into()).collect());
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|options| options.with_null_values(Some(null_values)))
        .into_reader_with_file_handle(Cursor::new(body))
        .finish()
        .map_err(|e| AnalysisError::load(path, e))?;

    Ok(RawTable::from_frame(frame))
}

fn read_spreadsheet(path: &Path) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path).map_err(|e| AnalysisError::load(path, e))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| AnalysisError::load(path, "workbook has no sheets"))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| AnalysisError::load(path, e))?;

    let mut rows = range.rows();
    let header = header_names(
        rows.next()
            .ok_or_else(|| AnalysisError::load(path, "sheet has no header row"))?,
    );
    let body: Vec<&[Data]> = rows.collect();

    let frame =
        DataFrame::new(sheet_columns(&header, &body)).map_err(|e| AnalysisError::load(path, e))?;
    Ok(RawTable::from_frame(frame))
}

/// Header names of a sheet; blank header cells become `Unnamed: {index}`
fn header_names(row: &[Data]) -> Vec<String> {
    row.iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Data::Empty => format!("Unnamed: {i}"),
            other => other.to_string(),
        })
        .collect()
}

/// One column per header name. Rows shorter than the header are padded with
/// missing values.
fn sheet_columns(header: &[String], body: &[&[Data]]) -> Vec<Column> {
    header
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let cells: Vec<Option<&Data>> = body
                .iter()
                .map(|row| row.get(j).filter(|cell| !is_missing_cell(cell)))
                .collect();
            sheet_column(name, &cells)
        })
        .collect()
}

fn is_missing_cell(cell: &Data) -> bool {
    match cell {
        Data::Empty | Data::Error(_) => true,
        Data::String(text) => text.is_empty() || NA_TOKENS.contains(&text.as_str()),
        _ => false,
    }
}

/// Build a typed column from spreadsheet cells (`None` for empty ones):
/// integers stay integers, any mix of numbers becomes floats and everything
/// else is text.
fn sheet_column(name: &str, cells: &[Option<&Data>]) -> Column {
    let present = || cells.iter().flatten();

    if present().all(|cell| matches!(cell, Data::Int(_))) {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|cell| match cell {
                Some(Data::Int(v)) => Some(*v),
                _ => None,
            })
            .collect();
        return Column::new(name.into(), values);
    }

    if present().all(|cell| matches!(cell, Data::Int(_) | Data::Float(_))) {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|cell| match cell {
                Some(Data::Int(v)) => Some(*v as f64),
                Some(Data::Float(v)) => Some(*v),
                _ => None,
            })
            .collect();
        return Column::new(name.into(), values);
    }

    let values: Vec<Option<String>> = cells
        .iter()
        .map(|cell| cell.map(|c| c.to_string()))
        .collect();
    Column::new(name.into(), values)
}

/// Per-column statistics used to standardize a matrix
#[derive(Debug, Clone)]
pub struct StandardScaler {
    pub means: Array1<f64>,
    /// Population standard deviations; zero-variance columns are scaled by 1
    pub scales: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(data: &Array2<f64>) -> Self {
        let n_cols = data.ncols();
        if data.nrows() == 0 {
            return Self {
                means: Array1::zeros(n_cols),
                scales: Array1::ones(n_cols),
            };
        }

        let means = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_cols));
        let scales = data
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });

        Self { means, scales }
    }

    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        (data - &self.means) / &self.scales
    }
}

/// Numeric view of a [`RawTable`], standardized column by column
#[derive(Debug, Clone)]
pub struct StandardizedMatrix {
    /// Standardized values (n_rows, n_columns)
    pub values: Array2<f64>,
    /// Source column names in matrix order
    pub columns: Vec<String>,
    /// Scaler fitted on the mean-filled data
    pub scaler: StandardScaler,
    /// Columns removed because they were not numeric
    pub dropped_non_numeric: Vec<String>,
}

impl StandardizedMatrix {
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_columns(&self) -> usize {
        self.values.ncols()
    }
}

/// Drop excluded columns, keep the numeric ones, fill missing values with the
/// column mean and standardize every column to zero mean and unit variance.
///
/// Excluded names that are not present are ignored. Non-numeric columns are
/// dropped and reported through a warning.
pub fn preprocess<S: AsRef<str>>(
    table: &RawTable,
    exclude_columns: &[S],
) -> Result<StandardizedMatrix> {
    let excluded: Vec<&str> = exclude_columns.iter().map(AsRef::as_ref).collect();
    let all_columns = table.column_names();

    let absent: Vec<&str> = excluded
        .iter()
        .copied()
        .filter(|name| !all_columns.iter().any(|c| c == name))
        .collect();
    if !absent.is_empty() {
        warn!(columns = ?absent, "excluded columns not present in the data");
    }

    let kept: Vec<String> = all_columns
        .into_iter()
        .filter(|name| !excluded.contains(&name.as_str()))
        .collect();
    let numeric = table.numeric_column_names();
    let (columns, dropped_non_numeric): (Vec<String>, Vec<String>) =
        kept.into_iter().partition(|name| numeric.contains(name));

    if !dropped_non_numeric.is_empty() {
        warn!(columns = ?dropped_non_numeric, "dropping non-numeric columns from the analysis");
    }

    let n_rows = table.n_rows();
    let mut filled: Vec<Vec<f64>> = Vec::with_capacity(columns.len());
    for name in &columns {
        filled.push(fill_with_mean(&table.numeric_values(name)?));
    }

    let raw = Array2::from_shape_fn((n_rows, columns.len()), |(i, j)| filled[j][i]);
    let scaler = StandardScaler::fit(&raw);
    let values = scaler.transform(&raw);

    info!(
        rows = values.nrows(),
        columns = values.ncols(),
        "preprocessing complete"
    );

    Ok(StandardizedMatrix {
        values,
        columns,
        scaler,
        dropped_non_numeric,
    })
}

/// Replace missing entries by the mean of the present ones (0 if none are present)
fn fill_with_mean(values: &[Option<f64>]) -> Vec<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let mean = if present.is_empty() {
        0.0
    } else {
        present.iter().sum::<f64>() / present.len() as f64
    };

    values.iter().map(|v| v.unwrap_or(mean)).collect()
}
