//! CSV ingest and validation.
//!
//! Turns a header-first CSV into a `Dataset`:
//!
//! - one numeric target column (required)
//! - an optional identifier column (row labels only, never a covariate)
//! - every other column is a numeric covariate
//!
//! Unlike a screening tool we do not skip bad rows: the analysis is only
//! meaningful on the complete table, so any malformed cell is an error.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use nalgebra::DMatrix;

use crate::domain::{Dataset, DatasetVariant};
use crate::error::AppError;

/// Minimum number of rows a dataset must have to be fitted.
pub const MIN_ROWS: usize = 3;

/// Load a dataset from a CSV file.
pub fn read_dataset(path: &Path, target: &str, id_column: Option<&str>) -> Result<Dataset, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_dataset_from_reader(file, target, id_column)
}

/// Load a dataset from any CSV reader.
///
/// If `id_column` is given but missing from the header, rows are labelled
/// `row-1`, `row-2`, ... instead.
pub fn read_dataset_from_reader<R: Read>(
    reader: R,
    target: &str,
    id_column: Option<&str>,
) -> Result<Dataset, AppError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read CSV header: {e}")))?
        .clone();

    let target_idx = headers
        .iter()
        .position(|h| h == target)
        .ok_or_else(|| AppError::data(format!("Target column '{target}' not found in CSV header.")))?;
    let id_idx = id_column.and_then(|name| headers.iter().position(|h| h == name));

    let covariate_cols: Vec<usize> = (0..headers.len())
        .filter(|&i| i != target_idx && Some(i) != id_idx)
        .collect();
    if covariate_cols.is_empty() {
        return Err(AppError::data("CSV has no covariate columns."));
    }
    let covariate_names: Vec<String> = covariate_cols.iter().map(|&i| headers[i].to_string()).collect();

    let mut ids = Vec::new();
    let mut y = Vec::new();
    let mut values = Vec::new();

    for (row_idx, record) in rdr.records().enumerate() {
        // Header is line 1.
        let line = row_idx + 2;
        let record = record.map_err(|e| AppError::input(format!("CSV parse error on line {line}: {e}")))?;

        ids.push(match id_idx {
            Some(i) => record.get(i).unwrap_or_default().to_string(),
            None => format!("row-{}", row_idx + 1),
        });
        y.push(parse_cell(&record, target_idx, &headers[target_idx], line)?);
        for &col in &covariate_cols {
            values.push(parse_cell(&record, col, &headers[col], line)?);
        }
    }

    let n = y.len();
    if n < MIN_ROWS {
        return Err(AppError::data(format!("Dataset has {n} rows; at least {MIN_ROWS} are required.")));
    }

    let x = DMatrix::from_row_slice(n, covariate_cols.len(), &values);
    for (j, name) in covariate_names.iter().enumerate() {
        let col = x.column(j);
        let first = col[0];
        if col.iter().all(|&v| v == first) {
            return Err(AppError::data(format!("Covariate '{name}' is constant.")));
        }
    }

    Ok(Dataset {
        ids,
        covariate_names,
        target_name: target.to_string(),
        x,
        y,
        variant: DatasetVariant::Original,
    })
}

fn parse_cell(record: &csv::StringRecord, col: usize, name: &str, line: usize) -> Result<f64, AppError> {
    let raw = record
        .get(col)
        .ok_or_else(|| AppError::input(format!("Line {line}: missing value for '{name}'.")))?;
    let value: f64 = raw
        .parse()
        .map_err(|_| AppError::input(format!("Line {line}: '{raw}' is not a number (column '{name}').")))?;
    if !value.is_finite() {
        return Err(AppError::input(format!("Line {line}: non-finite value in column '{name}'.")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = "\
name,a,b,score
x,1,0.5,10
y,0,0.25,12
z,1,0.75,11
";

    #[test]
    fn reads_target_ids_and_covariates() {
        let data = read_dataset_from_reader(SMALL.as_bytes(), "score", Some("name")).unwrap();
        assert_eq!(data.ids, vec!["x", "y", "z"]);
        assert_eq!(data.covariate_names, vec!["a", "b"]);
        assert_eq!(data.y, vec![10.0, 12.0, 11.0]);
        assert_eq!(data.x.shape(), (3, 2));
        assert!((data.x[(2, 1)] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn missing_id_column_falls_back_to_row_labels() {
        let csv = "a,b,score\n1,2,3\n0,1,2\n1,5,1\n";
        let data = read_dataset_from_reader(csv.as_bytes(), "score", Some("name")).unwrap();
        assert_eq!(data.ids[0], "row-1");
        assert_eq!(data.n_covariates(), 2);
    }

    #[test]
    fn missing_target_is_a_data_error() {
        let err = read_dataset_from_reader(SMALL.as_bytes(), "nope", Some("name")).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn non_numeric_cell_is_an_input_error() {
        let csv = "a,score\n1,2\nfoo,3\n0,1\n";
        let err = read_dataset_from_reader(csv.as_bytes(), "score", None).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("Line 3"));
    }

    #[test]
    fn constant_covariate_is_rejected() {
        let csv = "a,b,score\n1,2,3\n1,1,2\n1,5,1\n";
        let err = read_dataset_from_reader(csv.as_bytes(), "score", None).unwrap_err();
        assert!(err.message().contains("'a'"));
    }

    #[test]
    fn too_few_rows_is_rejected() {
        let csv = "a,score\n1,2\n0,3\n";
        assert!(read_dataset_from_reader(csv.as_bytes(), "score", None).is_err());
    }
}
