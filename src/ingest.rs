//! CSV ingest of the lake level series.
//!
//! Columns are resolved by header name, so extra columns (and their order)
//! do not matter. Rows are returned in file order; ordering and finiteness
//! are enforced later by the feature pipeline.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use thiserror::Error;
use tracing::info;

use crate::domain::Observation;
use crate::error::ForecastError;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to open '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read CSV headers: {0}")]
    Headers(#[source] csv::Error),

    #[error("Missing required column '{0}'")]
    MissingColumn(String),

    #[error("Line {line}: {message}")]
    Row { line: usize, message: String },
}

impl From<IngestError> for ForecastError {
    fn from(err: IngestError) -> Self {
        ForecastError::Data(err.to_string())
    }
}

/// Load observations from a CSV file on disk.
pub fn load_observations(
    path: impl AsRef<Path>,
    date_column: &str,
    target_column: &str,
) -> Result<Vec<Observation>, IngestError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| IngestError::Open {
        path: path.display().to_string(),
        source,
    })?;

    let observations = read_observations(file, date_column, target_column)?;
    info!(
        path = %path.display(),
        rows = observations.len(),
        "loaded lake level observations"
    );
    Ok(observations)
}

/// Parse observations from any CSV source with a header row.
pub fn read_observations<R: Read>(
    reader: R,
    date_column: &str,
    target_column: &str,
) -> Result<Vec<Observation>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers().map_err(IngestError::Headers)?.clone();
    let header_map = build_header_map(&headers);
    let date_idx = column_index(&header_map, date_column)?;
    let target_idx = column_index(&header_map, target_column)?;

    let mut observations = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // records start on the line after the header, lines are 1-based
        let line = idx + 2;
        let record = result.map_err(|e| IngestError::Row {
            line,
            message: format!("CSV parse error: {e}"),
        })?;

        let date = parse_date(record.get(date_idx).unwrap_or(""))
            .map_err(|message| IngestError::Row { line, message })?;
        let value = parse_value(record.get(target_idx).unwrap_or(""), target_column)
            .map_err(|message| IngestError::Row { line, message })?;

        observations.push(Observation::new(date, value));
    }

    Ok(observations)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // spreadsheet exports may prefix the first header with a BOM
    name.trim().trim_start_matches('\u{feff}').to_string()
}

fn column_index(header_map: &HashMap<String, usize>, column: &str) -> Result<usize, IngestError> {
    header_map
        .get(column)
        .copied()
        .ok_or_else(|| IngestError::MissingColumn(column.to_string()))
}

/// `YYYY-MM-DD`, or a `YYYY-MM-DD HH:MM:SS` timestamp whose date part is kept.
pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    if raw.is_empty() {
        return Err("empty date".to_string());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .map_err(|_| format!("unparseable date '{raw}'"))
}

fn parse_value(raw: &str, column: &str) -> Result<f64, String> {
    if raw.is_empty() {
        return Err(format!("empty value in '{column}'"));
    }
    raw.parse::<f64>()
        .map_err(|_| format!("non-numeric value '{raw}' in '{column}'"))
}
