// Artifact persistence and console preview.
//
// The artifact is always comma-separated UTF-8, whatever the raw export used.
// Header cells are `metric|id|name` labels after an optional index column.
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tabled::{builder::Builder, settings::Style};
use tracing::{info, instrument};

use crate::error::PipelineError;
use crate::types::{ColumnKey, WideTable};
use crate::util::{format_number, format_timestamp, parse_timestamp};

/// Whether the timestamp index is written as the first column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexMode {
    #[default]
    Include,
    Omit,
}

/// Write `table` to `dir/filename`, creating `dir` and its parents first.
///
/// Missing cells are written as empty fields. The write is not atomic; a
/// failure can leave a partial file behind.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`PipelineError::OutputDirCreate`] | `dir` cannot be created |
/// | [`PipelineError::WriteFile`] | The file cannot be created or written |
#[instrument(skip_all, fields(dir = %dir.display(), filename = %filename))]
pub fn write_table(
    table: &WideTable,
    dir: &Path,
    filename: &str,
    index: IndexMode,
) -> Result<PathBuf, PipelineError> {
    fs::create_dir_all(dir).map_err(|e| PipelineError::OutputDirCreate {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let path = dir.join(filename);
    let write_err = |e: csv::Error| PipelineError::WriteFile {
        path: path.clone(),
        source: e,
    };

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b',')
        .from_path(&path)
        .map_err(write_err)?;

    let mut header: Vec<String> = Vec::with_capacity(table.columns().len() + 1);
    if index == IndexMode::Include {
        header.push(table.index_name().to_string());
    }
    header.extend(table.columns().iter().map(ColumnKey::to_string));
    wtr.write_record(&header).map_err(write_err)?;

    let (n_rows, n_cols) = table.shape();
    for row in 0..n_rows {
        let mut record: Vec<String> = Vec::with_capacity(n_cols + 1);
        if index == IndexMode::Include {
            record.push(format_timestamp(&table.index()[row]));
        }
        record.extend((0..n_cols).map(|c| table.get(row, c).map(|v| v.to_string()).unwrap_or_default()));
        wtr.write_record(&record).map_err(write_err)?;
    }
    wtr.flush().map_err(|e| write_err(e.into()))?;

    info!(path = %path.display(), rows = n_rows, columns = n_cols, "table written");
    Ok(path)
}

/// Read an artifact written by [`write_table`] with [`IndexMode::Include`].
///
/// Empty and non-finite cells (`NaN`, `inf`) read back as missing.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`PipelineError::ReadFile`] | The file cannot be opened |
/// | [`PipelineError::Csv`] | Malformed record |
/// | [`PipelineError::InvalidValue`] | A load cell is neither empty nor a number |
/// | [`PipelineError::InvalidLabel`] | A header cell is not a compound label |
/// | [`PipelineError::InvalidTimestamp`] | An index cell is not a date |
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_table(path: &Path) -> Result<WideTable, PipelineError> {
    let file = fs::File::open(path).map_err(|e| PipelineError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
    let headers = rdr.headers().map_err(PipelineError::csv)?.clone();

    let index_name = headers.get(0).unwrap_or_default().to_string();
    let keys = headers
        .iter()
        .skip(1)
        .map(ColumnKey::parse)
        .collect::<Result<Vec<_>, _>>()?;

    let mut index = Vec::new();
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); keys.len()];
    for (row, result) in rdr.records().enumerate() {
        let record = result.map_err(PipelineError::csv)?;
        let raw_ts = record.get(0).unwrap_or_default();
        let ts = parse_timestamp(raw_ts).ok_or_else(|| PipelineError::InvalidTimestamp {
            row,
            raw: raw_ts.to_string(),
        })?;
        index.push(ts);
        for (c, col) in values.iter_mut().enumerate() {
            let raw = record.get(c + 1).unwrap_or_default().trim();
            let cell = if raw.is_empty() {
                None
            } else {
                Some(raw.parse::<f64>().map_err(|_| PipelineError::InvalidValue {
                    row,
                    column: keys[c].to_string(),
                    raw: raw.to_string(),
                })?)
            };
            col.push(cell);
        }
    }

    let table = WideTable::from_columns(index, keys.into_iter().zip(values).collect())?
        .with_index_name(index_name);
    let (n_rows, n_cols) = table.shape();
    info!(rows = n_rows, columns = n_cols, "table read");
    Ok(table)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let write_err = |e: std::io::Error| PipelineError::WriteSummary {
        path: path.to_path_buf(),
        source: e,
    };
    let s = serde_json::to_string_pretty(value).map_err(|e| write_err(e.into()))?;
    fs::write(path, s).map_err(write_err)?;
    Ok(())
}

/// Render the first `max_rows` rows as a markdown table, headed by region
/// names.
pub fn preview_table(table: &WideTable, max_rows: usize) -> String {
    if table.is_empty() {
        return "(no rows)".to_string();
    }
    let mut builder = Builder::default();
    let mut header = vec![table.index_name().to_string()];
    header.extend(table.columns().iter().map(|k| k.region_name.clone()));
    builder.push_record(header);

    let (n_rows, n_cols) = table.shape();
    for row in 0..n_rows.min(max_rows) {
        let mut record = vec![format_timestamp(&table.index()[row])];
        record.extend((0..n_cols).map(|c| match table.get(row, c) {
            Some(v) => format_number(v, 2),
            None => "-".to_string(),
        }));
        builder.push_record(record);
    }
    builder.build().with(Style::markdown()).to_string()
}
