// Pivot builder: long-format grid operator records into a wide per-region table.
//
// Reading is decode-then-parse: the whole file is decoded with `encoding_rs`
// first, so the CSV reader only ever sees UTF-8.
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::NaiveDateTime;
use csv::ReaderBuilder;
use encoding_rs::Encoding;
use tracing::{debug, info, instrument, warn};

use crate::error::PipelineError;
use crate::types::{ColumnKey, RawRecord, RawTable, WideTable, LOAD_COLUMN};
use crate::util::parse_timestamp;

/// How a raw export is read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    pub delimiter: char,
    /// WHATWG encoding label, e.g. `utf-8`, `latin1`, `windows-1252`.
    pub encoding: String,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: ';',
            encoding: "utf-8".to_string(),
        }
    }
}

impl ReadOptions {
    pub(crate) fn delimiter_byte(&self) -> Result<u8, PipelineError> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(PipelineError::InvalidDelimiter {
                delimiter: self.delimiter,
            })
        }
    }

    pub(crate) fn resolve_encoding(&self) -> Result<&'static Encoding, PipelineError> {
        Encoding::for_label(self.encoding.trim().as_bytes()).ok_or_else(|| {
            PipelineError::UnknownEncoding {
                label: self.encoding.clone(),
            }
        })
    }
}

/// Where the raw records come from.
#[derive(Debug, Clone, Copy)]
pub enum PivotSource<'a> {
    /// A delimited export on disk. A missing file yields an empty table.
    Path(&'a Path),
    /// Records already in memory; no existence check applies.
    Table(&'a RawTable),
}

/// Build the wide load table from `source`.
///
/// Rows sharing a (timestamp, region id, region name) key are averaged;
/// missing and non-finite load cells are left out of the average. Rows are sorted by
/// timestamp and columns by (region id, region name).
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`PipelineError::MissingColumn`] | A required raw column is absent |
/// | [`PipelineError::ReadFile`] | The file exists but cannot be read |
/// | [`PipelineError::UnknownEncoding`] / [`PipelineError::InvalidDelimiter`] | Bad [`ReadOptions`] for an existing file |
/// | [`PipelineError::Decode`] | Bytes invalid for the encoding |
/// | [`PipelineError::Csv`] | Malformed record or non-numeric load |
/// | [`PipelineError::InvalidTimestamp`] | Unparseable `din_instante` |
pub fn create_pivot_table(
    source: PivotSource<'_>,
    options: &ReadOptions,
) -> Result<WideTable, PipelineError> {
    match source {
        PivotSource::Path(path) => match read_raw_table(path, options)? {
            Some(raw) => pivot(&raw),
            None => Ok(WideTable::empty()),
        },
        PivotSource::Table(raw) => pivot(raw),
    }
}

/// Read a raw export into memory. Returns `Ok(None)` when the file does not
/// exist, whatever the read options.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_raw_table(path: &Path, options: &ReadOptions) -> Result<Option<RawTable>, PipelineError> {
    if !path.exists() {
        warn!("input file not found, returning empty table");
        return Ok(None);
    }

    let delimiter = options.delimiter_byte()?;
    let encoding = options.resolve_encoding()?;

    let bytes = std::fs::read(path).map_err(|e| PipelineError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let (text, used, had_errors) = encoding.decode(&bytes);
    if had_errors {
        return Err(PipelineError::Decode {
            path: path.to_path_buf(),
            encoding: used.name(),
        });
    }
    debug!(encoding = used.name(), bytes = bytes.len(), "decoded input");

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());
    let headers = rdr.headers().map_err(PipelineError::csv)?.clone();
    let rows = rdr
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(PipelineError::csv)?;

    info!(rows = rows.len(), columns = headers.len(), "raw records loaded");
    Ok(Some(RawTable { headers, rows }))
}

/// Reshape an in-memory raw table into wide format.
pub fn pivot(raw: &RawTable) -> Result<WideTable, PipelineError> {
    if let Some(column) = raw.missing_column() {
        return Err(PipelineError::MissingColumn {
            column: column.to_string(),
        });
    }

    // (timestamp, column) -> (sum, count) of present load values
    let mut cells: BTreeMap<(NaiveDateTime, ColumnKey), (f64, usize)> = BTreeMap::new();

    for (row, record) in raw.rows.iter().enumerate() {
        let rec: RawRecord = record
            .deserialize(Some(&raw.headers))
            .map_err(PipelineError::csv)?;
        let ts = parse_timestamp(&rec.instant).ok_or_else(|| PipelineError::InvalidTimestamp {
            row,
            raw: rec.instant.clone(),
        })?;
        // NaN and infinities count as missing readings.
        let Some(v) = rec.load_mw.filter(|v| v.is_finite()) else {
            continue;
        };
        let key = ColumnKey::new(LOAD_COLUMN, rec.region_id.trim(), rec.region_name.trim());
        let e = cells.entry((ts, key)).or_insert((0.0, 0));
        e.0 += v;
        e.1 += 1;
    }

    // Timestamps and regions with no present value at all are dropped.
    let index: Vec<NaiveDateTime> = cells
        .keys()
        .map(|(ts, _)| *ts)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let keys: BTreeSet<&ColumnKey> = cells.keys().map(|(_, key)| key).collect();

    let columns = keys
        .into_iter()
        .map(|key| {
            let col = index
                .iter()
                .map(|ts| {
                    cells
                        .get(&(*ts, key.clone()))
                        .map(|(sum, n)| sum / *n as f64)
                })
                .collect();
            (key.clone(), col)
        })
        .collect();

    let table = WideTable::from_columns(index, columns)?;
    let (n_rows, n_cols) = table.shape();
    info!(rows = n_rows, columns = n_cols, "pivot table built");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::REGION_ID_COLUMN;
    use chrono::{NaiveDate, NaiveTime};
    use csv::StringRecord;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn write_file(content: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    fn midnight(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_time(NaiveTime::MIN)
    }

    fn record(v: Option<f64>, ts: &str, id: &str, name: &str) -> RawRecord {
        RawRecord {
            load_mw: v,
            instant: ts.to_string(),
            region_id: id.to_string(),
            region_name: name.to_string(),
        }
    }

    #[test]
    fn pivots_valid_csv() {
        let csv = "id_subsistema;nom_subsistema;din_instante;val_cargaenergiamwmed\n\
                   N;Norte;2030-01-04;450000\n\
                   NE;Nordeste;2030-01-04;500000\n";
        let f = write_file(csv.as_bytes());
        let t = create_pivot_table(PivotSource::Path(f.path()), &ReadOptions::default()).unwrap();

        assert_eq!(t.shape(), (1, 2));
        assert_eq!(t.index(), &[midnight(2030, 1, 4)]);
        assert_eq!(t.index_name(), "din_instante");
        assert_eq!(t.columns()[0], ColumnKey::new(LOAD_COLUMN, "N", "Norte"));
        assert_eq!(t.columns()[1], ColumnKey::new(LOAD_COLUMN, "NE", "Nordeste"));
        assert_eq!(t.get(0, 0), Some(450000.0));
        assert_eq!(t.get(0, 1), Some(500000.0));
    }

    #[test]
    fn missing_file_is_empty_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("non_exists.csv");
        let t = create_pivot_table(PivotSource::Path(&path), &ReadOptions::default()).unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn invalid_columns_fail() {
        let csv = "iD_subsistema;A;din_instante;val_cargaenergiamwmed\n\
                   N;Norte;2030-01-04;450000\n";
        let f = write_file(csv.as_bytes());
        let result = create_pivot_table(PivotSource::Path(f.path()), &ReadOptions::default());
        match result {
            Err(PipelineError::MissingColumn { column }) => assert_eq!(column, REGION_ID_COLUMN),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn missing_load_column_fails_in_memory() {
        let raw = RawTable::new(
            ["din_instante", "id_subsistema", "nom_subsistema"],
            vec![StringRecord::from(vec!["2030-01-04", "N", "Norte"])],
        );
        let result = create_pivot_table(PivotSource::Table(&raw), &ReadOptions::default());
        assert!(matches!(
            result,
            Err(PipelineError::MissingColumn { ref column }) if column == LOAD_COLUMN
        ));
    }

    #[test]
    fn duplicates_are_averaged_and_sorted() {
        let raw = RawTable::from_records(&[
            record(Some(30.0), "2030-01-02", "S", "Sul"),
            record(Some(10.0), "2030-01-01", "S", "Sul"),
            record(Some(20.0), "2030-01-01", "S", "Sul"),
            record(Some(5.0), "2030-01-01", "N", "Norte"),
        ]);
        let t = pivot(&raw).unwrap();
        assert_eq!(t.index(), &[midnight(2030, 1, 1), midnight(2030, 1, 2)]);
        assert_eq!(t.columns()[0].region_id, "N");
        assert_eq!(t.column(0), &[Some(5.0), None]);
        assert_eq!(t.column(1), &[Some(15.0), Some(30.0)]);
    }

    #[test]
    fn empty_load_cells_are_excluded_from_mean() {
        let raw = RawTable::from_records(&[
            record(None, "2030-01-01", "S", "Sul"),
            record(Some(8.0), "2030-01-01", "S", "Sul"),
            record(None, "2030-01-02", "S", "Sul"),
            record(Some(3.0), "2030-01-02", "N", "Norte"),
            record(None, "2030-01-03", "N", "Norte"),
        ]);
        let t = pivot(&raw).unwrap();
        assert_eq!(t.index(), &[midnight(2030, 1, 1), midnight(2030, 1, 2)]);
        assert_eq!(t.column(0), &[None, Some(3.0)]);
        assert_eq!(t.column(1), &[Some(8.0), None]);
    }

    #[test]
    fn non_finite_load_is_treated_as_missing() {
        let csv = "val_cargaenergiamwmed;din_instante;id_subsistema;nom_subsistema\n\
                   NaN;2030-01-01;N;Norte\n\
                   10;2030-01-02;N;Norte\n\
                   20;2030-01-03;N;Norte\n\
                   30;2030-01-03;N;Norte\n\
                   NaN;2030-01-03;N;Norte\n\
                   inf;2030-01-03;N;Norte\n\
                   5;2030-01-01;S;Sul\n";
        let f = write_file(csv.as_bytes());
        let t = create_pivot_table(PivotSource::Path(f.path()), &ReadOptions::default()).unwrap();
        assert_eq!(t.columns()[0].region_id, "N");
        assert_eq!(t.column(0), &[None, Some(10.0), Some(25.0)]);
        assert_eq!(t.count_where(|v| !v.is_finite()), 0);
    }

    #[test]
    fn missing_file_ignores_bad_read_options() {
        let dir = TempDir::new().unwrap();
        let options = ReadOptions {
            delimiter: 'é',
            encoding: "klingon".to_string(),
        };
        let path = dir.path().join("non_exists.csv");
        let t = create_pivot_table(PivotSource::Path(&path), &options).unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn non_numeric_load_is_csv_error() {
        let csv = "val_cargaenergiamwmed;din_instante;id_subsistema;nom_subsistema\n\
                   abc;2030-01-04;N;Norte\n";
        let f = write_file(csv.as_bytes());
        let result = create_pivot_table(PivotSource::Path(f.path()), &ReadOptions::default());
        assert!(matches!(result, Err(PipelineError::Csv { .. })));
    }

    #[test]
    fn bad_timestamp_is_reported_with_row() {
        let raw = RawTable::from_records(&[
            record(Some(1.0), "2030-01-01", "S", "Sul"),
            record(Some(1.0), "04/01/2030", "S", "Sul"),
        ]);
        assert!(matches!(
            pivot(&raw),
            Err(PipelineError::InvalidTimestamp { row: 1, .. })
        ));
    }

    #[test]
    fn reads_latin1_with_comma_delimiter() {
        // 0xE3 is 'ã' in Latin-1 and invalid on its own in UTF-8.
        let mut bytes = b"val_cargaenergiamwmed,din_instante,id_subsistema,nom_subsistema\n".to_vec();
        bytes.extend_from_slice(b"12.5,2030-01-01,SP,S\xe3o Paulo\n");
        let f = write_file(&bytes);
        let options = ReadOptions {
            delimiter: ',',
            encoding: "latin1".to_string(),
        };
        let t = create_pivot_table(PivotSource::Path(f.path()), &options).unwrap();
        assert_eq!(t.columns()[0].region_name, "São Paulo");
        assert_eq!(t.get(0, 0), Some(12.5));
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let f = write_file(b"x\n");
        let options = ReadOptions {
            encoding: "klingon".to_string(),
            ..ReadOptions::default()
        };
        assert!(matches!(
            create_pivot_table(PivotSource::Path(f.path()), &options),
            Err(PipelineError::UnknownEncoding { .. })
        ));
    }

    #[test]
    fn invalid_utf8_is_decode_error() {
        let f = write_file(b"val_cargaenergiamwmed;din_instante;id_subsistema;nom_subsistema\n1;2030-01-01;SP;S\xe3o\n");
        assert!(matches!(
            create_pivot_table(PivotSource::Path(f.path()), &ReadOptions::default()),
            Err(PipelineError::Decode { .. })
        ));
    }
}
