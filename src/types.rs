use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::Deserialize;

use crate::error::PipelineError;

pub const LOAD_COLUMN: &str = "val_cargaenergiamwmed";
pub const TIMESTAMP_COLUMN: &str = "din_instante";
pub const REGION_ID_COLUMN: &str = "id_subsistema";
pub const REGION_NAME_COLUMN: &str = "nom_subsistema";

/// Raw columns the pivot needs, in the order they are checked.
pub const REQUIRED_COLUMNS: [&str; 4] = [
    LOAD_COLUMN,
    TIMESTAMP_COLUMN,
    REGION_ID_COLUMN,
    REGION_NAME_COLUMN,
];

/// Separator between the parts of a compound column label.
pub const LABEL_SEPARATOR: char = '|';

/// One long-format row of the grid operator export.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "val_cargaenergiamwmed")]
    pub load_mw: Option<f64>,
    #[serde(rename = "din_instante")]
    pub instant: String,
    #[serde(rename = "id_subsistema")]
    pub region_id: String,
    #[serde(rename = "nom_subsistema")]
    pub region_name: String,
}

/// Long-format records held in memory with their header, before any column
/// has been checked. Extra columns are carried along and ignored.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
}

impl RawTable {
    pub fn new<H, I>(headers: H, rows: Vec<StringRecord>) -> Self
    where
        H: IntoIterator<Item = I>,
        I: AsRef<str>,
    {
        Self {
            headers: headers.into_iter().collect(),
            rows,
        }
    }

    /// Build a table from typed records, using the export's column names.
    pub fn from_records(records: &[RawRecord]) -> Self {
        let rows = records
            .iter()
            .map(|r| {
                StringRecord::from(vec![
                    r.load_mw.map(|v| v.to_string()).unwrap_or_default(),
                    r.instant.clone(),
                    r.region_id.clone(),
                    r.region_name.clone(),
                ])
            })
            .collect();
        Self::new(REQUIRED_COLUMNS, rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Return the first required column absent from the header, if any.
    pub fn missing_column(&self) -> Option<&'static str> {
        REQUIRED_COLUMNS
            .iter()
            .copied()
            .find(|name| !self.headers.iter().any(|h| h == *name))
    }
}

/// Compound label of a wide column: metric, region code and region name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnKey {
    pub metric: String,
    pub region_id: String,
    pub region_name: String,
}

impl ColumnKey {
    pub fn new(
        metric: impl Into<String>,
        region_id: impl Into<String>,
        region_name: impl Into<String>,
    ) -> Self {
        Self {
            metric: metric.into(),
            region_id: region_id.into(),
            region_name: region_name.into(),
        }
    }

    /// Parse a `metric|id|name` header cell. The name may itself contain
    /// further separators.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let mut parts = raw.splitn(3, LABEL_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(metric), Some(id), Some(name)) if !metric.is_empty() && !id.is_empty() => {
                Ok(Self::new(metric, id, name))
            }
            _ => Err(PipelineError::InvalidLabel {
                raw: raw.to_string(),
            }),
        }
    }

    /// True when `region` names this column by code, display name or full label.
    pub fn matches_region(&self, region: &str) -> bool {
        self.region_id == region || self.region_name == region || self.to_string() == region
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.metric,
            self.region_id,
            self.region_name,
            sep = LABEL_SEPARATOR
        )
    }
}

/// Wide-format load table: one row per timestamp, one column per region.
///
/// Cells are stored column-major; `None` marks a missing reading. Every
/// column holds exactly one cell per index entry.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    index_name: String,
    index: Vec<NaiveDateTime>,
    columns: Vec<ColumnKey>,
    values: Vec<Vec<Option<f64>>>,
}

impl Default for WideTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl WideTable {
    /// A table with no rows and no columns.
    pub fn empty() -> Self {
        Self {
            index_name: TIMESTAMP_COLUMN.to_string(),
            index: Vec::new(),
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Assemble a table from an index and labelled columns.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ShapeMismatch`] if a column's length differs
    /// from the index length.
    ///
    /// Non-finite cells are stored as missing.
    pub fn from_columns(
        index: Vec<NaiveDateTime>,
        columns: Vec<(ColumnKey, Vec<Option<f64>>)>,
    ) -> Result<Self, PipelineError> {
        let (keys, mut values): (Vec<_>, Vec<Vec<Option<f64>>>) = columns.into_iter().unzip();
        for cell in values.iter_mut().flatten() {
            if cell.is_some_and(|v| !v.is_finite()) {
                *cell = None;
            }
        }
        for (key, col) in keys.iter().zip(&values) {
            if col.len() != index.len() {
                return Err(PipelineError::ShapeMismatch {
                    column: key.to_string(),
                    expected: index.len(),
                    got: col.len(),
                });
            }
        }
        Ok(Self {
            index_name: TIMESTAMP_COLUMN.to_string(),
            index,
            columns: keys,
            values,
        })
    }

    pub fn with_index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = name.into();
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    /// Calendar days of the index, in row order.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.index.iter().map(|ts| ts.date()).collect()
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    /// Cells of column `i`; empty when there is no such column.
    pub fn column(&self, i: usize) -> &[Option<f64>] {
        self.values.get(i).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get(col).and_then(|c| c.get(row)).copied().flatten()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.index.len(), self.columns.len())
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    /// Apply `f` to every column independently, producing a new table with the
    /// same index and labels.
    pub fn map_columns<F>(&self, mut f: F) -> Result<Self, PipelineError>
    where
        F: FnMut(&ColumnKey, &[Option<f64>]) -> Result<Vec<Option<f64>>, PipelineError>,
    {
        let mut values = Vec::with_capacity(self.values.len());
        for (key, col) in self.columns.iter().zip(&self.values) {
            let mapped = f(key, col)?;
            if mapped.len() != col.len() {
                return Err(PipelineError::ShapeMismatch {
                    column: key.to_string(),
                    expected: col.len(),
                    got: mapped.len(),
                });
            }
            values.push(mapped);
        }
        Ok(Self {
            index_name: self.index_name.clone(),
            index: self.index.clone(),
            columns: self.columns.clone(),
            values,
        })
    }

    /// Keep the rows for which `keep` returns true.
    pub fn filter_rows<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&NaiveDateTime) -> bool,
    {
        let rows: Vec<usize> = (0..self.index.len())
            .filter(|&i| keep(&self.index[i]))
            .collect();
        Self {
            index_name: self.index_name.clone(),
            index: rows.iter().map(|&i| self.index[i]).collect(),
            columns: self.columns.clone(),
            values: self
                .values
                .iter()
                .map(|col| rows.iter().map(|&i| col[i]).collect())
                .collect(),
        }
    }

    /// Keep the given columns, in the given order. Out-of-range positions are
    /// skipped.
    pub(crate) fn select_columns(&self, cols: &[usize]) -> Self {
        let (columns, values) = cols
            .iter()
            .filter_map(|&c| Some((self.columns.get(c)?.clone(), self.values.get(c)?.clone())))
            .unzip();
        Self {
            index_name: self.index_name.clone(),
            index: self.index.clone(),
            columns,
            values,
        }
    }

    /// Number of present cells matching `pred`.
    pub fn count_where<F>(&self, pred: F) -> usize
    where
        F: Fn(f64) -> bool,
    {
        self.values
            .iter()
            .flatten()
            .filter(|v| v.is_some_and(&pred))
            .count()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().flatten().filter(|v| v.is_none()).count()
    }

    /// Columns that still hold missing cells, with their counts.
    pub fn residual_gaps(&self) -> Vec<(&ColumnKey, usize)> {
        self.columns
            .iter()
            .zip(&self.values)
            .map(|(key, col)| (key, col.iter().filter(|v| v.is_none()).count()))
            .filter(|(_, n)| *n > 0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 1, d)
            .unwrap()
            .and_time(NaiveTime::MIN)
    }

    #[test]
    fn label_round_trip_keeps_slashes_in_name() {
        let key = ColumnKey::new(LOAD_COLUMN, "SE", "Sudeste/Centro-Oeste");
        let label = key.to_string();
        assert_eq!(label, "val_cargaenergiamwmed|SE|Sudeste/Centro-Oeste");
        assert_eq!(ColumnKey::parse(&label).unwrap(), key);
    }

    #[test]
    fn label_without_parts_is_rejected() {
        assert!(matches!(
            ColumnKey::parse("Nordeste"),
            Err(PipelineError::InvalidLabel { .. })
        ));
    }

    #[test]
    fn region_matching() {
        let key = ColumnKey::new(LOAD_COLUMN, "NE", "Nordeste");
        assert!(key.matches_region("NE"));
        assert!(key.matches_region("Nordeste"));
        assert!(key.matches_region("val_cargaenergiamwmed|NE|Nordeste"));
        assert!(!key.matches_region("N"));
    }

    #[test]
    fn from_columns_checks_lengths() {
        let result = WideTable::from_columns(
            vec![day(1), day(2)],
            vec![(ColumnKey::new("m", "A", "A"), vec![Some(1.0)])],
        );
        assert!(matches!(
            result,
            Err(PipelineError::ShapeMismatch {
                expected: 2,
                got: 1,
                ..
            })
        ));
    }

    #[test]
    fn counts_and_gaps() {
        let t = WideTable::from_columns(
            vec![day(1), day(2), day(3)],
            vec![
                (ColumnKey::new("m", "A", "A"), vec![Some(1.0), None, Some(-1.0)]),
                (ColumnKey::new("m", "B", "B"), vec![Some(0.0), Some(2.0), Some(3.0)]),
            ],
        )
        .unwrap();
        assert_eq!(t.shape(), (3, 2));
        assert_eq!(t.missing_count(), 1);
        assert_eq!(t.count_where(|v| v <= 0.0), 2);
        let gaps = t.residual_gaps();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].0.region_id, "A");
    }

    #[test]
    fn filter_and_select() {
        let t = WideTable::from_columns(
            vec![day(1), day(2), day(3)],
            vec![
                (ColumnKey::new("m", "A", "A"), vec![Some(1.0), Some(2.0), Some(3.0)]),
                (ColumnKey::new("m", "B", "B"), vec![Some(4.0), Some(5.0), Some(6.0)]),
            ],
        )
        .unwrap();
        let t2 = t.filter_rows(|ts| *ts != day(2)).select_columns(&[1]);
        assert_eq!(t2.shape(), (2, 1));
        assert_eq!(t2.column(0), &[Some(4.0), Some(6.0)]);
        assert_eq!(t2.index(), &[day(1), day(3)]);
    }

    #[test]
    fn non_finite_cells_are_stored_as_missing() {
        let t = WideTable::from_columns(
            vec![day(1), day(2), day(3)],
            vec![(
                ColumnKey::new("m", "A", "A"),
                vec![Some(f64::NAN), Some(2.0), Some(f64::NEG_INFINITY)],
            )],
        )
        .unwrap();
        assert_eq!(t.column(0), &[None, Some(2.0), None]);
        assert_eq!(t.missing_count(), 2);
    }

    #[test]
    fn out_of_range_columns_do_not_panic() {
        let t = WideTable::from_columns(
            vec![day(1)],
            vec![(ColumnKey::new("m", "A", "A"), vec![Some(1.0)])],
        )
        .unwrap();
        assert!(t.column(5).is_empty());
        let picked = t.select_columns(&[7, 0]);
        assert_eq!(picked.shape(), (1, 1));
        assert_eq!(picked.columns()[0].region_id, "A");
    }

    #[test]
    fn raw_table_reports_first_missing_column() {
        let t = RawTable::new(["iD_subsistema", "A", "din_instante", "val_cargaenergiamwmed"], vec![]);
        assert_eq!(t.missing_column(), Some(REGION_ID_COLUMN));
        let ok = RawTable::from_records(&[]);
        assert_eq!(ok.missing_column(), None);
    }
}
