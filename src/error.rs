//! Error types for the load curve pipeline.

use std::path::PathBuf;

use chrono::NaiveDate;

/// Coarse classification of [`PipelineError`] variants.
///
/// `Type` and `Value` errors are configuration or programmer mistakes and
/// should abort the run; `Io` and `Data` errors point at the input or the
/// destination filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingColumn,
    Type,
    Value,
    Io,
    Data,
}

/// Errors from reading, reshaping, cleaning, validating and writing load tables.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Returned when the input file exists but cannot be read.
    #[error("cannot read file {path}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the encoding label is not known to `encoding_rs`.
    #[error("unknown text encoding \"{label}\"")]
    UnknownEncoding {
        /// The label as given by the caller.
        label: String,
    },

    /// Returned when the input bytes are not valid in the requested encoding.
    #[error("{path} is not valid {encoding}")]
    Decode {
        /// Path to the input file.
        path: PathBuf,
        /// Canonical name of the encoding used.
        encoding: &'static str,
    },

    /// Returned when the delimiter is not a single ASCII character.
    #[error("delimiter must be a single ASCII character, got {delimiter:?}")]
    InvalidDelimiter {
        /// The rejected delimiter.
        delimiter: char,
    },

    /// Returned when the CSV parser rejects a record.
    #[error("CSV error at line {line}")]
    Csv {
        /// One-based line number, 0 when unknown.
        line: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when a required raw column is absent from the header.
    #[error("missing expected column \"{column}\"")]
    MissingColumn {
        /// Name of the first required column not found.
        column: String,
    },

    /// Returned when a timestamp cell cannot be parsed as a date or date-time.
    #[error("invalid timestamp \"{raw}\" at row {row}")]
    InvalidTimestamp {
        /// Zero-based data row index.
        row: usize,
        /// The raw cell content.
        raw: String,
    },

    /// Returned when an artifact cell is neither empty nor a number.
    #[error("invalid load value \"{raw}\" at row {row}, column {column}")]
    InvalidValue {
        /// Zero-based data row index.
        row: usize,
        /// Label of the column.
        column: String,
        /// The raw cell content.
        raw: String,
    },

    /// Returned when a column vector does not have one cell per index entry.
    #[error("column {column} has {got} cells, expected {expected}")]
    ShapeMismatch {
        /// Label of the offending column.
        column: String,
        /// Number of index entries.
        expected: usize,
        /// Number of cells supplied.
        got: usize,
    },

    /// Returned when an artifact header cell is not a `metric|id|name` label.
    #[error("invalid column label \"{raw}\"")]
    InvalidLabel {
        /// The raw header cell.
        raw: String,
    },

    /// Returned when mean replacement is requested for a column that holds
    /// non-positive cells but no positive value to average.
    #[error("column {column} has no positive values to average")]
    NoPositiveValues {
        /// Label of the offending column.
        column: String,
    },

    /// Returned when backward fill leaves trailing missing cells.
    #[error("column {column} still has {count} missing cells after backward fill")]
    ResidualGaps {
        /// Label of the first column with gaps.
        column: String,
        /// Number of missing cells in that column.
        count: usize,
    },

    /// Returned when a range bound is not a calendar date.
    #[error("range bound \"{raw}\" is not a date (expected YYYY-MM-DD)")]
    InvalidDateBound {
        /// The raw bound.
        raw: String,
    },

    /// Returned when a year bound is outside the representable calendar.
    #[error("year {year} is out of range")]
    InvalidYear {
        /// The rejected year.
        year: i32,
    },

    /// Returned when the end of a range precedes its start.
    #[error("end {end} precedes start {start}")]
    EndBeforeStart {
        /// Range start.
        start: NaiveDate,
        /// Range end.
        end: NaiveDate,
    },

    /// Returned by exact range validation when the sequences cannot be compared
    /// element for element.
    #[error("length mismatch: expected {expected} days, got {got}")]
    LengthMismatch {
        /// Number of days in the expected range.
        expected: usize,
        /// Number of timestamps supplied.
        got: usize,
    },

    /// Returned when a selected region matches no column of the table.
    #[error("unknown region \"{region}\"")]
    UnknownRegion {
        /// The region as given by the caller.
        region: String,
    },

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the artifact cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying CSV writer error.
        source: csv::Error,
    },

    /// Returned when the JSON summary cannot be written.
    #[error("cannot write summary {path}")]
    WriteSummary {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingColumn { .. } => ErrorKind::MissingColumn,
            Self::UnknownEncoding { .. }
            | Self::InvalidDelimiter { .. }
            | Self::InvalidDateBound { .. }
            | Self::InvalidYear { .. } => ErrorKind::Type,
            Self::EndBeforeStart { .. }
            | Self::LengthMismatch { .. }
            | Self::NoPositiveValues { .. }
            | Self::UnknownRegion { .. }
            | Self::ShapeMismatch { .. } => ErrorKind::Value,
            Self::ReadFile { .. }
            | Self::OutputDirCreate { .. }
            | Self::WriteFile { .. }
            | Self::WriteSummary { .. } => ErrorKind::Io,
            Self::Decode { .. }
            | Self::Csv { .. }
            | Self::InvalidTimestamp { .. }
            | Self::InvalidValue { .. }
            | Self::InvalidLabel { .. }
            | Self::ResidualGaps { .. } => ErrorKind::Data,
        }
    }

    pub(crate) fn csv(source: csv::Error) -> Self {
        let line = source.position().map_or(0, |p| p.line());
        Self::Csv { line, source }
    }
}
