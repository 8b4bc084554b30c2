//! Daily per-region energy load curves from grid operator exports.
//!
//! The pipeline pivots long-format load records into a wide table, fills
//! missing readings, replaces non-physical ones, checks the date index and
//! writes a CSV artifact for downstream dashboards.

pub mod clean;
pub mod dates;
pub mod error;
pub mod explore;
pub mod loader;
pub mod output;
pub mod pipeline;
pub mod types;
pub mod util;

pub use clean::{backward_fill, fill_missing, replace_non_positive, Replacement, DEFAULT_FIXED_VALUE};
pub use dates::{expected_days, validate_date_range, DateBounds, RangeMode};
pub use error::{ErrorKind, PipelineError};
pub use explore::{select, Selection};
pub use loader::{create_pivot_table, pivot, read_raw_table, PivotSource, ReadOptions};
pub use output::{preview_table, read_table, write_json, write_table, IndexMode};
pub use pipeline::{run, PipelineConfig, PipelineReport};
pub use types::{ColumnKey, RawRecord, RawTable, WideTable};
