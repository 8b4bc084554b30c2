//! Row and column selection over a persisted load table.
//!
//! This is the query a dashboard runs on every interaction: keep the rows of
//! the chosen years, keep the columns of the chosen regions.

use std::ops::RangeInclusive;

use chrono::Datelike;
use tracing::debug;

use crate::error::PipelineError;
use crate::types::WideTable;

/// Years and regions to keep. Empty or absent filters keep everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub years: Option<RangeInclusive<i32>>,
    /// Region codes, display names or full column labels.
    pub regions: Vec<String>,
}

/// Apply `selection` to `table`, keeping column order as requested.
///
/// # Errors
///
/// Returns [`PipelineError::UnknownRegion`] when a requested region matches no
/// column.
pub fn select(table: &WideTable, selection: &Selection) -> Result<WideTable, PipelineError> {
    let rows = match &selection.years {
        Some(years) => table.filter_rows(|ts| years.contains(&ts.year())),
        None => table.clone(),
    };
    if selection.regions.is_empty() {
        return Ok(rows);
    }

    let mut cols = Vec::with_capacity(selection.regions.len());
    for region in &selection.regions {
        let matched: Vec<usize> = rows
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, key)| key.matches_region(region))
            .map(|(i, _)| i)
            .collect();
        if matched.is_empty() {
            return Err(PipelineError::UnknownRegion {
                region: region.clone(),
            });
        }
        for i in matched {
            if !cols.contains(&i) {
                cols.push(i);
            }
        }
    }
    debug!(rows = rows.shape().0, columns = cols.len(), "selection applied");
    Ok(rows.select_columns(&cols))
}
