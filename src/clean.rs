// Cleaning steps for the wide load table.
//
// Both steps return a new table; the input is never modified. Missing cells
// (`None`) are not values and are never counted as non-positive.
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::types::WideTable;
use crate::util::{average, format_int};

/// Substitute used by [`Replacement::Fixed`] when the caller has no preference.
pub const DEFAULT_FIXED_VALUE: f64 = 99.0;

/// What a zero or negative load reading is replaced with.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Replacement {
    /// Mean of the strictly positive values of the same column.
    #[default]
    PositiveMean,
    /// The same constant everywhere in the table.
    Fixed(f64),
}

/// Replace every cell `<= 0` according to `mode`.
///
/// # Errors
///
/// Returns [`PipelineError::NoPositiveValues`] in [`Replacement::PositiveMean`]
/// mode when a column holds non-positive cells but no positive value to
/// average. Columns without non-positive cells are never rejected.
pub fn replace_non_positive(
    table: &WideTable,
    mode: Replacement,
) -> Result<WideTable, PipelineError> {
    let negatives = table.count_where(|v| v < 0.0);
    let zeros = table.count_where(|v| v == 0.0);
    info!(
        negatives = %format_int(negatives),
        zeros = %format_int(zeros),
        "non-physical load readings"
    );

    table.map_columns(|key, col| {
        let replacement = match mode {
            Replacement::Fixed(value) => value,
            Replacement::PositiveMean => {
                if !col.iter().flatten().any(|v| *v <= 0.0) {
                    return Ok(col.to_vec());
                }
                let positives: Vec<f64> = col.iter().flatten().copied().filter(|v| *v > 0.0).collect();
                let mean = average(&positives).ok_or_else(|| PipelineError::NoPositiveValues {
                    column: key.to_string(),
                })?;
                debug!(column = %key, mean, "replacing non-positive cells with positive mean");
                mean
            }
        };
        Ok(col
            .iter()
            .map(|cell| cell.map(|v| if v <= 0.0 { replacement } else { v }))
            .collect())
    })
}

/// Fill each missing cell with the nearest present value below it in the same
/// column, leaving trailing gaps as they are.
pub fn backward_fill(table: &WideTable) -> Result<WideTable, PipelineError> {
    table.map_columns(|_, col| {
        let mut out = col.to_vec();
        let mut next: Option<f64> = None;
        for cell in out.iter_mut().rev() {
            match *cell {
                Some(v) => next = Some(v),
                None => *cell = next,
            }
        }
        Ok(out)
    })
}

/// Backward-fill missing cells, then replace non-positive readings with the
/// positive mean of their column.
///
/// Trailing missing cells have nothing to copy from and survive; check
/// [`WideTable::residual_gaps`] on the result.
pub fn fill_missing(table: &WideTable) -> Result<WideTable, PipelineError> {
    let missing = table.missing_count();
    info!(missing = %format_int(missing), "missing cells before fill");

    let filled = if missing > 0 {
        info!("replacing missing cells with the next value");
        backward_fill(table)?
    } else {
        table.clone()
    };

    let cleaned = replace_non_positive(&filled, Replacement::default())?;
    let residual = cleaned.missing_count();
    if residual > 0 {
        warn!(residual, "trailing missing cells could not be backward filled");
    }
    info!("table cleaned");
    Ok(cleaned)
}
