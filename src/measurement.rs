//! Validated single-channel aethalometer series.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::headers::{ChannelColumns, Wavelength};
use crate::table::RawTable;
use crate::timestamp::{TimeIndex, Timestamp};

/// Fewest rows the ONA engine accepts.
pub const MIN_ROWS: usize = 2;

/// Parses a numeric cell, rejecting NaN and infinities.
pub fn parse_finite(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Rows removed from the aethalometer input before ONA, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DroppedRows {
    pub unparsed_timestamps: usize,
    pub duplicate_timestamps: usize,
    pub invalid_values: usize,
}

impl DroppedRows {
    pub fn total(&self) -> usize {
        self.unparsed_timestamps + self.duplicate_timestamps + self.invalid_values
    }
}

/// Sorted ATN/BC series for one channel. All three vectors have equal length.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub wavelength: Wavelength,
    pub atn_column: String,
    pub bc_column: String,
    pub timestamps: Vec<Timestamp>,
    pub atn: Vec<f64>,
    pub bc: Vec<f64>,
    /// Rows dropped because ATN or BC was not a finite number.
    pub invalid_rows: usize,
}

impl Measurement {
    /// Builds the series from the rows selected by `index`, dropping any row
    /// whose ATN or BC cell is not a finite number.
    ///
    /// # Errors
    ///
    /// [`Error::EmptySeries`] when fewer than [`MIN_ROWS`] rows survive.
    pub fn from_table(
        table: &RawTable,
        index: &TimeIndex,
        channel: &ChannelColumns,
    ) -> Result<Self> {
        let missing = |kind| Error::ColumnNotFound {
            wavelength: channel.wavelength.to_string(),
            kind,
        };
        let atn_cells = table.column(&channel.atn).ok_or_else(|| missing("ATN"))?;
        let bc_cells = table.column(&channel.bc).ok_or_else(|| missing("BC"))?;

        let mut timestamps = Vec::with_capacity(index.len());
        let mut atn = Vec::with_capacity(index.len());
        let mut bc = Vec::with_capacity(index.len());

        for (&ts, &row) in index.timestamps.iter().zip(&index.rows) {
            if let (Some(a), Some(b)) = (parse_finite(&atn_cells[row]), parse_finite(&bc_cells[row])) {
                timestamps.push(ts);
                atn.push(a);
                bc.push(b);
            }
        }

        let invalid_rows = index.len() - timestamps.len();
        if invalid_rows > 0 {
            info!(invalid_rows, "Dropped rows with non-numeric ATN/BC values");
        }
        if timestamps.len() < MIN_ROWS {
            return Err(Error::EmptySeries {
                required: MIN_ROWS,
                available: timestamps.len(),
            });
        }
        debug!(rows = timestamps.len(), atn = %channel.atn, bc = %channel.bc, "Measurement validated");

        Ok(Self {
            wavelength: channel.wavelength,
            atn_column: channel.atn.clone(),
            bc_column: channel.bc.clone(),
            timestamps,
            atn,
            bc,
            invalid_rows,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}
