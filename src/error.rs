//! Error taxonomy for the processing pipeline.
//!
//! Every stage returns [`Result`]. Errors raised while ingesting or merging
//! weather data are downgraded by the pipeline; everything else aborts the job.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not read CSV input: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no timestamp information found in {0} data")]
    MissingTimestamp(&'static str),

    #[error("could not find {wavelength} {kind} column")]
    ColumnNotFound {
        wavelength: String,
        kind: &'static str,
    },

    #[error("need at least {required} valid rows, found {available}")]
    EmptySeries { required: usize, available: usize },

    #[error("no overlapping time period between weather data ({weather}) and aethalometer data ({measurement})")]
    NoOverlap { weather: String, measurement: String },

    #[error("unknown wavelength '{0}', expected one of Blue, Green, Red, UV, IR")]
    InvalidWavelength(String),

    #[error("atn_min must be a positive finite number, got {0}")]
    InvalidAtnMin(f64),

    #[error("sync tolerance must be a non-negative number of minutes, got {0}")]
    InvalidTolerance(i64),
}

pub type Result<T> = std::result::Result<T, Error>;
