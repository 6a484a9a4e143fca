//! Sequential per-job processing: normalize, denoise, synchronize, report.

use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::export::ResultsDocument;
use crate::headers::{Wavelength, normalize_headers, resolve_channel};
use crate::jobs::{StatusSink, status};
use crate::measurement::{DroppedRows, Measurement};
use crate::ona::{DenoisedSeries, denoise, validate_atn_min};
use crate::report::{Report, prepare_report};
use crate::sync::{SyncOptions, SyncReport, SynchronizedSeries, synchronize};
use crate::table::RawTable;
use crate::timestamp::normalize_timestamps;
use crate::weather::parse_weather;

/// Prefix of the job message set when weather merging is skipped.
pub const SYNC_WARNING_PREFIX: &str = "Warning: weather synchronization skipped: ";

/// Inputs of one processing job. The job owns its bytes.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub aethalometer: Vec<u8>,
    pub weather: Option<Vec<u8>>,
    pub wavelength: Wavelength,
    pub atn_min: f64,
    pub sync: SyncOptions,
}

#[derive(Debug)]
pub struct JobResults {
    pub denoised: DenoisedSeries,
    pub synchronized: Option<SynchronizedSeries>,
    pub sync_report: Option<SyncReport>,
    /// Set when weather input was given but could not be merged.
    pub sync_warning: Option<String>,
    pub dropped: DroppedRows,
    pub report: Report,
}

impl JobResults {
    pub fn synchronized_pair(&self) -> Option<(&SynchronizedSeries, &SyncReport)> {
        self.synchronized.as_ref().zip(self.sync_report.as_ref())
    }

    pub fn document(&self) -> ResultsDocument<'_> {
        ResultsDocument::new(
            &self.denoised,
            self.synchronized_pair(),
            self.sync_warning.as_deref(),
            &self.report,
        )
    }
}

fn merge_weather(
    bytes: &[u8],
    denoised: &DenoisedSeries,
    options: &SyncOptions,
) -> Result<(SynchronizedSeries, SyncReport)> {
    let weather = parse_weather(bytes)?;
    synchronize(denoised, &weather, options)
}

/// Runs one job to completion, reporting progress through `sink`.
///
/// Weather-stage failures are downgraded to a warning message and the job
/// continues with the denoised table alone. Every other failure aborts the
/// job.
#[instrument(skip_all, fields(wavelength = %request.wavelength, atn_min = request.atn_min))]
pub fn run(request: &JobRequest, sink: &dyn StatusSink) -> Result<JobResults> {
    sink.set_status(status::PROCESSING);
    sink.set_progress(0);
    let atn_min = validate_atn_min(request.atn_min)?;

    sink.set_status(status::READING);
    sink.set_progress(5);
    let mut table = RawTable::from_csv_bytes(&request.aethalometer)?;
    normalize_headers(&mut table);
    sink.set_progress(10);
    sink.set_message(&format!("Loaded {} rows", table.len()));

    let index = normalize_timestamps(&table, "aethalometer")?;
    sink.set_progress(30);

    sink.set_status(status::VALIDATING);
    sink.set_progress(50);
    let channel = resolve_channel(table.headers(), request.wavelength)?;
    let measurement = Measurement::from_table(&table, &index, &channel)?;
    drop(table);
    let dropped = DroppedRows {
        unparsed_timestamps: index.unparsed,
        duplicate_timestamps: index.duplicates,
        invalid_values: measurement.invalid_rows,
    };
    sink.set_message(&format!(
        "{} valid rows, {} dropped",
        measurement.len(),
        dropped.total()
    ));

    sink.set_status(status::APPLYING_ONA);
    sink.set_progress(70);
    let denoised = denoise(measurement, atn_min, |done, total| {
        let step = done * 15 / total.max(1);
        sink.set_progress(70 + step.min(15) as u8);
    })?;
    sink.set_progress(85);

    let mut synchronized = None;
    let mut sync_report = None;
    let mut sync_warning = None;
    if let Some(bytes) = &request.weather {
        sink.set_status(status::SYNCHRONIZING);
        sink.set_progress(88);
        match merge_weather(bytes, &denoised, &request.sync) {
            Ok((series, report)) => {
                synchronized = Some(series);
                sync_report = Some(report);
            }
            Err(e) => {
                warn!(error = %e, "Weather synchronization skipped");
                let message = format!("{SYNC_WARNING_PREFIX}{e}");
                sink.set_message(&message);
                sync_warning = Some(message);
            }
        }
        sink.set_progress(90);
    }

    sink.set_status(status::PREPARING);
    sink.set_progress(95);
    let report = prepare_report(
        &denoised,
        synchronized.as_ref().zip(sync_report.as_ref()),
        dropped,
    );

    info!(
        rows = denoised.len(),
        windows = denoised.windows.len(),
        synchronized = synchronized.is_some(),
        "Pipeline finished"
    );
    Ok(JobResults {
        denoised,
        synchronized,
        sync_report,
        sync_warning,
        dropped,
        report,
    })
}
