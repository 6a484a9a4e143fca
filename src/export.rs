//! JSON-safe records and CSV persistence for denoised and synchronized tables.
//!
//! Non-finite floats become `null` (JSON) or empty cells (CSV), timestamps are
//! written as RFC 3339 strings.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::headers::Wavelength;
use crate::ona::DenoisedSeries;
use crate::report::Report;
use crate::sync::{SyncReport, SynchronizedSeries, denoised_column_names};

/// Rows included per table in the results document: a tenth of the table,
/// kept between 100 and 1000.
pub fn sample_size(rows: usize) -> usize {
    (rows / 10).clamp(100, 1000)
}

pub fn json_float(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

fn json_option(v: Option<f64>) -> Value {
    v.map_or(Value::Null, json_float)
}

fn csv_float(v: f64) -> String {
    if v.is_finite() { v.to_string() } else { String::new() }
}

fn csv_option(v: Option<f64>) -> String {
    v.map_or_else(String::new, csv_float)
}

fn denoised_record(series: &DenoisedSeries, names: &[String], i: usize) -> Map<String, Value> {
    let values = [
        Value::String(series.timestamps[i].to_rfc3339()),
        json_float(series.raw_bc[i]),
        json_float(series.processed_bc[i]),
        json_float(series.atn[i]),
        Value::Bool(series.window_start[i]),
        Value::Bool(series.window_end[i]),
    ];
    names.iter().cloned().zip(values).collect()
}

fn denoised_cells(series: &DenoisedSeries, i: usize) -> Vec<String> {
    vec![
        series.timestamps[i].to_rfc3339(),
        csv_float(series.raw_bc[i]),
        csv_float(series.processed_bc[i]),
        csv_float(series.atn[i]),
        series.window_start[i].to_string(),
        series.window_end[i].to_string(),
    ]
}

/// First `limit` rows of the denoised table as JSON objects.
pub fn denoised_records(series: &DenoisedSeries, limit: usize) -> Vec<Map<String, Value>> {
    let names = denoised_column_names(series);
    (0..series.len().min(limit))
        .map(|i| denoised_record(series, &names, i))
        .collect()
}

/// First `limit` rows of the synchronized table as JSON objects.
pub fn synchronized_records(series: &SynchronizedSeries, limit: usize) -> Vec<Map<String, Value>> {
    let names = denoised_column_names(&series.denoised);
    (0..series.len().min(limit))
        .map(|i| {
            let mut record = denoised_record(&series.denoised, &names, i);
            for col in &series.weather {
                record.insert(col.name.clone(), json_option(col.values[i]));
            }
            record
        })
        .collect()
}

/// Serializable results of one job.
#[derive(Debug, Serialize)]
pub struct ResultsDocument<'a> {
    pub wavelength: Wavelength,
    pub atn_min: f64,
    pub rows: usize,
    pub denoised: Vec<Map<String, Value>>,
    pub synchronized: Option<Vec<Map<String, Value>>>,
    pub sync_report: Option<&'a SyncReport>,
    pub sync_warning: Option<&'a str>,
    pub report: &'a Report,
}

impl<'a> ResultsDocument<'a> {
    pub fn new(
        denoised: &DenoisedSeries,
        synchronized: Option<(&SynchronizedSeries, &'a SyncReport)>,
        sync_warning: Option<&'a str>,
        report: &'a Report,
    ) -> Self {
        let limit = sample_size(denoised.len());
        Self {
            wavelength: denoised.wavelength,
            atn_min: denoised.atn_min,
            rows: denoised.len(),
            denoised: denoised_records(denoised, limit),
            synchronized: synchronized.map(|(s, _)| synchronized_records(s, limit)),
            sync_report: synchronized.map(|(_, r)| r),
            sync_warning,
            report,
        }
    }
}

/// Writes the denoised table as CSV with a header row.
pub fn write_denoised<W: Write>(series: &DenoisedSeries, out: W) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(out);
    writer.write_record(denoised_column_names(series))?;
    for i in 0..series.len() {
        writer.write_record(denoised_cells(series, i))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the synchronized table as CSV with a header row.
pub fn write_synchronized<W: Write>(series: &SynchronizedSeries, out: W) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(out);
    let mut header = denoised_column_names(&series.denoised);
    header.extend(series.weather.iter().map(|c| c.name.clone()));
    writer.write_record(&header)?;

    for i in 0..series.len() {
        let mut row = denoised_cells(&series.denoised, i);
        row.extend(series.weather.iter().map(|c| csv_option(c.values[i])));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// `<kind>_<Wavelength>_<YYYYMMDD_HHMMSS>.<ext>`
pub fn output_file_name(kind: &str, wavelength: Wavelength, at: NaiveDateTime, ext: &str) -> String {
    format!("{kind}_{wavelength}_{}.{ext}", at.format("%Y%m%d_%H%M%S"))
}

fn csv_ext(gzip: bool) -> &'static str {
    if gzip { "csv.gz" } else { "csv" }
}

/// Creates `path` and hands a writer to `write`, gzip-compressed when `gzip`.
fn write_file<F>(path: &Path, gzip: bool, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    if gzip {
        let mut encoder = GzEncoder::new(file, Compression::default());
        write(&mut encoder)?;
        encoder.finish()?;
    } else {
        let mut buffered = BufWriter::new(file);
        write(&mut buffered)?;
        buffered.flush()?;
    }
    debug!(path = %path.display(), gzip, "File written");
    Ok(())
}

/// Writes `processed_<W>_<stamp>.csv[.gz]` into `dir` and returns its path.
pub fn save_denoised(dir: &Path, series: &DenoisedSeries, at: NaiveDateTime, gzip: bool) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(output_file_name("processed", series.wavelength, at, csv_ext(gzip)));
    write_file(&path, gzip, |w| write_denoised(series, w))?;
    info!(path = %path.display(), rows = series.len(), "Processed data saved");
    Ok(path)
}

/// Writes `synchronized_<W>_<stamp>.csv[.gz]` into `dir` and returns its path.
pub fn save_synchronized(
    dir: &Path,
    series: &SynchronizedSeries,
    at: NaiveDateTime,
    gzip: bool,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let name = output_file_name("synchronized", series.denoised.wavelength, at, csv_ext(gzip));
    let path = dir.join(name);
    write_file(&path, gzip, |w| write_synchronized(series, w))?;
    info!(path = %path.display(), rows = series.len(), "Synchronized data saved");
    Ok(path)
}

/// Writes the pretty-printed results document as `results_<W>_<stamp>.json`.
pub fn save_results(dir: &Path, document: &ResultsDocument<'_>, at: NaiveDateTime) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(output_file_name("results", document.wavelength, at, "json"));
    write_file(&path, false, |w| {
        serde_json::to_writer_pretty(w, document)?;
        Ok(())
    })?;
    info!(path = %path.display(), "Results document saved");
    Ok(path)
}
