//! CLI entry point for the aethalometer ONA processor.
//!
//! `process` runs one denoising job (optionally merged with weather data) and
//! writes its tables; `headers` previews how CSV headers will be normalized.

use aeth_ona::{
    config::Settings,
    export::{save_denoised, save_results, save_synchronized},
    fetch::read_source,
    headers::{Wavelength, header_mapping},
    jobs::{JobRegistry, spawn_job},
    pipeline::{JobRequest, SYNC_WARNING_PREFIX},
    sync::SyncOptions,
    table::RawTable,
};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "aeth_ona")]
#[command(about = "Denoise aethalometer black-carbon data and merge weather observations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply ONA to an aethalometer CSV and optionally merge weather data
    Process {
        /// Aethalometer CSV path or URL
        #[arg(value_name = "FILE_OR_URL")]
        aethalometer: String,

        /// Weather CSV path or URL
        #[arg(short, long, value_name = "FILE_OR_URL")]
        weather: Option<String>,

        /// Optical channel: Blue, Green, Red, UV or IR
        #[arg(short = 'l', long)]
        wavelength: Option<Wavelength>,

        /// Minimum ATN increase that closes an averaging window
        #[arg(short, long)]
        atn_min: Option<f64>,

        /// Nearest-match tolerance for weather rows, in minutes
        #[arg(short, long)]
        tolerance_minutes: Option<i64>,

        /// Directory for the output files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Gzip compress CSV outputs
        #[arg(long, default_value_t = false)]
        gzip: bool,

        /// Also write the JSON results document
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show how the headers of a CSV file are normalized
    Headers {
        /// CSV path or URL
        #[arg(value_name = "FILE_OR_URL")]
        source: String,
    },
}

/// Installs a coloured stderr layer and a JSON layer on a daily rolling file.
fn init_tracing(log_file_path: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = log_file_path.parent().unwrap_or(Path::new("logs"));
    let log_file_name = log_file_path
        .file_name()
        .unwrap_or(OsStr::new("aeth_ona.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(file_guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let settings = Settings::from_env().context("failed to load settings")?;
    let _file_guard = init_tracing(&settings.log_file)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            aethalometer,
            weather,
            wavelength,
            atn_min,
            tolerance_minutes,
            output_dir,
            gzip,
            json,
        } => {
            let request = JobRequest {
                aethalometer: read_source(&aethalometer).await?,
                weather: load_weather(weather.as_deref()).await,
                wavelength: wavelength.unwrap_or(settings.wavelength),
                atn_min: atn_min.unwrap_or(settings.atn_min),
                sync: SyncOptions::with_tolerance_minutes(
                    tolerance_minutes.unwrap_or(settings.sync_tolerance_minutes),
                )
                .context("invalid --tolerance-minutes")?,
            };
            let output_dir = output_dir.unwrap_or_else(|| settings.results_dir.clone());
            process(request, &output_dir, &settings, gzip, json).await?;
        }
        Commands::Headers { source } => {
            let bytes = read_source(&source).await?;
            let table = RawTable::from_csv_bytes(&bytes)?;
            for entry in header_mapping(table.headers()) {
                if entry.collides {
                    warn!(original = %entry.original, canonical = %entry.canonical, "Header collides; the last column with this name wins");
                } else {
                    info!(original = %entry.original, canonical = %entry.canonical, "Header");
                }
            }
        }
    }

    Ok(())
}

/// Weather input is optional; a source that cannot be read only skips the merge.
async fn load_weather(source: Option<&str>) -> Option<Vec<u8>> {
    let source = source?;
    match read_source(source).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("{SYNC_WARNING_PREFIX}{e:#}");
            None
        }
    }
}

/// Runs one job in the background, polls it to completion and saves its outputs.
#[tracing::instrument(skip(request, output_dir, settings), fields(output_dir = %output_dir.display()))]
async fn process(
    request: JobRequest,
    output_dir: &Path,
    settings: &Settings,
    gzip: bool,
    json: bool,
) -> Result<()> {
    let registry = JobRegistry::new();
    let (job_id, _task) = spawn_job(&registry, request);
    info!(job_id = %job_id, "Job submitted");

    if registry.wait_for(&job_id, settings.poll_interval).await.is_none() {
        bail!("job {job_id} disappeared from the registry");
    }
    // the caller owns the results from here on
    let Some(status) = registry.remove(&job_id) else {
        bail!("job {job_id} disappeared from the registry");
    };
    if status.is_error() {
        bail!("job {job_id} failed: {}", status.message);
    }
    let Some(results) = status.results else {
        bail!("job {job_id} completed without results");
    };

    let stamp = Utc::now().naive_utc();
    save_denoised(output_dir, &results.denoised, stamp, gzip)?;
    if let Some(synchronized) = &results.synchronized {
        save_synchronized(output_dir, synchronized, stamp, gzip)?;
    }
    if json {
        save_results(output_dir, &results.document(), stamp)?;
    }
    if let Some(warning) = &results.sync_warning {
        warn!("{warning}");
    }

    info!(
        job_id = %job_id,
        rows = results.denoised.len(),
        windows = results.denoised.windows.len(),
        dropped = results.dropped.total(),
        "Processing complete"
    );
    Ok(())
}
