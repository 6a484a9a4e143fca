use aeth_ona::error::Error;
use aeth_ona::export::{save_denoised, save_results, save_synchronized};
use aeth_ona::headers::{Wavelength, header_mapping};
use aeth_ona::jobs::{JobRegistry, spawn_job, status};
use aeth_ona::pipeline::{JobRequest, SYNC_WARNING_PREFIX, run};
use aeth_ona::sync::SyncOptions;
use aeth_ona::table::RawTable;
use std::env;
use std::fs;
use std::time::Duration;

const AETHALOMETER: &[u8] = include_bytes!("fixtures/aethalometer.csv");
const WEATHER: &[u8] = include_bytes!("fixtures/weather.csv");
const WEATHER_NO_OVERLAP: &[u8] = include_bytes!("fixtures/weather_no_overlap.csv");

struct NullSink;

impl aeth_ona::jobs::StatusSink for NullSink {
    fn set_status(&self, _: &str) {}
    fn set_progress(&self, _: u8) {}
    fn set_message(&self, _: &str) {}
}

fn request(wavelength: Wavelength, weather: Option<&[u8]>) -> JobRequest {
    JobRequest {
        aethalometer: AETHALOMETER.to_vec(),
        weather: weather.map(<[u8]>::to_vec),
        wavelength,
        atn_min: 0.01,
        sync: SyncOptions::default(),
    }
}

#[test]
fn test_denoise_fixture() {
    let results = run(&request(Wavelength::Blue, None), &NullSink).expect("pipeline failed");
    let denoised = &results.denoised;

    assert_eq!(denoised.len(), 22);
    assert_eq!(results.dropped.unparsed_timestamps, 1);
    assert_eq!(results.dropped.duplicate_timestamps, 1);
    assert_eq!(results.dropped.invalid_values, 1);
    assert_eq!(denoised.atn_column, "blueATN1");

    assert_eq!(denoised.windows.len(), 4);
    assert_eq!(denoised.tail_len(), 2);
    let expected = [983.4, 1080.8, 988.4, 1040.6];
    for (window, mean) in denoised.windows.iter().zip(expected) {
        assert_eq!(window.len(), 5);
        for row in window.start..=window.end {
            assert!((denoised.processed_bc[row] - mean).abs() < 1e-9);
        }
    }
    assert_eq!(denoised.processed_bc[20..], [1162.0, 1087.0]);

    // the first occurrence of a repeated timestamp is kept
    assert_eq!(denoised.raw_bc[3], 733.0);
}

#[test]
fn test_synchronize_fixture() {
    let results = run(&request(Wavelength::Blue, Some(WEATHER)), &NullSink).expect("pipeline failed");
    let synced = results.synchronized.as_ref().expect("weather not merged");
    let report = results.sync_report.as_ref().unwrap();

    assert_eq!(synced.len(), results.denoised.len());
    assert_eq!(report.weather_rows, 5);
    assert_eq!(report.weather_rows_in_range, 3);
    assert_eq!(report.matched_rows, 22);
    assert!(!report.converted_to_utc);

    let names: Vec<&str> = synced.weather.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["temperature", "humidity", "windSpeed", "pressure"]);

    let wind = &synced.column("windSpeed").unwrap().values;
    // 08:05 is equidistant from 08:00 and 08:10 and takes the earlier sample
    assert_eq!(wind[5], Some(2.5));
    assert_eq!(wind[6], Some(3.5));

    let temperature = &synced.column("temperature").unwrap().values;
    assert!((temperature[10].unwrap() - 5.5).abs() < 1e-9);
    assert_eq!(temperature[21], Some(6.0));

    assert!(results.report.weather_correlations.len() <= 4);
}

#[test]
fn test_no_overlap_keeps_denoised_output() {
    let results = run(&request(Wavelength::Blue, Some(WEATHER_NO_OVERLAP)), &NullSink).unwrap();

    assert!(results.synchronized.is_none());
    assert_eq!(results.denoised.len(), 22);
    let warning = results.sync_warning.unwrap();
    assert!(warning.starts_with(SYNC_WARNING_PREFIX));
    assert!(warning.contains("no overlap"));
}

#[test]
fn test_other_channels_resolve() {
    for wavelength in [Wavelength::Red, Wavelength::Uv] {
        let results = run(&request(wavelength, None), &NullSink).unwrap();
        assert_eq!(results.denoised.len(), 22);
        assert_eq!(results.denoised.wavelength, wavelength);
    }

    let err = run(&request(Wavelength::Green, None), &NullSink).unwrap_err();
    assert!(matches!(err, Error::ColumnNotFound { .. }));
}

#[test]
fn test_header_mapping_of_fixture() {
    let table = RawTable::from_csv_bytes(AETHALOMETER).unwrap();
    let mapping = header_mapping(table.headers());

    let canonical: Vec<&str> = mapping.iter().map(|m| m.canonical.as_str()).collect();
    assert_eq!(
        canonical,
        vec![
            "dateLocal",
            "timeLocal",
            "timezoneOffset",
            "blueATN1",
            "blueBC1",
            "redATN1",
            "redBC1",
            "uvATN1",
            "uvBC1",
            "flowTotal",
        ]
    );
    assert!(mapping.iter().all(|m| !m.collides));
}

#[tokio::test]
async fn test_background_job_and_outputs() {
    let registry = JobRegistry::new();
    let (id, _task) = spawn_job(&registry, request(Wavelength::Blue, Some(WEATHER)));

    let finished = registry
        .wait_for(&id, Duration::from_millis(5))
        .await
        .expect("job vanished");
    assert_eq!(finished.status, status::COMPLETED);
    assert_eq!(finished.progress, 100);
    let results = finished.results.expect("no results attached");

    let dir = env::temp_dir().join("aeth_ona_integration_outputs");
    let _ = fs::remove_dir_all(&dir); // clean up any prior run
    let stamp = chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();

    let processed = save_denoised(&dir, &results.denoised, stamp, false).unwrap();
    let synchronized = save_synchronized(&dir, results.synchronized.as_ref().unwrap(), stamp, false).unwrap();
    let json = save_results(&dir, &results.document(), stamp).unwrap();

    assert!(processed.ends_with("processed_Blue_20240115_090000.csv"));
    let content = fs::read_to_string(&processed).unwrap();
    assert_eq!(content.lines().count(), 23);

    let content = fs::read_to_string(&synchronized).unwrap();
    assert!(content.lines().next().unwrap().ends_with("temperature,humidity,windSpeed,pressure"));

    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(doc["rows"], 22);
    assert_eq!(doc["synchronized"].as_array().unwrap().len(), 22);
    assert_eq!(doc["report"]["metadata"]["windows"], 4);

    fs::remove_dir_all(&dir).unwrap();
}
