//! Weather observation ingestion.
//!
//! Weather exports often carry the same physical quantity in several columns
//! (two anemometers, a station and a backup sensor). Each such column is kept
//! under a numbered name (`windSpeed`, `windSpeed_1`, ...) until
//! [`WeatherSeries::collapse_duplicates`] folds them into one canonical column,
//! taking the first non-missing value per row in original column order.

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::headers::normalize_headers;
use crate::interpolate::{Interpolation, fill_gaps};
use crate::measurement::parse_finite;
use crate::table::RawTable;
use crate::timestamp::{TimeIndex, Timestamp, normalize_timestamps};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WeatherQuantity {
    Temperature,
    Humidity,
    WindSpeed,
    Pressure,
}

impl WeatherQuantity {
    pub const ALL: [WeatherQuantity; 4] = [
        WeatherQuantity::Temperature,
        WeatherQuantity::Humidity,
        WeatherQuantity::WindSpeed,
        WeatherQuantity::Pressure,
    ];

    pub fn canonical_name(self) -> &'static str {
        match self {
            WeatherQuantity::Temperature => "temperature",
            WeatherQuantity::Humidity => "humidity",
            WeatherQuantity::WindSpeed => "windSpeed",
            WeatherQuantity::Pressure => "pressure",
        }
    }

    /// Slowly varying quantities get a smooth fill; wind speed changes too
    /// sharply for a spline and is filled linearly.
    pub fn interpolation(self) -> Interpolation {
        match self {
            WeatherQuantity::WindSpeed => Interpolation::Linear,
            _ => Interpolation::Cubic,
        }
    }

    /// Recognizes a normalized header. The first matching quantity in
    /// [`WeatherQuantity::ALL`] order wins.
    pub fn identify(header: &str) -> Option<Self> {
        let h = header.to_lowercase();
        WeatherQuantity::ALL.into_iter().find(|q| match q {
            WeatherQuantity::Temperature => h.contains("temp") && !h.contains("dew"),
            WeatherQuantity::Humidity => h.contains("humid") || h.starts_with("rh"),
            WeatherQuantity::WindSpeed => h.contains("wind") && !h.contains("dir"),
            WeatherQuantity::Pressure => h.contains("press") || h.contains("baro"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherColumn {
    pub name: String,
    pub quantity: WeatherQuantity,
    pub values: Vec<Option<f64>>,
}

/// Weather observations on a sorted, de-duplicated time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSeries {
    pub timestamps: Vec<Timestamp>,
    pub columns: Vec<WeatherColumn>,
}

/// Suffixes repeated quantities: the first column of a quantity keeps the
/// canonical name, later ones get `_1`, `_2`, ...
pub fn disambiguate(quantities: &[WeatherQuantity]) -> Vec<String> {
    let mut seen: Vec<(WeatherQuantity, usize)> = Vec::new();
    quantities
        .iter()
        .map(|&q| {
            let base = q.canonical_name();
            match seen.iter_mut().find(|(s, _)| *s == q) {
                Some((_, count)) => {
                    let name = format!("{base}_{count}");
                    *count += 1;
                    name
                }
                None => {
                    seen.push((q, 1));
                    base.to_string()
                }
            }
        })
        .collect()
}

impl WeatherSeries {
    /// Extracts every recognized weather quantity from a header-normalized
    /// table. Columns with no numeric value at all are skipped.
    pub fn from_table(table: &RawTable, index: &TimeIndex) -> Self {
        let mut found = Vec::new();
        for (idx, header) in table.headers().iter().enumerate() {
            let Some(quantity) = WeatherQuantity::identify(header) else {
                continue;
            };
            let cells = table.column_at(idx);
            let values: Vec<Option<f64>> =
                index.rows.iter().map(|&row| parse_finite(&cells[row])).collect();
            if values.iter().all(Option::is_none) {
                debug!(column = %header, "Skipping non-numeric weather column");
                continue;
            }
            found.push((quantity, values));
        }

        let quantities: Vec<WeatherQuantity> = found.iter().map(|(q, _)| *q).collect();
        let columns = disambiguate(&quantities)
            .into_iter()
            .zip(found)
            .map(|(name, (quantity, values))| WeatherColumn {
                name,
                quantity,
                values,
            })
            .collect();

        Self {
            timestamps: index.timestamps.clone(),
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&WeatherColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Folds all columns of the same quantity into one column named after the
    /// quantity. Per row, the first non-missing value in column order wins.
    pub fn collapse_duplicates(self) -> Self {
        let mut merged: Vec<WeatherColumn> = Vec::new();
        for col in self.columns {
            match merged.iter_mut().find(|m| m.quantity == col.quantity) {
                Some(target) => {
                    for (dst, src) in target.values.iter_mut().zip(col.values) {
                        if dst.is_none() {
                            *dst = src;
                        }
                    }
                }
                None => merged.push(WeatherColumn {
                    name: col.quantity.canonical_name().to_string(),
                    ..col
                }),
            }
        }
        Self {
            timestamps: self.timestamps,
            columns: merged,
        }
    }

    /// Rows whose instant lies in the closed interval `[start, end]`.
    pub fn restrict(&self, start: Timestamp, end: Timestamp) -> Self {
        let lo = self.timestamps.partition_point(|t| *t < start);
        let hi = self.timestamps.partition_point(|t| *t <= end);
        let hi = hi.max(lo);
        Self {
            timestamps: self.timestamps[lo..hi].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|c| WeatherColumn {
                    values: c.values[lo..hi].to_vec(),
                    ..c.clone()
                })
                .collect(),
        }
    }

    /// Fills interior gaps of every column along the time axis, using each
    /// quantity's interpolation method. Returns the number of filled cells.
    pub fn interpolate(&mut self) -> usize {
        let Some(first) = self.timestamps.first().copied() else {
            return 0;
        };
        let x: Vec<f64> = self
            .timestamps
            .iter()
            .map(|t| (*t - first).num_milliseconds() as f64 / 1000.0)
            .collect();

        let mut filled = 0;
        for col in &mut self.columns {
            let n = fill_gaps(&x, &mut col.values, col.quantity.interpolation());
            if n > 0 {
                debug!(column = %col.name, filled = n, method = ?col.quantity.interpolation(), "Interpolated weather gaps");
            }
            filled += n;
        }
        filled
    }
}

/// Reads a weather CSV: header normalization, timestamp discovery and
/// quantity extraction.
#[instrument(skip(bytes), fields(bytes = bytes.len()))]
pub fn parse_weather(bytes: &[u8]) -> Result<WeatherSeries> {
    let mut table = RawTable::from_csv_bytes(bytes)?;
    normalize_headers(&mut table);
    let index = normalize_timestamps(&table, "weather")?;
    let series = WeatherSeries::from_table(&table, &index);
    info!(
        rows = series.len(),
        columns = ?series.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        "Weather data loaded"
    );
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::parse_timestamp;

    fn ts(s: &str) -> Timestamp {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_identify_quantities() {
        assert_eq!(WeatherQuantity::identify("temperatureC"), Some(WeatherQuantity::Temperature));
        assert_eq!(WeatherQuantity::identify("relativeHumidityPercent"), Some(WeatherQuantity::Humidity));
        assert_eq!(WeatherQuantity::identify("rhPercent"), Some(WeatherQuantity::Humidity));
        assert_eq!(WeatherQuantity::identify("windSpeedKmh"), Some(WeatherQuantity::WindSpeed));
        assert_eq!(WeatherQuantity::identify("windDirection"), None);
        assert_eq!(WeatherQuantity::identify("pressureHpa"), Some(WeatherQuantity::Pressure));
        assert_eq!(WeatherQuantity::identify("dewPointTemp"), None);
        assert_eq!(WeatherQuantity::identify("timestamp"), None);
    }

    #[test]
    fn test_disambiguate_suffixes() {
        use WeatherQuantity::*;
        let names = disambiguate(&[WindSpeed, Temperature, WindSpeed, WindSpeed]);
        assert_eq!(names, vec!["windSpeed", "temperature", "windSpeed_1", "windSpeed_2"]);
    }

    #[test]
    fn test_collapse_backfills_in_column_order() {
        let series = WeatherSeries {
            timestamps: vec![
                ts("2024-01-01 00:00:00"),
                ts("2024-01-01 01:00:00"),
                ts("2024-01-01 02:00:00"),
            ],
            columns: vec![
                WeatherColumn {
                    name: "windSpeed".into(),
                    quantity: WeatherQuantity::WindSpeed,
                    values: vec![None, Some(5.0), None],
                },
                WeatherColumn {
                    name: "windSpeed_1".into(),
                    quantity: WeatherQuantity::WindSpeed,
                    values: vec![Some(3.0), None, Some(7.0)],
                },
            ],
        };

        let collapsed = series.collapse_duplicates();
        assert_eq!(collapsed.columns.len(), 1);
        let wind = collapsed.column("windSpeed").unwrap();
        assert_eq!(wind.values, vec![Some(3.0), Some(5.0), Some(7.0)]);
    }

    #[test]
    fn test_collapse_first_non_null_wins() {
        let series = WeatherSeries {
            timestamps: vec![ts("2024-01-01 00:00:00")],
            columns: vec![
                WeatherColumn {
                    name: "temperature".into(),
                    quantity: WeatherQuantity::Temperature,
                    values: vec![Some(1.0)],
                },
                WeatherColumn {
                    name: "temperature_1".into(),
                    quantity: WeatherQuantity::Temperature,
                    values: vec![Some(2.0)],
                },
            ],
        };
        let collapsed = series.collapse_duplicates();
        assert_eq!(collapsed.column("temperature").unwrap().values, vec![Some(1.0)]);
    }

    #[test]
    fn test_parse_weather_csv() {
        let csv = "Timestamp,Temperature (C),Wind Speed (km/h),Wind Speed 2 (m/s),Wind Direction,Notes\n\
                   2024-01-01 00:00:00,5.0,,3,180,ok\n\
                   2024-01-01 01:00:00,6.0,5,,190,ok\n";
        let series = parse_weather(csv.as_bytes()).unwrap();

        let names: Vec<&str> = series.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["temperature", "windSpeed", "windSpeed_1"]);
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_parse_weather_with_time_column() {
        let csv = "time,temperature_2m (C)\n2024-01-15T08:00,5.0\n2024-01-15T09:00,6.0\n";
        let series = parse_weather(csv.as_bytes()).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.timestamps[0], ts("2024-01-15 08:00:00"));
        assert_eq!(
            series.column("temperature").unwrap().values,
            vec![Some(5.0), Some(6.0)]
        );
    }

    #[test]
    fn test_restrict_closed_interval() {
        let series = WeatherSeries {
            timestamps: vec![
                ts("2024-01-01 00:00:00"),
                ts("2024-01-01 01:00:00"),
                ts("2024-01-01 02:00:00"),
                ts("2024-01-01 03:00:00"),
            ],
            columns: vec![WeatherColumn {
                name: "pressure".into(),
                quantity: WeatherQuantity::Pressure,
                values: vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)],
            }],
        };

        let r = series.restrict(ts("2024-01-01 01:00:00"), ts("2024-01-01 02:00:00"));
        assert_eq!(r.len(), 2);
        assert_eq!(r.columns[0].values, vec![Some(2.0), Some(3.0)]);

        let empty = series.restrict(ts("2024-02-01 00:00:00"), ts("2024-02-02 00:00:00"));
        assert!(empty.is_empty());
    }

    #[test]
    fn test_interpolate_uses_time_axis() {
        let mut series = WeatherSeries {
            timestamps: vec![
                ts("2024-01-01 00:00:00"),
                ts("2024-01-01 00:10:00"),
                ts("2024-01-01 00:40:00"),
            ],
            columns: vec![WeatherColumn {
                name: "windSpeed".into(),
                quantity: WeatherQuantity::WindSpeed,
                values: vec![Some(0.0), None, Some(4.0)],
            }],
        };

        assert_eq!(series.interpolate(), 1);
        assert_eq!(series.columns[0].values[1], Some(1.0));
    }
}
