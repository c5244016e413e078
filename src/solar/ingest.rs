//! CSV ingest for grid-operator fuel-mix exports.
//!
//! Produces a [`SampleSeries`] from a header row plus one row per reading.
//! Unreadable power cells become missing readings; unreadable timestamps
//! abort the load since the row cannot be placed on any day.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info, warn};

use crate::solar::calendar::LocalCalendar;
use crate::solar::{Sample, SampleSeries, SolarError};

pub const DEFAULT_TIME_COLUMN: &str = "Time";
pub const DEFAULT_POWER_COLUMN: &str = "Solar";

/// Which columns carry the instant and the power reading
#[derive(Debug, Clone)]
pub struct CsvLayout {
    pub time_column: String,
    pub power_column: String,
}

impl Default for CsvLayout {
    fn default() -> Self {
        Self {
            time_column: DEFAULT_TIME_COLUMN.to_string(),
            power_column: DEFAULT_POWER_COLUMN.to_string(),
        }
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]±HH:MM`, and naive timestamps (taken as UTC).
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M%:z", "%Y-%m-%dT%H:%M%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let naive = value.trim_end_matches('Z');
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(dt.and_utc());
        }
    }

    None
}

/// Empty, non-numeric and non-finite cells are missing, never zero.
pub fn parse_power(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, SolarError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| SolarError::MissingColumn(name.to_string()))
}

/// Read readings from CSV, sorting by instant and keeping the first of any duplicates.
pub fn read_samples<R: Read>(reader: R, layout: &CsvLayout) -> Result<SampleSeries, SolarError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = rdr.headers()?.clone();
    let time_idx = column_index(&headers, &layout.time_column)?;
    let power_idx = column_index(&headers, &layout.power_column)?;

    let mut samples = Vec::new();
    let mut missing = 0usize;

    for record in rdr.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let raw_time = record.get(time_idx).unwrap_or_default();
        let instant = parse_instant(raw_time).ok_or_else(|| SolarError::InvalidTimestamp {
            line,
            value: raw_time.to_string(),
        })?;

        let power_mw = record.get(power_idx).and_then(parse_power);
        if power_mw.is_none() {
            missing += 1;
        }
        samples.push(Sample::new(instant, power_mw));
    }

    let rows = samples.len();
    samples.sort_by_key(|s| s.instant);
    samples.dedup_by_key(|s| s.instant);
    if samples.len() < rows {
        warn!(
            duplicates = rows - samples.len(),
            "Dropped rows with repeated timestamps"
        );
    }
    if missing > 0 {
        debug!(missing, "Rows without a usable power value");
    }

    SampleSeries::new(samples)
}

pub fn load_samples(path: &Path, layout: &CsvLayout) -> Result<SampleSeries, SolarError> {
    let file = File::open(path)?;
    let series = read_samples(file, layout)?;
    info!(
        path = %path.display(),
        rows = series.len(),
        "Loaded generation readings"
    );
    Ok(series)
}

/// Keep only readings whose local date falls in `year`.
///
/// Filtering on the UTC year would pull the last hours of the previous local
/// year in and leave the last hours of this one out.
pub fn trim_to_year(
    series: &SampleSeries,
    calendar: &LocalCalendar,
    year: i32,
) -> Result<SampleSeries, SolarError> {
    let kept: Vec<Sample> = series
        .samples()
        .iter()
        .filter(|s| calendar.local_year(s.instant) == year)
        .copied()
        .collect();

    let dropped = series.len() - kept.len();
    if dropped > 0 {
        info!(dropped, year, "Dropped readings outside the local year");
    }

    SampleSeries::new(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn test_parse_instant_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 8, 5, 0).unwrap();
        assert_eq!(parse_instant("2024-01-01T08:05:00Z"), Some(expected));
        assert_eq!(parse_instant("2024-01-01T08:05:00+00:00"), Some(expected));
        assert_eq!(parse_instant("2024-01-01 08:05:00+00:00"), Some(expected));
        assert_eq!(parse_instant("2024-01-01 00:05:00-08:00"), Some(expected));
        assert_eq!(parse_instant("2024-01-01 08:05:00"), Some(expected));
        assert_eq!(parse_instant("2024-01-01T08:05Z"), Some(expected));
        assert_eq!(parse_instant("not a time"), None);

        let ts = parse_instant(" 2024-06-21T19:30:00-07:00 ").unwrap();
        assert_eq!(ts.day(), 22);
        assert_eq!(ts.hour(), 2);
    }

    #[test]
    fn test_parse_power_tracks_missing() {
        assert_eq!(parse_power("1234.5"), Some(1234.5));
        assert_eq!(parse_power(" -31 "), Some(-31.0));
        assert_eq!(parse_power(""), None);
        assert_eq!(parse_power("NaN"), None);
        assert_eq!(parse_power("n/a"), None);
    }

    #[test]
    fn test_read_samples_sorts_and_dedups() {
        let csv = "Time,Wind,Solar\n\
                   2024-01-01 08:10:00+00:00,100,3\n\
                   2024-01-01 08:00:00+00:00,100,1\n\
                   2024-01-01 08:05:00+00:00,100,\n\
                   2024-01-01 08:00:00+00:00,100,9\n";
        let series = read_samples(csv.as_bytes(), &CsvLayout::default()).unwrap();

        assert_eq!(series.len(), 3);
        let powers: Vec<Option<f64>> = series.samples().iter().map(|s| s.power_mw).collect();
        assert_eq!(powers, vec![Some(1.0), None, Some(3.0)]);
        assert_eq!(series.valid_count(), 2);
    }

    #[test]
    fn test_read_samples_custom_columns() {
        let csv = "interval_start_utc,solar_mw\n2024-02-01T00:00:00Z,42\n";
        let layout = CsvLayout {
            time_column: "interval_start_utc".to_string(),
            power_column: "solar_mw".to_string(),
        };
        let series = read_samples(csv.as_bytes(), &layout).unwrap();
        assert_eq!(series.first().power_mw, Some(42.0));
    }

    #[test]
    fn test_read_samples_errors() {
        let no_column = "Time,Wind\n2024-01-01T00:00:00Z,1\n";
        assert!(matches!(
            read_samples(no_column.as_bytes(), &CsvLayout::default()),
            Err(SolarError::MissingColumn(c)) if c == "Solar"
        ));

        let bad_time = "Time,Solar\n2024-01-01T00:00:00Z,1\nyesterday,2\n";
        assert!(matches!(
            read_samples(bad_time.as_bytes(), &CsvLayout::default()),
            Err(SolarError::InvalidTimestamp { line: 3, ref value }) if value == "yesterday"
        ));

        let empty = "Time,Solar\n";
        assert!(matches!(
            read_samples(empty.as_bytes(), &CsvLayout::default()),
            Err(SolarError::EmptySeries)
        ));
    }

    #[test]
    fn test_trim_to_local_year() {
        let calendar = LocalCalendar::new("America/Los_Angeles").unwrap();
        // 2024-01-01T00:00Z is still 2023-12-31 in Pacific time
        let series = SampleSeries::new(vec![
            Sample::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), Some(1.0)),
            Sample::new(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(), Some(2.0)),
            Sample::new(Utc.with_ymd_and_hms(2025, 1, 1, 7, 55, 0).unwrap(), Some(3.0)),
        ])
        .unwrap();

        let trimmed = trim_to_year(&series, &calendar, 2024).unwrap();
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed.first().power_mw, Some(2.0));
        assert_eq!(trimmed.last().power_mw, Some(3.0));

        assert!(matches!(
            trim_to_year(&series, &calendar, 2030),
            Err(SolarError::EmptySeries)
        ));
    }

    #[test]
    fn test_load_samples_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("caiso_2024.csv");
        std::fs::write(
            &path,
            "Timestamp,MW\n\
             2024-06-21T15:00:00Z,812.5\n\
             2024-06-21T15:05:00Z,\n\
             2024-06-21T15:10:00Z,830\n",
        )
        .unwrap();

        let layout = CsvLayout {
            time_column: "Timestamp".to_string(),
            power_column: "MW".to_string(),
        };
        let series = load_samples(&path, &layout).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.valid_count(), 2);
        assert_eq!(
            series.first().instant,
            Utc.with_ymd_and_hms(2024, 6, 21, 15, 0, 0).unwrap()
        );

        assert!(matches!(
            load_samples(&path, &CsvLayout::default()),
            Err(SolarError::MissingColumn(_))
        ));
        assert!(matches!(
            load_samples(&dir.path().join("absent.csv"), &layout),
            Err(SolarError::Io(_))
        ));
    }
}
