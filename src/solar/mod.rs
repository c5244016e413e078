pub(crate) mod analysis;
pub(crate) mod calendar;
pub(crate) mod document;
pub(crate) mod ingest;
pub(crate) mod key_dates;
pub(crate) mod operators;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolarError {
    #[error("Timezone could not be resolved: {0}")]
    TimezoneResolution(String),
    #[error("No local day matches date {0}")]
    DateNotFound(NaiveDate),
    #[error("Sample series is empty")]
    EmptySeries,
    #[error("Sample {index} is not strictly after its predecessor")]
    UnorderedSamples { index: usize },
    #[error("Invalid sample interval: {0} minutes")]
    InvalidInterval(u32),
    #[error("Invalid timestamp on line {line}: {value}")]
    InvalidTimestamp { line: u64, value: String },
    #[error("Column not found in CSV header: {0}")]
    MissingColumn(String),
    #[error("CSV reading failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Aggregation worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// One instantaneous power reading as published by the grid operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub instant: DateTime<Utc>,
    /// Megawatts; `None` when the source omitted the value or it was unreadable.
    pub power_mw: Option<f64>,
}

impl Sample {
    pub fn new(instant: DateTime<Utc>, power_mw: Option<f64>) -> Self {
        Self { instant, power_mw }
    }

    /// A reading counts only when present and finite. Negative values are kept as reported.
    pub fn is_valid(&self) -> bool {
        self.valid_power().is_some()
    }

    pub fn valid_power(&self) -> Option<f64> {
        self.power_mw.filter(|p| p.is_finite())
    }
}

/// Fixed sampling cadence in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInterval(u32);

impl SampleInterval {
    pub const FIVE_MINUTES: SampleInterval = SampleInterval(5);

    /// The interval must tile a day exactly so slot counts stay integral.
    pub fn new(minutes: u32) -> Result<Self, SolarError> {
        if minutes == 0 || minutes > 1440 || 1440 % minutes != 0 {
            return Err(SolarError::InvalidInterval(minutes));
        }
        Ok(Self(minutes))
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }

    pub fn hours(&self) -> f64 {
        self.0 as f64 / 60.0
    }

    /// Energy (MWh) represented by one reading held constant over the interval.
    pub fn energy_mwh(&self, power_mw: f64) -> f64 {
        power_mw * self.hours()
    }
}

impl Default for SampleInterval {
    fn default() -> Self {
        Self::FIVE_MINUTES
    }
}

/// Ordered readings for one fuel source. Read-only once built.
#[derive(Debug, Clone)]
pub struct SampleSeries {
    samples: Vec<Sample>,
}

impl SampleSeries {
    pub fn new(samples: Vec<Sample>) -> Result<Self, SolarError> {
        if samples.is_empty() {
            return Err(SolarError::EmptySeries);
        }

        if let Some(pos) = samples
            .windows(2)
            .position(|pair| pair[1].instant <= pair[0].instant)
        {
            return Err(SolarError::UnorderedSamples { index: pos + 1 });
        }

        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn first(&self) -> &Sample {
        &self.samples[0]
    }

    pub fn last(&self) -> &Sample {
        &self.samples[self.samples.len() - 1]
    }

    pub fn valid_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_valid()).count()
    }

    /// Whole-series energy in one pass, independent of any day bucketing.
    pub fn total_energy_mwh(&self, interval: SampleInterval) -> f64 {
        self.samples
            .iter()
            .filter_map(Sample::valid_power)
            .map(|p| interval.energy_mwh(p))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    #[test]
    fn test_empty_series_rejected() {
        assert!(matches!(
            SampleSeries::new(vec![]),
            Err(SolarError::EmptySeries)
        ));
    }

    #[test]
    fn test_unordered_series_rejected() {
        let samples = vec![
            Sample::new(at(0), Some(1.0)),
            Sample::new(at(5), Some(1.0)),
            Sample::new(at(5), Some(1.0)),
        ];
        assert!(matches!(
            SampleSeries::new(samples),
            Err(SolarError::UnorderedSamples { index: 2 })
        ));
    }

    #[test]
    fn test_missing_is_not_zero() {
        let sample = Sample::new(at(0), None);
        assert!(!sample.is_valid());
        assert_eq!(sample.valid_power(), None);

        let nan = Sample::new(at(5), Some(f64::NAN));
        assert!(!nan.is_valid());

        let negative = Sample::new(at(10), Some(-12.5));
        assert!(negative.is_valid());
    }

    #[test]
    fn test_interval_validation() {
        assert_eq!(SampleInterval::new(5).unwrap().minutes(), 5);
        assert_eq!(SampleInterval::new(60).unwrap().minutes(), 60);
        assert!(SampleInterval::new(0).is_err());
        assert!(SampleInterval::new(7).is_err());
        assert!(SampleInterval::new(2880).is_err());
    }

    #[test]
    fn test_total_energy_skips_missing() {
        let series = SampleSeries::new(vec![
            Sample::new(at(0), Some(120.0)),
            Sample::new(at(5), None),
            Sample::new(at(10), Some(60.0)),
        ])
        .unwrap();

        assert_eq!(series.valid_count(), 2);
        let energy = series.total_energy_mwh(SampleInterval::FIVE_MINUTES);
        assert!((energy - 15.0).abs() < 1e-9);
    }
}
