use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::solar::analysis::{
    CurveExtractor, DailyAggregator, DailyTotal, IntradayCurves, audit_cadence, curve_energy_mwh,
};
use crate::solar::calendar::{DaySpan, LocalCalendar, is_leap_year};
use crate::solar::ingest::trim_to_year;
use crate::solar::key_dates::{KeyDate, KeyDayRule, default_rules, select_key_dates};
use crate::solar::{SampleInterval, SampleSeries, SolarError};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub timezone: String,
    pub interval: SampleInterval,
    /// Local year to report; inferred from the readings when unset
    pub year: Option<i32>,
    /// Key-date rules in output order; the solstice/peak/minimum set when unset
    pub key_dates: Option<Vec<KeyDayRule>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timezone: "America/Los_Angeles".to_string(),
            interval: SampleInterval::FIVE_MINUTES,
            year: None,
            key_dates: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub year: i32,
    pub total_days: usize,
    pub interval_minutes: u32,
    pub is_leap_year: bool,
    pub timezone: String,
    pub source_samples: usize,
    pub valid_samples: usize,
}

/// Everything a year-view consumer needs, keyed and ordered for direct use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarDocument {
    pub metadata: Metadata,
    pub daily_totals: Vec<DailyTotal>,
    pub intraday_curves: IntradayCurves,
    pub key_dates: Vec<KeyDate>,
}

impl SolarDocument {
    pub fn total_for(&self, date: chrono::NaiveDate) -> Option<&DailyTotal> {
        self.daily_totals.iter().find(|t| t.date == date)
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), SolarError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn write_to_path(&self, path: &Path) -> Result<u64, SolarError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_json(&mut writer)?;
        writer.flush()?;

        let size = std::fs::metadata(path)?.len();
        info!(path = %path.display(), bytes = size, "Document written");
        Ok(size)
    }
}

/// Local year holding most readings; earlier year wins a tie.
pub fn infer_year(series: &SampleSeries, calendar: &LocalCalendar) -> i32 {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for sample in series.samples() {
        *counts.entry(calendar.local_year(sample.instant)).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .fold(None, |best: Option<(i32, usize)>, (year, n)| match best {
            Some((_, m)) if n <= m => best,
            _ => Some((year, n)),
        })
        .map(|(year, _)| year)
        .unwrap_or_else(|| calendar.local_year(series.first().instant))
}

/// Relative tolerance when comparing energy sums built in different orders
const ENERGY_TOLERANCE: f64 = 1e-9;

/// Disagreements between the whole series, the daily totals and the curves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsistencyReport {
    pub series_energy_mwh: f64,
    pub daily_energy_mwh: f64,
    /// Days whose curve energy differs from their total
    pub curve_mismatches: Vec<chrono::NaiveDate>,
    /// Days expected in the span but absent from the totals
    pub missing_days: usize,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        let scale = self.series_energy_mwh.abs().max(1.0);
        (self.series_energy_mwh - self.daily_energy_mwh).abs() <= ENERGY_TOLERANCE * scale
            && self.curve_mismatches.is_empty()
            && self.missing_days == 0
    }
}

/// Cross-check day bucketing against one whole-series integration.
pub fn check_consistency(
    series: &SampleSeries,
    daily_totals: &[DailyTotal],
    curves: &IntradayCurves,
    interval: SampleInterval,
    span: Option<DaySpan>,
) -> ConsistencyReport {
    let curve_mismatches = daily_totals
        .iter()
        .filter(|total| {
            let curve_energy = curves
                .get(&total.date)
                .map(|curve| curve_energy_mwh(curve, interval))
                .unwrap_or(0.0);
            let scale = total.total_energy.abs().max(1.0);
            (curve_energy - total.total_energy).abs() > ENERGY_TOLERANCE * scale
        })
        .map(|total| total.date)
        .collect();

    let missing_days = span
        .map(|span| {
            span.days()
                .filter(|day| daily_totals.binary_search_by_key(day, |t| t.date).is_err())
                .count()
        })
        .unwrap_or(0);

    let report = ConsistencyReport {
        series_energy_mwh: series.total_energy_mwh(interval),
        daily_energy_mwh: daily_totals.iter().map(|t| t.total_energy).sum(),
        curve_mismatches,
        missing_days,
    };

    if report.is_consistent() {
        debug!(
            energy_mwh = report.series_energy_mwh,
            days = span.map(|s| s.len()).unwrap_or(daily_totals.len()),
            "Daily totals match the whole series"
        );
    } else {
        warn!(
            series_energy_mwh = report.series_energy_mwh,
            daily_energy_mwh = report.daily_energy_mwh,
            curve_mismatches = report.curve_mismatches.len(),
            missing_days = report.missing_days,
            "Daily totals disagree with the whole series"
        );
    }

    report
}

/// Daily totals and curves over the same span, computed concurrently.
pub async fn aggregate_parallel(
    series: Arc<SampleSeries>,
    calendar: LocalCalendar,
    interval: SampleInterval,
    span: Option<DaySpan>,
) -> Result<(Vec<DailyTotal>, IntradayCurves), SolarError> {
    let mut aggregator = DailyAggregator::new(calendar, interval);
    let mut extractor = CurveExtractor::new(calendar);
    if let Some(span) = span {
        aggregator = aggregator.with_span(span);
        extractor = extractor.with_span(span);
    }

    let totals_series = Arc::clone(&series);
    let (totals, curves) = tokio::try_join!(
        tokio::task::spawn_blocking(move || aggregator.aggregate(&totals_series)),
        tokio::task::spawn_blocking(move || extractor.extract(&series))
    )?;

    Ok((totals, curves))
}

/// Build the full document for one local year of readings.
pub async fn build_document(
    series: &SampleSeries,
    config: &PipelineConfig,
) -> Result<SolarDocument, SolarError> {
    let calendar = LocalCalendar::new(&config.timezone)?;
    let year = config
        .year
        .unwrap_or_else(|| infer_year(series, &calendar));

    let series = Arc::new(trim_to_year(series, &calendar, year)?);
    audit_cadence(&series, config.interval);

    let span = DaySpan::calendar_year(year);
    let (daily_totals, intraday_curves) =
        aggregate_parallel(Arc::clone(&series), calendar, config.interval, span).await?;
    check_consistency(&series, &daily_totals, &intraday_curves, config.interval, span);

    let rules = match &config.key_dates {
        Some(rules) => rules.clone(),
        None => default_rules(year),
    };
    let key_dates = select_key_dates(&daily_totals, &rules);

    let metadata = Metadata {
        year,
        total_days: daily_totals.len(),
        interval_minutes: config.interval.minutes(),
        is_leap_year: is_leap_year(year),
        timezone: calendar.name().to_string(),
        source_samples: series.len(),
        valid_samples: series.valid_count(),
    };

    info!(
        year,
        days = metadata.total_days,
        key_dates = key_dates.len(),
        "Built solar document"
    );

    Ok(SolarDocument {
        metadata,
        daily_totals,
        intraday_curves,
        key_dates,
    })
}
