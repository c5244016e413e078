use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::solar::calendar::{DaySpan, LocalCalendar};
use crate::solar::{SampleInterval, SampleSeries};

/// Energy produced on one local day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    /// MWh, from fixed-interval integration of the valid readings
    pub total_energy: f64,
    pub day_index: usize,
    /// Valid readings only; missing ones are not counted
    pub sample_count: usize,
    pub expected_samples: usize,
}

impl DailyTotal {
    pub fn has_data(&self) -> bool {
        self.sample_count > 0
    }

    /// Share of the expected readings that were valid
    pub fn completeness(&self) -> f64 {
        if self.expected_samples == 0 {
            0.0
        } else {
            self.sample_count as f64 / self.expected_samples as f64
        }
    }
}

/// One reading placed on its local day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub minute_of_day: u16,
    pub power_value: Option<f64>,
}

/// Local-day curves keyed by date; iteration is chronological.
pub type IntradayCurves = BTreeMap<NaiveDate, Vec<CurvePoint>>;

/// Span covered by the series on the local calendar, widened to `requested`.
pub fn observed_span(
    series: &SampleSeries,
    calendar: &LocalCalendar,
    requested: Option<DaySpan>,
) -> DaySpan {
    let observed = DaySpan::new(
        calendar.local_date(series.first().instant),
        calendar.local_date(series.last().instant),
    );
    match requested {
        Some(span) => observed.union(span),
        None => observed,
    }
}

/// Integrates power readings into one energy total per local day.
#[derive(Debug, Clone, Copy)]
pub struct DailyAggregator {
    calendar: LocalCalendar,
    interval: SampleInterval,
    span: Option<DaySpan>,
}

impl DailyAggregator {
    pub fn new(calendar: LocalCalendar, interval: SampleInterval) -> Self {
        Self {
            calendar,
            interval,
            span: None,
        }
    }

    /// Days in `span` are emitted even when no reading falls on them.
    pub fn with_span(mut self, span: DaySpan) -> Self {
        self.span = Some(span);
        self
    }

    /// Each valid reading counts as `power × interval/60` MWh, i.e. the reading
    /// is held constant until the next slot. Missing readings add nothing.
    pub fn aggregate(&self, series: &SampleSeries) -> Vec<DailyTotal> {
        let span = observed_span(series, &self.calendar, self.span);

        let mut buckets: BTreeMap<NaiveDate, (f64, usize)> =
            span.days().map(|day| (day, (0.0, 0))).collect();

        let mut missing = 0usize;
        for sample in series.samples() {
            let date = self.calendar.local_date(sample.instant);
            let bucket = buckets.entry(date).or_insert((0.0, 0));
            match sample.valid_power() {
                Some(power) => {
                    bucket.0 += self.interval.energy_mwh(power);
                    bucket.1 += 1;
                }
                None => missing += 1,
            }
        }

        if missing > 0 {
            warn!(missing, "Readings without a usable power value were skipped");
        }

        let totals: Vec<DailyTotal> = buckets
            .into_iter()
            .enumerate()
            .map(|(day_index, (date, (total_energy, sample_count)))| DailyTotal {
                date,
                total_energy,
                day_index,
                sample_count,
                expected_samples: self.calendar.expected_slots(date, self.interval),
            })
            .collect();

        let empty_days = totals.iter().filter(|t| !t.has_data()).count();
        debug!(
            days = totals.len(),
            empty_days,
            "Aggregated daily energy totals"
        );

        totals
    }
}

/// Groups raw readings into per-day curves without resampling.
#[derive(Debug, Clone, Copy)]
pub struct CurveExtractor {
    calendar: LocalCalendar,
    span: Option<DaySpan>,
}

impl CurveExtractor {
    pub fn new(calendar: LocalCalendar) -> Self {
        Self {
            calendar,
            span: None,
        }
    }

    pub fn with_span(mut self, span: DaySpan) -> Self {
        self.span = Some(span);
        self
    }

    /// Points keep source order within a day, so a fall-back day carries the
    /// repeated hour twice and a spring-forward day has a one-hour hole.
    pub fn extract(&self, series: &SampleSeries) -> IntradayCurves {
        let span = observed_span(series, &self.calendar, self.span);

        let mut curves: IntradayCurves = span.days().map(|day| (day, Vec::new())).collect();

        for sample in series.samples() {
            let slot = self.calendar.locate(sample.instant);
            curves.entry(slot.date).or_default().push(CurvePoint {
                minute_of_day: slot.minute_of_day,
                power_value: sample.valid_power(),
            });
        }

        debug!(days = curves.len(), "Extracted intraday curves");
        curves
    }
}

/// Energy of one curve, using the same integration as [`DailyAggregator`].
pub fn curve_energy_mwh(curve: &[CurvePoint], interval: SampleInterval) -> f64 {
    curve
        .iter()
        .filter_map(|p| p.power_value)
        .map(|p| interval.energy_mwh(p))
        .sum()
}

/// Gaps between consecutive readings that differ from the configured cadence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CadenceReport {
    pub irregular_gaps: usize,
    pub longest_gap_minutes: i64,
}

/// The configured interval stays authoritative for energy; this only reports.
pub fn audit_cadence(series: &SampleSeries, interval: SampleInterval) -> CadenceReport {
    let expected = interval.minutes() as i64;
    let mut report = CadenceReport::default();

    for pair in series.samples().windows(2) {
        let gap = (pair[1].instant - pair[0].instant).num_minutes();
        if gap != expected {
            report.irregular_gaps += 1;
        }
        report.longest_gap_minutes = report.longest_gap_minutes.max(gap);
    }

    if report.irregular_gaps > 0 {
        warn!(
            irregular_gaps = report.irregular_gaps,
            longest_gap_minutes = report.longest_gap_minutes,
            interval_minutes = expected,
            "Sample cadence differs from the configured interval"
        );
    }

    report
}
