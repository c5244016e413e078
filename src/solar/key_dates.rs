use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::solar::SolarError;
use crate::solar::analysis::DailyTotal;

/// A date singled out for annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDate {
    pub date: NaiveDate,
    pub label: String,
    pub commentary: String,
}

/// How one entry of the key-date list is chosen.
///
/// Commentary may use `{date}`, `{energy}` (MWh, no decimals) and `{year}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyDayRule {
    Fixed {
        date: NaiveDate,
        label: String,
        commentary: String,
    },
    Peak {
        label: String,
        commentary: String,
    },
    Minimum {
        label: String,
        commentary: String,
    },
}

impl KeyDayRule {
    pub fn label(&self) -> &str {
        match self {
            KeyDayRule::Fixed { label, .. }
            | KeyDayRule::Peak { label, .. }
            | KeyDayRule::Minimum { label, .. } => label,
        }
    }
}

/// Solstices plus the extremum days, in presentation order.
pub fn default_rules(year: i32) -> Vec<KeyDayRule> {
    let mut rules = Vec::with_capacity(4);

    if let Some(date) = NaiveDate::from_ymd_opt(year, 6, 21) {
        rules.push(KeyDayRule::Fixed {
            date,
            label: "Summer Solstice".to_string(),
            commentary: "Longest day of the year. Solar panels generate power for over 14 hours, \
                         with peak generation around 1 PM Pacific Time."
                .to_string(),
        });
    }

    rules.push(KeyDayRule::Peak {
        label: "Peak Generation Day".to_string(),
        commentary: "Highest daily solar generation of {year}: {energy} MWh. Clear skies and \
                     long summer days combine for maximum output."
            .to_string(),
    });

    if let Some(date) = NaiveDate::from_ymd_opt(year, 12, 21) {
        rules.push(KeyDayRule::Fixed {
            date,
            label: "Winter Solstice".to_string(),
            commentary: "Shortest day of the year. Solar generation drops dramatically - less \
                         than 10 hours of useful sunlight and lower sun angle reduces efficiency."
                .to_string(),
        });
    }

    rules.push(KeyDayRule::Minimum {
        label: "Minimum Generation Day".to_string(),
        commentary: "Lowest daily solar generation of {year}: {energy} MWh. Weather conditions \
                     like clouds and rain can significantly impact solar output, even more than \
                     seasonal variations."
            .to_string(),
    });

    rules
}

/// Day with the highest energy; the earliest wins a tie.
pub fn peak_day(totals: &[DailyTotal]) -> Option<&DailyTotal> {
    totals.iter().fold(None, |best: Option<&DailyTotal>, day| match best {
        Some(b) if day.total_energy <= b.total_energy => Some(b),
        _ => Some(day),
    })
}

/// Day with the lowest energy among days that have any valid reading.
/// A day with no data is an outage, not low generation.
pub fn minimum_day(totals: &[DailyTotal]) -> Option<&DailyTotal> {
    totals
        .iter()
        .filter(|day| day.has_data())
        .fold(None, |best: Option<&DailyTotal>, day| match best {
            Some(b) if day.total_energy >= b.total_energy => Some(b),
            _ => Some(day),
        })
}

pub fn find_day(totals: &[DailyTotal], date: NaiveDate) -> Result<&DailyTotal, SolarError> {
    // Totals are chronological, one entry per date.
    totals
        .binary_search_by_key(&date, |t| t.date)
        .map(|i| &totals[i])
        .map_err(|_| SolarError::DateNotFound(date))
}

fn render(template: &str, day: &DailyTotal) -> String {
    template
        .replace("{date}", &day.date.to_string())
        .replace("{energy}", &format!("{:.0}", day.total_energy))
        .replace("{year}", &day.date.year().to_string())
}

/// Resolves each rule against the daily totals, keeping rule order.
///
/// Rules that match nothing are logged and left out.
pub fn select_key_dates(totals: &[DailyTotal], rules: &[KeyDayRule]) -> Vec<KeyDate> {
    rules
        .iter()
        .filter_map(|rule| {
            let resolved = match rule {
                KeyDayRule::Fixed { date, .. } => find_day(totals, *date).ok(),
                KeyDayRule::Peak { .. } => peak_day(totals),
                KeyDayRule::Minimum { .. } => minimum_day(totals),
            };

            let Some(day) = resolved else {
                match rule {
                    KeyDayRule::Fixed { date, .. } => {
                        let err = SolarError::DateNotFound(*date);
                        warn!(label = rule.label(), error = %err, "Skipping key date");
                    }
                    _ => warn!(label = rule.label(), "No day qualifies, skipping key date"),
                }
                return None;
            };

            let (label, commentary) = match rule {
                KeyDayRule::Fixed {
                    label, commentary, ..
                }
                | KeyDayRule::Peak { label, commentary }
                | KeyDayRule::Minimum { label, commentary } => (label, commentary),
            };

            if !matches!(rule, KeyDayRule::Fixed { .. }) {
                info!(
                    label = label.as_str(),
                    date = %day.date,
                    energy_mwh = day.total_energy.round(),
                    "Key date identified"
                );
            }

            Some(KeyDate {
                date: day.date,
                label: label.clone(),
                commentary: render(commentary, day),
            })
        })
        .collect()
}
