use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Short code an operator publishes its fuel-mix data under
pub type OperatorCode = &'static str;

/// A regional grid operator and the clock its reports follow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridOperator {
    pub code: OperatorCode,
    pub name: &'static str,
    /// IANA zone of the operator's local day. MISO and IESO report on
    /// standard time all year, so they map to `EST` rather than a DST zone.
    pub timezone: &'static str,
    pub fuel_mix_interval_minutes: u32,
}

impl GridOperator {
    pub const fn new(
        code: OperatorCode,
        name: &'static str,
        timezone: &'static str,
        fuel_mix_interval_minutes: u32,
    ) -> Self {
        Self {
            code,
            name,
            timezone,
            fuel_mix_interval_minutes,
        }
    }
}

pub const DEFAULT_OPERATOR: OperatorCode = "CAISO";

/// North American operators with published fuel-mix series, keyed by code
pub static GRID_OPERATORS: Lazy<HashMap<OperatorCode, GridOperator>> = Lazy::new(|| {
    let operators = vec![
        GridOperator::new("CAISO", "California ISO", "America/Los_Angeles", 5),
        GridOperator::new("ERCOT", "Electric Reliability Council of Texas", "America/Chicago", 5),
        GridOperator::new("SPP", "Southwest Power Pool", "America/Chicago", 5),
        GridOperator::new("MISO", "Midcontinent ISO", "EST", 5),
        GridOperator::new("PJM", "PJM Interconnection", "America/New_York", 5),
        GridOperator::new("NYISO", "New York ISO", "America/New_York", 5),
        GridOperator::new("ISONE", "ISO New England", "America/New_York", 5),
        GridOperator::new("IESO", "Ontario IESO", "EST", 60),
        GridOperator::new("AESO", "Alberta Electric System Operator", "America/Edmonton", 60),
    ];

    operators.into_iter().map(|op| (op.code, op)).collect()
});

/// Look up an operator by code, ignoring case
pub fn get_operator(code: &str) -> Option<&'static GridOperator> {
    GRID_OPERATORS
        .values()
        .find(|op| op.code.eq_ignore_ascii_case(code))
}

/// All operators sorted by code
pub fn list_operators() -> Vec<&'static GridOperator> {
    let mut operators: Vec<_> = GRID_OPERATORS.values().collect();
    operators.sort_by_key(|op| op.code);
    operators
}

impl std::fmt::Display for GridOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}) - {}", self.name, self.code, self.timezone)
    }
}
