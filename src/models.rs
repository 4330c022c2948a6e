use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub page: String,
    pub date: NaiveDate,
    pub clicks: f64,
}

/// Calendar month (day-truncated date).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn days_in_month(&self) -> Option<i64> {
        let start = self.first_day()?;
        let end = self.next().first_day()?;
        Some((end - start).num_days())
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for Month {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyAggregate {
    pub page: String,
    pub month: Month,
    pub clicks: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendRecord {
    pub page: String,
    pub slope: f64,
    pub trend_percentage: f64,
    /// Set when mean clicks is zero and the percentage fell back to 0.0.
    pub undefined: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendClass {
    Declining,
    Stable,
    Improving,
}

impl TrendClass {
    pub fn label(&self) -> &'static str {
        match self {
            TrendClass::Declining => "declining",
            TrendClass::Stable => "stable",
            TrendClass::Improving => "improving",
        }
    }
}

impl fmt::Display for TrendClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// "Now" falls on the first day of the last month, or before it.
    NoElapsedDays,
    NoCurrentMonth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProjectionOutcome {
    Scaled { days_passed: i64, total_days: i64 },
    Complete { total_days: i64 },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub page: String,
    /// Projected clicks per month, aligned with the clicks_history order.
    pub clicks_history: Vec<i64>,
    pub total_clicks: i64,
    pub real_clicks_current_month: Option<i64>,
    pub expected_clicks_current_month: Option<f64>,
    /// Per-month `clicks - expected`, aligned with clicks_history.
    pub deviations: Vec<Option<f64>>,
    pub deviation_percentages: Vec<Option<f64>>,
    pub trend_percentage: f64,
    pub trend_undefined: bool,
    pub classification: TrendClass,
}

#[derive(Debug, Clone)]
pub struct TrendSummary {
    pub declining: usize,
    pub stable: usize,
    pub improving: usize,
    pub average_trend: f64,
}
