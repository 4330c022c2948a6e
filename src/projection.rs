use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::config::RoundingMode;
use crate::models::{Month, MonthlyAggregate, ProjectionOutcome, SkipReason};

#[derive(Debug, Clone)]
pub struct Projection {
    pub aggregates: Vec<MonthlyAggregate>,
    /// Unscaled current-month clicks, only for pages seen in the last month.
    pub real_current: BTreeMap<String, i64>,
    pub last_month: Option<Month>,
    pub outcome: ProjectionOutcome,
}

/// Global current month: the latest month across all pages.
pub fn last_month(aggregates: &[MonthlyAggregate]) -> Option<Month> {
    aggregates.iter().map(|a| a.month).max()
}

/// Number of whole days between the first of `month` and `as_of`, clamped to
/// the month length. `None` when the month cannot be represented.
pub fn elapsed_days(month: Month, as_of: NaiveDate) -> Option<(i64, i64)> {
    let first = month.first_day()?;
    let total_days = month.days_in_month()?;
    let days_passed = (as_of - first).num_days().min(total_days);
    Some((days_passed, total_days))
}

pub fn project_current_month(
    aggregates: Vec<MonthlyAggregate>,
    as_of: NaiveDate,
    rounding: RoundingMode,
) -> Projection {
    let Some(current) = last_month(&aggregates) else {
        return Projection {
            aggregates,
            real_current: BTreeMap::new(),
            last_month: None,
            outcome: ProjectionOutcome::Skipped {
                reason: SkipReason::NoCurrentMonth,
            },
        };
    };

    let real_current: BTreeMap<String, i64> = aggregates
        .iter()
        .filter(|a| a.month == current)
        .map(|a| (a.page.clone(), a.clicks))
        .collect();

    let outcome = match elapsed_days(current, as_of) {
        Some((days_passed, total_days)) if days_passed >= total_days => {
            ProjectionOutcome::Complete { total_days }
        }
        Some((days_passed, total_days)) if days_passed > 0 => ProjectionOutcome::Scaled {
            days_passed,
            total_days,
        },
        _ => ProjectionOutcome::Skipped {
            reason: SkipReason::NoElapsedDays,
        },
    };

    let aggregates = match outcome {
        ProjectionOutcome::Scaled {
            days_passed,
            total_days,
        } => aggregates
            .into_iter()
            .map(|mut a| {
                if a.month == current {
                    a.clicks = rounding
                        .round_to_int(a.clicks as f64 / days_passed as f64 * total_days as f64);
                }
                a
            })
            .collect(),
        ProjectionOutcome::Skipped { reason } => {
            warn!(
                month = %current,
                as_of = %as_of,
                ?reason,
                "no elapsed days in current month, keeping actual clicks"
            );
            aggregates
        }
        ProjectionOutcome::Complete { .. } => aggregates,
    };

    debug!(month = %current, pages = real_current.len(), ?outcome, "projected current month");
    Projection {
        aggregates,
        real_current,
        last_month: Some(current),
        outcome,
    }
}
