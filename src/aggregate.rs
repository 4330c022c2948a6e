use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::RoundingMode;
use crate::models::{Event, Month, MonthlyAggregate};

/// Sums clicks per (page, month). The sum is rounded once per bucket.
pub fn aggregate_monthly(events: &[Event], rounding: RoundingMode) -> Vec<MonthlyAggregate> {
    let mut buckets: BTreeMap<(String, Month), f64> = BTreeMap::new();

    for event in events {
        let key = (event.page.clone(), Month::from_date(event.date));
        *buckets.entry(key).or_insert(0.0) += event.clicks;
    }

    let aggregates: Vec<MonthlyAggregate> = buckets
        .into_iter()
        .map(|((page, month), clicks)| MonthlyAggregate {
            page,
            month,
            clicks: rounding.round_to_int(clicks),
        })
        .collect();

    debug!(
        events = events.len(),
        buckets = aggregates.len(),
        "aggregated events into monthly buckets"
    );
    aggregates
}

/// Every month seen anywhere in the dataset, ascending.
pub fn months(aggregates: &[MonthlyAggregate]) -> Vec<Month> {
    aggregates
        .iter()
        .map(|a| a.month)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Dense page x month matrix with explicit zeros, pages ascending. Each row
/// is aligned with `months`.
pub fn pivot(aggregates: &[MonthlyAggregate], months: &[Month]) -> BTreeMap<String, Vec<i64>> {
    let mut sparse: BTreeMap<&str, BTreeMap<Month, i64>> = BTreeMap::new();
    for aggregate in aggregates {
        sparse
            .entry(aggregate.page.as_str())
            .or_default()
            .insert(aggregate.month, aggregate.clicks);
    }

    sparse
        .into_iter()
        .map(|(page, by_month)| {
            let series = months
                .iter()
                .map(|month| by_month.get(month).copied().unwrap_or(0))
                .collect();
            (page.to_string(), series)
        })
        .collect()
}
