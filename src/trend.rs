use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::{RoundingMode, Thresholds};
use crate::models::{TrendClass, TrendRecord};

/// Ordinary least-squares slope of `values` against 0, 1, 2, ...
///
/// Fewer than two points give a slope of 0.
pub fn least_squares_slope(values: &[i64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);

    let (covariance, variance) = values.iter().enumerate().fold(
        (0.0_f64, 0.0_f64),
        |(cov, var), (idx, &y)| {
            let dx = idx as f64 - x_mean;
            (cov + dx * (y as f64 - y_mean), var + dx * dx)
        },
    );

    covariance / variance
}

pub fn mean(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

pub fn estimate_trend(page: &str, series: &[i64], rounding: RoundingMode) -> TrendRecord {
    let slope = least_squares_slope(series);
    let average = mean(series);

    if average == 0.0 {
        return TrendRecord {
            page: page.to_string(),
            slope,
            trend_percentage: 0.0,
            undefined: true,
        };
    }

    TrendRecord {
        page: page.to_string(),
        slope,
        trend_percentage: rounding.round_one_decimal(slope / average * 100.0),
        undefined: false,
    }
}

/// Fits every page independently. Output order follows the input page order.
pub fn estimate_trends(
    series: &BTreeMap<String, Vec<i64>>,
    rounding: RoundingMode,
) -> Vec<TrendRecord> {
    let pages: Vec<(&String, &Vec<i64>)> = series.iter().collect();
    let trends: Vec<TrendRecord> = pages
        .par_iter()
        .map(|(page, values)| estimate_trend(page, values, rounding))
        .collect();

    let undefined = trends.iter().filter(|t| t.undefined).count();
    if undefined > 0 {
        warn!(pages = undefined, "pages with zero mean clicks reported a 0.0 trend");
    }
    debug!(pages = trends.len(), "estimated trends");
    trends
}

pub fn classify(trend_percentage: f64, thresholds: &Thresholds) -> TrendClass {
    if trend_percentage < thresholds.decline {
        TrendClass::Declining
    } else if trend_percentage > thresholds.improve {
        TrendClass::Improving
    } else {
        TrendClass::Stable
    }
}
