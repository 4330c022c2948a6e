use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use crate::aggregate;
use crate::config::{RoundingMode, Settings};
use crate::models::{Month, ProjectionOutcome, ReportRow, TrendClass, TrendRecord, TrendSummary};
use crate::projection::Projection;
use crate::trend;

#[derive(Debug, Clone)]
pub struct Report {
    pub as_of: NaiveDate,
    pub months: Vec<Month>,
    pub last_month: Option<Month>,
    pub projection: ProjectionOutcome,
    pub rows: Vec<ReportRow>,
}

pub fn assemble(projection: Projection, as_of: NaiveDate, settings: &Settings) -> Report {
    let months = aggregate::months(&projection.aggregates);
    let table = aggregate::pivot(&projection.aggregates, &months);
    let trends: BTreeMap<String, TrendRecord> = trend::estimate_trends(&table, settings.rounding)
        .into_iter()
        .map(|t| (t.page.clone(), t))
        .collect();

    let rows = table
        .into_iter()
        .map(|(page, clicks_history)| {
            let (trend_percentage, trend_undefined) = trends
                .get(&page)
                .map(|t| (t.trend_percentage, t.undefined))
                .unwrap_or((0.0, true));
            let expected = expected_current(&clicks_history);
            let (deviations, deviation_percentages) =
                deviations(&clicks_history, expected, settings.rounding);

            ReportRow {
                total_clicks: clicks_history
                    .iter()
                    .fold(0_i64, |total, &clicks| total.saturating_add(clicks)),
                real_clicks_current_month: projection.real_current.get(&page).copied(),
                expected_clicks_current_month: expected,
                deviations,
                deviation_percentages,
                trend_percentage,
                trend_undefined,
                classification: trend::classify(trend_percentage, &settings.thresholds),
                clicks_history,
                page,
            }
        })
        .collect();

    Report {
        as_of,
        months,
        last_month: projection.last_month,
        projection: projection.outcome,
        rows,
    }
}

/// Mean of the fully observed months, i.e. everything before the last one.
fn expected_current(series: &[i64]) -> Option<f64> {
    match series.split_last() {
        Some((_, previous)) if !previous.is_empty() => Some(trend::mean(previous)),
        _ => None,
    }
}

/// Absolute and percentage distance of every month from `expected`.
/// Percentages are absent when the expectation is zero.
fn deviations(
    series: &[i64],
    expected: Option<f64>,
    rounding: RoundingMode,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    series
        .iter()
        .map(|&clicks| {
            let Some(expected) = expected else {
                return (None, None);
            };
            let delta = clicks as f64 - expected;
            let percentage = (expected != 0.0)
                .then(|| rounding.round_one_decimal(delta / expected * 100.0));
            (Some(rounding.round_one_decimal(delta)), percentage)
        })
        .unzip()
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_labels(&self) -> Vec<String> {
        self.months
            .iter()
            .map(|month| {
                if Some(*month) == self.last_month {
                    format!("{month} (projected)")
                } else {
                    month.to_string()
                }
            })
            .collect()
    }

    pub fn summary(&self) -> TrendSummary {
        let count = |class: TrendClass| {
            self.rows
                .iter()
                .filter(|r| r.classification == class)
                .count()
        };
        let average_trend = if self.rows.is_empty() {
            0.0
        } else {
            self.rows.iter().map(|r| r.trend_percentage).sum::<f64>() / self.rows.len() as f64
        };

        TrendSummary {
            declining: count(TrendClass::Declining),
            stable: count(TrendClass::Stable),
            improving: count(TrendClass::Improving),
            average_trend,
        }
    }

    pub fn top_by_total(&self, limit: usize) -> Vec<&ReportRow> {
        let mut rows: Vec<&ReportRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| {
            b.total_clicks
                .cmp(&a.total_clicks)
                .then_with(|| a.page.cmp(&b.page))
        });
        rows.truncate(limit);
        rows
    }

    pub fn top_declining(&self, limit: usize) -> Vec<&ReportRow> {
        let mut rows: Vec<&ReportRow> = self
            .rows
            .iter()
            .filter(|r| r.classification == TrendClass::Declining)
            .collect();
        rows.sort_by(|a, b| {
            a.trend_percentage
                .total_cmp(&b.trend_percentage)
                .then_with(|| a.page.cmp(&b.page))
        });
        rows.truncate(limit);
        rows
    }

    pub fn to_json(&self) -> Value {
        let labels = self.column_labels();
        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let mut object = Map::new();
                object.insert("page".to_string(), json!(row.page));
                for (label, clicks) in labels.iter().zip(&row.clicks_history) {
                    object.insert(label.clone(), json!(clicks));
                }
                object.insert("clicks_history".to_string(), json!(row.clicks_history));
                object.insert("total_clicks".to_string(), json!(row.total_clicks));
                object.insert(
                    "real_clicks_current_month".to_string(),
                    json!(row.real_clicks_current_month),
                );
                object.insert(
                    "expected_clicks_current_month".to_string(),
                    json!(row.expected_clicks_current_month),
                );
                let deviations = row.deviations.iter().zip(&row.deviation_percentages);
                for (label, (delta, percentage)) in labels.iter().zip(deviations) {
                    object.insert(format!("{label} deviation"), json!(delta));
                    object.insert(format!("{label} % deviation"), json!(percentage));
                }
                object.insert("trend_percentage".to_string(), json!(row.trend_percentage));
                object.insert("trend_undefined".to_string(), json!(row.trend_undefined));
                object.insert("classification".to_string(), json!(row.classification));
                Value::Object(object)
            })
            .collect();

        json!({
            "as_of": self.as_of.to_string(),
            "last_month": self.last_month,
            "projection": self.projection,
            "columns": labels,
            "rows": rows,
        })
    }

    pub fn to_csv(&self) -> anyhow::Result<Vec<u8>> {
        let mut wtr = csv::Writer::from_writer(Vec::with_capacity(self.rows.len() * 128));

        let labels = self.column_labels();
        let mut header = vec!["page".to_string()];
        header.extend(labels.iter().cloned());
        header.extend(
            [
                "clicks_history",
                "total_clicks",
                "real_clicks_current_month",
                "expected_clicks_current_month",
            ]
            .map(str::to_string),
        );
        for label in &labels {
            header.push(format!("{label} deviation"));
            header.push(format!("{label} % deviation"));
        }
        header.extend(["trend_percentage", "classification"].map(str::to_string));
        wtr.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![sanitize_csv_field(&row.page)];
            record.extend(row.clicks_history.iter().map(ToString::to_string));
            record.push(
                row.clicks_history
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("|"),
            );
            record.push(row.total_clicks.to_string());
            record.push(optional(row.real_clicks_current_month));
            record.push(optional(row.expected_clicks_current_month.map(|v| format!("{v:.1}"))));
            for (delta, percentage) in row.deviations.iter().zip(&row.deviation_percentages) {
                record.push(optional(delta.map(|v| format!("{v:.1}"))));
                record.push(optional(percentage.map(|v| format!("{v:.1}"))));
            }
            record.push(format!("{:.1}", row.trend_percentage));
            record.push(row.classification.to_string());
            wtr.write_record(&record)?;
        }

        wtr.into_inner()
            .map_err(|e| anyhow::anyhow!("csv flush failed: {e}"))
    }

    pub fn to_markdown(&self, source: &str, limit: usize) -> String {
        let mut output = String::new();
        let summary = self.summary();

        let _ = writeln!(output, "# Content Decay Report");
        let _ = writeln!(output, "Generated from {} (as of {})", source, self.as_of);
        if let Some(month) = self.last_month {
            let _ = writeln!(output, "Current month {}: {}", month, describe(&self.projection));
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "## Trend Mix");
        let _ = writeln!(
            output,
            "- {} declining, {} stable, {} improving (average trend {:.1}%)",
            summary.declining, summary.stable, summary.improving, summary.average_trend
        );

        let _ = writeln!(output);
        let _ = writeln!(output, "## Top Pages by Clicks");
        for row in self.top_by_total(limit) {
            let _ = writeln!(
                output,
                "- {}: {} clicks, trend {:.1}% ({})",
                row.page, row.total_clicks, row.trend_percentage, row.classification
            );
        }

        let _ = writeln!(output);
        let _ = writeln!(output, "## Decaying Pages");
        let declining = self.top_declining(limit);
        if declining.is_empty() {
            let _ = writeln!(output, "No pages are declining.");
        } else {
            for row in declining {
                let _ = writeln!(
                    output,
                    "- {}: trend {:.1}% across {} clicks",
                    row.page, row.trend_percentage, row.total_clicks
                );
            }
        }

        let labels = self.column_labels();
        let _ = writeln!(output);
        let _ = writeln!(output, "## Monthly Clicks");
        let _ = writeln!(
            output,
            "| page | {} | total | current (actual) | trend % | status |",
            labels.join(" | ")
        );
        let _ = writeln!(output, "|{}", "---|".repeat(labels.len() + 5));
        for row in &self.rows {
            let cells: Vec<String> = row.clicks_history.iter().map(ToString::to_string).collect();
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {:.1} | {} |",
                escape_cell(&row.page),
                cells.join(" | "),
                row.total_clicks,
                optional(row.real_clicks_current_month),
                row.trend_percentage,
                row.classification
            );
        }

        let _ = writeln!(output);
        let _ = writeln!(output, "## Deviation From Expected");
        let _ = writeln!(output, "| page | expected | {} |", labels.join(" | "));
        let _ = writeln!(output, "|{}", "---|".repeat(labels.len() + 2));
        for row in &self.rows {
            let cells: Vec<String> = row
                .deviations
                .iter()
                .zip(&row.deviation_percentages)
                .map(|(delta, percentage)| match (delta, percentage) {
                    (Some(delta), Some(percentage)) => format!("{delta:+.1} ({percentage:+.1}%)"),
                    (Some(delta), None) => format!("{delta:+.1}"),
                    _ => "-".to_string(),
                })
                .collect();
            let _ = writeln!(
                output,
                "| {} | {} | {} |",
                escape_cell(&row.page),
                optional(row.expected_clicks_current_month.map(|v| format!("{v:.1}"))),
                cells.join(" | ")
            );
        }

        output
    }
}

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|")
}

fn describe(outcome: &ProjectionOutcome) -> String {
    match outcome {
        ProjectionOutcome::Scaled {
            days_passed,
            total_days,
        } => format!("projected from {days_passed} of {total_days} days"),
        ProjectionOutcome::Complete { .. } => "complete, not projected".to_string(),
        ProjectionOutcome::Skipped { .. } => "no elapsed days, actual clicks shown".to_string(),
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Prefixes values a spreadsheet would evaluate as formulas.
fn sanitize_csv_field(value: &str) -> String {
    if value.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        format!("'{value}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MonthlyAggregate;
    use crate::projection::project_current_month;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn agg(page: &str, month: u32, clicks: i64) -> MonthlyAggregate {
        MonthlyAggregate {
            page: page.to_string(),
            month: Month { year: 2026, month },
            clicks,
        }
    }

    fn sample_report(as_of: NaiveDate) -> Report {
        let aggregates = vec![
            agg("/a", 6, 100),
            agg("/a", 7, 100),
            agg("/a", 8, 100),
            agg("/b", 6, 50),
            agg("/b", 7, 100),
            agg("/b", 8, 150),
            agg("/c", 6, 90),
            agg("/c", 7, 30),
        ];
        let settings = Settings::default();
        let projection = project_current_month(aggregates, as_of, settings.rounding);
        assemble(projection, as_of, &settings)
    }

    #[test]
    fn rows_cover_every_page_and_month() {
        let report = sample_report(date(2026, 9, 10));
        let pages: Vec<&str> = report.rows.iter().map(|r| r.page.as_str()).collect();
        assert_eq!(pages, vec!["/a", "/b", "/c"]);
        for row in &report.rows {
            assert_eq!(row.clicks_history.len(), report.months.len());
        }
        assert_eq!(report.rows[2].clicks_history, vec![90, 30, 0]);
        assert_eq!(report.rows[2].real_clicks_current_month, None);
    }

    #[test]
    fn complete_months_reproduce_reference_scenarios() {
        let report = sample_report(date(2026, 9, 10));
        let flat = &report.rows[0];
        assert_eq!(flat.clicks_history, vec![100, 100, 100]);
        assert_eq!(flat.total_clicks, 300);
        assert_eq!(flat.trend_percentage, 0.0);
        assert_eq!(flat.classification, TrendClass::Stable);
        assert_eq!(flat.real_clicks_current_month, Some(100));

        let growing = &report.rows[1];
        assert_eq!(growing.trend_percentage, 50.0);
        assert_eq!(growing.classification, TrendClass::Improving);
        assert_eq!(growing.expected_clicks_current_month, Some(75.0));
        assert_eq!(growing.deviations, vec![Some(-25.0), Some(25.0), Some(75.0)]);
        assert_eq!(
            growing.deviation_percentages,
            vec![Some(-33.3), Some(33.3), Some(100.0)]
        );

        assert_eq!(report.rows[2].classification, TrendClass::Declining);
    }

    #[test]
    fn last_column_is_labelled_projected() {
        let report = sample_report(date(2026, 8, 11));
        assert_eq!(
            report.column_labels(),
            vec!["2026-06", "2026-07", "2026-08 (projected)"]
        );
        assert!(matches!(report.projection, ProjectionOutcome::Scaled { .. }));
        // 100 over 10 of 31 days
        assert_eq!(report.rows[0].clicks_history[2], 310);
        assert_eq!(report.rows[0].real_clicks_current_month, Some(100));
    }

    #[test]
    fn summary_counts_partition_rows() {
        let report = sample_report(date(2026, 9, 10));
        let summary = report.summary();
        assert_eq!(summary.declining + summary.stable + summary.improving, report.rows.len());
        assert_eq!(summary.improving, 1);
        assert_eq!(summary.declining, 1);
    }

    #[test]
    fn top_views_are_ranked() {
        let report = sample_report(date(2026, 9, 10));
        let top: Vec<&str> = report.top_by_total(2).iter().map(|r| r.page.as_str()).collect();
        assert_eq!(top, vec!["/a", "/b"]);
        let declining: Vec<&str> = report.top_declining(5).iter().map(|r| r.page.as_str()).collect();
        assert_eq!(declining, vec!["/c"]);
    }

    #[test]
    fn empty_projection_gives_empty_report() {
        let as_of = date(2026, 9, 10);
        let projection = project_current_month(Vec::new(), as_of, RoundingMode::HalfEven);
        let report = assemble(projection, as_of, &Settings::default());
        assert!(report.is_empty());
        assert!(report.column_labels().is_empty());
        assert_eq!(report.summary().average_trend, 0.0);
        assert!(report.to_markdown("empty.csv", 10).contains("No pages are declining."));
    }

    #[test]
    fn json_rows_carry_month_columns() {
        let report = sample_report(date(2026, 8, 11));
        let value = report.to_json();
        let first = &value["rows"][0];
        assert_eq!(first["page"], "/a");
        assert_eq!(first["2026-06"], 100);
        assert_eq!(first["2026-08 (projected)"], 310);
        assert_eq!(first["clicks_history"], json!([100, 100, 310]));
        assert_eq!(value["rows"][2]["real_clicks_current_month"], Value::Null);
        assert_eq!(value["projection"]["status"], "scaled");
    }

    #[test]
    fn csv_output_has_one_line_per_page() {
        let report = sample_report(date(2026, 9, 10));
        let bytes = report.to_csv().expect("csv renders");
        let text = String::from_utf8(bytes).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("page,2026-06,2026-07,2026-08 (projected),clicks_history"));
        assert!(lines[1].starts_with("/a,100,100,100,100|100|100,300,100,"));
    }

    #[test]
    fn every_month_carries_a_deviation() {
        let report = sample_report(date(2026, 9, 10));
        let declining = &report.rows[2];
        assert_eq!(declining.expected_clicks_current_month, Some(60.0));
        assert_eq!(declining.deviations, vec![Some(30.0), Some(-30.0), Some(-60.0)]);
        assert_eq!(
            declining.deviation_percentages,
            vec![Some(50.0), Some(-50.0), Some(-100.0)]
        );

        let value = report.to_json();
        assert_eq!(value["rows"][2]["2026-06 deviation"], 30.0);
        assert_eq!(value["rows"][2]["2026-08 (projected) % deviation"], -100.0);

        let text = String::from_utf8(report.to_csv().expect("csv renders")).expect("utf8");
        let header = text.lines().next().expect("header line");
        assert!(header.contains("2026-07 deviation,2026-07 % deviation"));
    }

    #[test]
    fn zero_expectation_has_no_percentage() {
        let as_of = date(2026, 9, 10);
        let aggregates = vec![agg("/new", 7, 0), agg("/new", 8, 12)];
        let projection = project_current_month(aggregates, as_of, RoundingMode::HalfEven);
        let report = assemble(projection, as_of, &Settings::default());
        let row = &report.rows[0];
        assert_eq!(row.deviations, vec![Some(0.0), Some(12.0)]);
        assert_eq!(row.deviation_percentages, vec![None, None]);
        assert_eq!(report.to_json()["rows"][0]["2026-08 (projected) % deviation"], Value::Null);
    }

    #[test]
    fn single_month_has_no_expectation() {
        let as_of = date(2026, 9, 10);
        let projection =
            project_current_month(vec![agg("/solo", 8, 4)], as_of, RoundingMode::HalfEven);
        let report = assemble(projection, as_of, &Settings::default());
        assert_eq!(report.rows[0].expected_clicks_current_month, None);
        assert_eq!(report.rows[0].deviations, vec![None]);
    }

    #[test]
    fn pipes_in_pages_do_not_break_markdown_tables() {
        let as_of = date(2026, 9, 10);
        let projection =
            project_current_month(vec![agg("/a|b", 8, 4)], as_of, RoundingMode::HalfEven);
        let report = assemble(projection, as_of, &Settings::default());
        let markdown = report.to_markdown("pipes.csv", 5);
        let row = markdown
            .lines()
            .find(|line| line.starts_with("| /a"))
            .expect("table row");
        assert!(row.starts_with("| /a\\|b | 4 |"));
        assert_eq!(escape_cell("x|y|z"), "x\\|y\\|z");
    }

    #[test]
    fn csv_fields_are_guarded_against_formulas() {
        assert_eq!(sanitize_csv_field("=HYPERLINK(1)"), "'=HYPERLINK(1)");
        assert_eq!(sanitize_csv_field("/blog"), "/blog");
    }
}
