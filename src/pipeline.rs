use std::io::Read;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::aggregate;
use crate::config::Settings;
use crate::error::PipelineError;
use crate::projection;
use crate::report::{self, Report};
use crate::schema;

/// Runs one isolated pass: normalize, aggregate, project, then assemble.
pub fn run<R: Read>(input: R, as_of: NaiveDate, settings: &Settings) -> Result<Report, PipelineError> {
    let events = schema::read_events(input)?;
    if events.is_empty() {
        warn!("input has no rows, producing an empty report");
    }

    let aggregates = aggregate::aggregate_monthly(&events, settings.rounding);
    let projection = projection::project_current_month(aggregates, as_of, settings.rounding);
    let report = report::assemble(projection, as_of, settings);

    info!(
        events = events.len(),
        pages = report.rows.len(),
        months = report.months.len(),
        "built content decay report"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::models::TrendClass;

    const EXPORT: &str = "\
Address,Date,Clicks,Position
/a,2026-07-03,60,1.2
/a,2026-07-20,40,1.1
/a,2026-08-09,100,1.4
/a,2026-09-02,25,1.0
/a,2026-09-08,15,1.3
/b,2026-07-15,50,3.0
/b,2026-08-15,100,2.1
/c,2026-08-30,9,8.0
";

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, 11).expect("valid date")
    }

    #[test]
    fn projects_current_month_and_keeps_actuals() {
        let report = run(EXPORT.as_bytes(), as_of(), &Settings::default()).expect("report");
        let a = &report.rows[0];
        assert_eq!(a.page, "/a");
        assert_eq!(a.clicks_history, vec![100, 100, 120]);
        assert_eq!(a.real_clicks_current_month, Some(40));
        assert_eq!(a.total_clicks, 320);
        assert_eq!(report.rows[1].real_clicks_current_month, None);
    }

    #[test]
    fn report_pages_match_input_pages() {
        let report = run(EXPORT.as_bytes(), as_of(), &Settings::default()).expect("report");
        let pages: BTreeSet<&str> = report.rows.iter().map(|r| r.page.as_str()).collect();
        assert_eq!(pages, BTreeSet::from(["/a", "/b", "/c"]));
        assert_eq!(report.rows[2].clicks_history, vec![0, 9, 0]);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let settings = Settings::default();
        let first = run(EXPORT.as_bytes(), as_of(), &settings).expect("report");
        let second = run(EXPORT.as_bytes(), as_of(), &settings).expect("report");
        assert_eq!(first.to_json().to_string(), second.to_json().to_string());
        assert_eq!(first.to_markdown("export.csv", 5), second.to_markdown("export.csv", 5));
    }

    #[test]
    fn every_row_has_exactly_one_class() {
        let report = run(EXPORT.as_bytes(), as_of(), &Settings::default()).expect("report");
        for row in &report.rows {
            let matches = [TrendClass::Declining, TrendClass::Stable, TrendClass::Improving]
                .iter()
                .filter(|class| **class == row.classification)
                .count();
            assert_eq!(matches, 1);
            assert!(row.trend_percentage.is_finite());
        }
    }

    #[test]
    fn header_only_file_gives_empty_report() {
        let report = run("page,date,clicks\n".as_bytes(), as_of(), &Settings::default())
            .expect("report");
        assert!(report.is_empty());
        assert!(report.months.is_empty());
    }

    #[test]
    fn huge_click_counts_saturate_instead_of_overflowing() {
        let csv = "page,date,clicks\n/a,2026-07-01,1e19\n/a,2026-08-01,1e19\n/b,2026-08-02,5\n";
        let as_of = NaiveDate::from_ymd_opt(2026, 8, 11).expect("valid date");
        let report = run(csv.as_bytes(), as_of, &Settings::default()).expect("report");

        assert_eq!(report.rows.len(), 2);
        let huge = &report.rows[0];
        assert_eq!(huge.total_clicks, i64::MAX);
        assert!(huge.trend_percentage.is_finite());
        assert_eq!(report.rows[1].clicks_history, vec![0, 16]);
    }

    #[test]
    fn schema_errors_abort_the_run() {
        let result = run("page,day,clicks\n/a,2026-01-01,1\n".as_bytes(), as_of(), &Settings::default());
        assert!(matches!(result, Err(PipelineError::Schema { .. })));
    }
}
