use std::io::Read;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::error::PipelineError;
use crate::models::Event;

pub const REQUIRED_COLUMNS: [&str; 3] = ["date", "clicks", "page"];
const PAGE_ALIASES: [&str; 3] = ["address", "adresse", "url"];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Lower-cases header names and maps the first known page alias onto `page`.
pub fn resolve_columns(headers: &[String]) -> Vec<String> {
    let mut columns: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

    if !columns.iter().any(|c| c == "page") {
        if let Some(idx) = columns
            .iter()
            .position(|c| PAGE_ALIASES.contains(&c.as_str()))
        {
            columns[idx] = "page".to_string();
        }
    }

    columns
}

pub fn read_events<R: Read>(input: R) -> Result<Vec<Event>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let columns = resolve_columns(&headers);

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !columns.iter().any(|c| c == *required))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Schema {
            missing,
            required: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
        });
    }

    let index_of = |name: &str| columns.iter().position(|c| c == name).unwrap_or_default();
    let page_idx = index_of("page");
    let date_idx = index_of("date");
    let clicks_idx = index_of("clicks");

    let mut events = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(row as u64 + 2);

        let page = record.get(page_idx).unwrap_or_default().to_string();
        let raw_date = record.get(date_idx).unwrap_or_default();
        let raw_clicks = record.get(clicks_idx).unwrap_or_default();

        let date = parse_date(raw_date).ok_or_else(|| PipelineError::InvalidDate {
            line,
            value: raw_date.to_string(),
        })?;
        let clicks = parse_clicks(raw_clicks).ok_or_else(|| PipelineError::InvalidClicks {
            line,
            value: raw_clicks.to_string(),
        })?;

        events.push(Event { page, date, clicks });
    }

    debug!(rows = events.len(), "normalized input rows");
    Ok(events)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|dt| dt.date())
}

/// Empty cells count as zero; anything non-numeric is rejected.
pub fn parse_clicks(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0.0);
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}
