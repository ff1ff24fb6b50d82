//! Date windows supplied by callers.
//!
//! The engine never substitutes "today" on its own: a missing or malformed
//! window resolves to `None` and listing operations answer with no rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive calendar-date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Query parameters as sent by the reporting screens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, alias = "start_date")]
    pub start_date: Option<String>,
    #[serde(default, alias = "end_date")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

impl ReportQuery {
    pub fn for_day(date: &str) -> Self {
        Self {
            date: Some(date.to_string()),
            ..Self::default()
        }
    }

    pub fn for_range(start: &str, end: &str) -> Self {
        Self {
            start_date: Some(start.to_string()),
            end_date: Some(end.to_string()),
            ..Self::default()
        }
    }

    /// A start/end pair wins over a single date. Half a pair is malformed.
    pub fn range(&self) -> Option<DateRange> {
        match (non_empty(&self.start_date), non_empty(&self.end_date)) {
            (Some(start), Some(end)) => DateRange::parse(start, end),
            (None, None) => non_empty(&self.date)
                .and_then(parse_date)
                .map(DateRange::day),
            _ => None,
        }
    }

    pub fn search_term(&self) -> Option<&str> {
        non_empty(&self.search)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
