use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ValueError;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d-%m-%Y", "%d %b %Y",
    "%b %d, %Y", "%d.%m.%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parses the date formats seen in spreadsheet exports. Time components and
/// offsets are accepted and dropped.
pub fn parse_date(s: &str) -> Result<NaiveDate, ValueError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ValueError::date(s));
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }

    Err(ValueError::date(s))
}

/// Inclusive date bounds; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        DateRange { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn after_start(&self, date: NaiveDate) -> Option<bool> {
        self.start.map(|start| date >= start)
    }

    pub fn before_end(&self, date: NaiveDate) -> Option<bool> {
        self.end.map(|end| date <= end)
    }

    /// Number of days spanned, `None` when either end is open.
    pub fn days(&self) -> Option<i64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some((end - start).num_days()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parse_date_iso() {
        assert_eq!(parse_date("2024-01-15").unwrap(), date(2024, 1, 15));
    }

    #[test]
    fn parse_date_us_slash() {
        assert_eq!(parse_date("01/15/2024").unwrap(), date(2024, 1, 15));
    }

    #[test]
    fn parse_date_day_first_when_month_is_impossible() {
        assert_eq!(parse_date("15/01/2024").unwrap(), date(2024, 1, 15));
    }

    #[test]
    fn parse_date_with_time_component() {
        assert_eq!(parse_date("2024-01-15T09:30:00").unwrap(), date(2024, 1, 15));
        assert_eq!(parse_date("2024-01-15 09:30:00").unwrap(), date(2024, 1, 15));
    }

    #[test]
    fn parse_date_rfc3339() {
        assert_eq!(parse_date("2024-01-15T09:30:00Z").unwrap(), date(2024, 1, 15));
    }

    #[test]
    fn parse_date_invalid() {
        assert!(parse_date("not-a-date").is_err());
        assert!(parse_date("").is_err());
        assert!(parse_date("5.75").is_err());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = DateRange::new(Some(date(2024, 1, 1)), Some(date(2024, 1, 31)));
        assert_eq!(range.after_start(date(2024, 1, 1)), Some(true));
        assert_eq!(range.before_end(date(2024, 1, 31)), Some(true));
        assert_eq!(range.before_end(date(2024, 2, 1)), Some(false));
        assert_eq!(range.after_start(date(2023, 12, 31)), Some(false));
    }

    #[test]
    fn open_range_checks_only_defined_bound() {
        let range = DateRange::new(Some(date(2024, 1, 1)), None);
        assert_eq!(range.after_start(date(2024, 6, 1)), Some(true));
        assert_eq!(range.before_end(date(2024, 6, 1)), None);
    }

    #[test]
    fn empty_range() {
        assert!(DateRange::default().is_empty());
        assert_eq!(DateRange::default().days(), None);
    }

    #[test]
    fn days_spanned() {
        let range = DateRange::new(Some(date(2024, 1, 1)), Some(date(2024, 1, 31)));
        assert_eq!(range.days(), Some(30));
    }
}
