use crate::error::ShiftError;
use chrono::{Datelike, Days, NaiveDate, Weekday};

const INVALID_MONTH: &str = "Invalid month. Use YYYY-MM";

/// Half-open `[start, end_exclusive)` range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end_exclusive: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end_exclusive: NaiveDate) -> Self {
        Self {
            start,
            end_exclusive,
        }
    }

    /// `YYYY-MM` to `[1st, first of next month)`.
    pub fn month(month: &str) -> Result<Self, ShiftError> {
        let invalid = || ShiftError::InvalidInput(INVALID_MONTH.to_owned());
        let (year, month) = month.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        if year <= 0 || !(1..=12).contains(&month) {
            return Err(invalid());
        }

        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let end_exclusive = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(invalid)?;

        Ok(Self::new(start, end_exclusive))
    }

    /// Monday-aligned week containing `date`, as `[monday, next monday)`.
    pub fn week_of(date: NaiveDate) -> Self {
        let start = week_start_monday(date);
        Self::new(start, add_days(start, 7))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end_exclusive
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end_exclusive;
        self.start.iter_days().take_while(move |date| *date < end)
    }
}

/// Monday on or before `date`.
pub fn week_start_monday(date: NaiveDate) -> NaiveDate {
    let diff = (date.weekday().num_days_from_sunday() + 6) % 7;
    date - Days::new(u64::from(diff))
}

pub fn week_end_sunday(date: NaiveDate) -> NaiveDate {
    add_days(week_start_monday(date), 6)
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn add_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

/// Reads the `YYYY-MM-DD` prefix of a date or date-time value.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

pub fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Date columns are written as date-times at midnight UTC.
pub fn midnight_utc(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", iso_date(date))
}

/// `Feb 9 – Feb 15` style label for the week starting at `week_start`.
pub fn week_range_label(week_start: NaiveDate) -> String {
    let week_end = add_days(week_start, 6);
    format!(
        "{} – {}",
        week_start.format("%b %-d"),
        week_end.format("%b %-d")
    )
}
