//! Day and month windows in the `YYYYMMDD` / `YYYYMM` formats used as keys.

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{Error, Result};

pub const DAY_FORMAT: &str = "%Y%m%d";

/// A calendar month, the unit of the monthly rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthWindow {
    year: i32,
    month: u32,
}

impl MonthWindow {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::invalid_window(format!("month {month} out of range")));
        }
        Ok(Self { year, month })
    }

    /// The month containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parses `YYYYMM`.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() != 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid_window(format!("expected YYYYMM, got {raw:?}")));
        }
        let year = raw[..4]
            .parse()
            .map_err(|_| Error::invalid_window(format!("bad year in {raw:?}")))?;
        let month = raw[4..]
            .parse()
            .map_err(|_| Error::invalid_window(format!("bad month in {raw:?}")))?;
        Self::new(year, month)
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day() - Duration::days(1)
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
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

    /// Inclusive `YYYYMMDD` bounds of the month.
    pub fn day_range(&self) -> (String, String) {
        (format_day(self.first_day()), format_day(self.last_day()))
    }
}

impl std::fmt::Display for MonthWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

pub fn format_day(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

/// Parses `YYYYMMDD`.
pub fn parse_day(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DAY_FORMAT)
        .map_err(|e| Error::invalid_window(format!("expected YYYYMMDD, got {raw:?}: {e}")))
}

/// The day before `today`, the default target of the daily compiler.
pub fn yesterday(today: NaiveDate) -> NaiveDate {
    today - Duration::days(1)
}
