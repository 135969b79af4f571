//! Retention policy for compiled days.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::limits::DEFAULT_RETENTION_DAYS;
use crate::window::{format_day, MonthWindow};

/// How long compiled days are kept once their month has been reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Days older than this many days are eligible for deletion.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl RetentionPolicy {
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    /// First day that is still kept.
    pub fn horizon(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(i64::from(self.retention_days))
    }

    /// `YYYYMMDD` of the horizon; days strictly before it may be deleted.
    pub fn cutoff(&self, today: NaiveDate) -> String {
        format_day(self.horizon(today))
    }

    /// Months with expired days, oldest first, for days in `oldest..horizon`.
    ///
    /// A day is only deleted when the month covering it exists, so the sweep
    /// checks each of these months.
    pub fn expired_months(&self, oldest: NaiveDate, today: NaiveDate) -> Vec<MonthWindow> {
        let horizon = self.horizon(today);
        if oldest >= horizon {
            return Vec::new();
        }
        let last = MonthWindow::containing(horizon - Duration::days(1));
        let mut months = Vec::new();
        let mut current = MonthWindow::containing(oldest);
        while current <= last {
            months.push(current);
            current = current.next();
        }
        months
    }
}
