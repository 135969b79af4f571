//! Display-side aggregation over days and months.
//!
//! Nothing here touches a store. The query layer loads days or months and
//! hands them in; the functions only fold and shape them.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::events::{Day, Entry, Event, Month, Session, Stats};
use crate::limits::DEFAULT_SESSION_GROUP_LIMIT;
use crate::referrer::referrer_host;
use crate::rollup::TopCounter;
use crate::window::{format_day, MonthWindow};

/// Occurrence maps over a set of sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compendium {
    pub pages: TopCounter,
    pub referrers: TopCounter,
    pub referrer_scores: TopCounter,
}

impl Compendium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts the session's referrer once, adds its score to the referrer and
    /// counts every page view.
    pub fn apply(&mut self, session: &Session) {
        self.referrers.add(&session.referrer, 1);
        self.referrer_scores.add(&session.referrer, session.score());
        for event in &session.events {
            match event {
                Event::Page(page) => self.pages.add(page, 1),
                Event::Points(_) => {}
            }
        }
    }

    pub fn join(&mut self, other: &Compendium) {
        for (key, count) in other.pages.iter() {
            self.pages.add(key, count);
        }
        for (key, count) in other.referrers.iter() {
            self.referrers.add(key, count);
        }
        for (key, count) in other.referrer_scores.iter() {
            self.referrer_scores.add(key, count);
        }
    }

    /// Rebuilds a compendium from the bounded top lists of a month.
    pub fn from_month(month: &Month) -> Self {
        let mut c = Self::new();
        for e in &month.top_pages {
            c.pages.add(&e.address, e.count);
        }
        for e in &month.top_referrers {
            c.referrers.add(&e.address, e.count);
        }
        for e in &month.top_referrer_scores {
            c.referrer_scores.add(&e.address, e.count);
        }
        c
    }

    pub fn from_days<'a>(days: impl IntoIterator<Item = &'a Day>) -> Self {
        let mut c = Self::new();
        for day in days {
            for session in day.sessions.values() {
                c.apply(session);
            }
        }
        c
    }

    pub fn pages(&self) -> Vec<Entry> {
        self.pages.sorted()
    }

    pub fn referrers(&self) -> Vec<Entry> {
        self.referrers.sorted()
    }

    pub fn referrer_scores(&self) -> Vec<Entry> {
        self.referrer_scores.sorted()
    }
}

/// Stats of one day in a chart series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPoint {
    pub day: String,
    pub stats: Stats,
    pub bounce_rate: u32,
}

/// Stats of one month in a chart series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthPoint {
    pub month: String,
    pub stats: Stats,
    pub bounce_rate: u32,
}

/// One point per day in `from..=to`; days without a record get zero stats.
pub fn fill_days(days: &[Day], from: NaiveDate, to: NaiveDate) -> Vec<DayPoint> {
    let by_day: HashMap<&str, &Day> = days.iter().map(|d| (d.day.as_str(), d)).collect();

    from.iter_days()
        .take_while(|date| *date <= to)
        .map(|date| {
            let key = format_day(date);
            let stats = by_day.get(key.as_str()).map(|d| d.stats()).unwrap_or_default();
            DayPoint {
                day: key,
                bounce_rate: stats.bounce_rate(),
                stats,
            }
        })
        .collect()
}

/// One point per month in `from..=to`; gaps get zero stats.
pub fn fill_months(months: &[Month], from: MonthWindow, to: MonthWindow) -> Vec<MonthPoint> {
    let by_month: HashMap<&str, &Month> =
        months.iter().map(|m| (m.month.as_str(), m)).collect();

    let mut points = Vec::new();
    let mut current = from;
    while current <= to {
        let key = current.to_string();
        let point = match by_month.get(key.as_str()) {
            Some(m) => MonthPoint {
                month: key,
                stats: m.stats(),
                bounce_rate: m.bounce_rate,
            },
            None => MonthPoint {
                month: key,
                stats: Stats::default(),
                bounce_rate: 0,
            },
        };
        points.push(point);
        current = current.next();
    }
    points
}

/// Selection for [`sessions_by_referrer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFilter {
    /// Sessions scoring below this are skipped.
    pub min_score: u64,
    /// Only referrers on this host, when set.
    pub referrer_host: Option<String>,
    /// Total sessions returned across all groups.
    pub limit: usize,
}

impl Default for SessionFilter {
    fn default() -> Self {
        Self {
            min_score: 0,
            referrer_host: None,
            limit: DEFAULT_SESSION_GROUP_LIMIT,
        }
    }
}

/// Session scores sharing one referrer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGroup {
    pub referrer: String,
    pub scores: Vec<u64>,
}

impl SessionGroup {
    pub fn display_referrer(&self) -> &str {
        if self.referrer.is_empty() {
            Entry::DIRECT
        } else {
            &self.referrer
        }
    }
}

/// Groups session scores by referrer, newest day first, stopping at the
/// filter's limit. Groups appear in the order their referrer was first met.
pub fn sessions_by_referrer(days: &[Day], filter: &SessionFilter) -> Vec<SessionGroup> {
    let mut ordered: Vec<&Day> = days.iter().collect();
    ordered.sort_by(|a, b| b.day.cmp(&a.day));

    let wanted_host = filter
        .referrer_host
        .as_deref()
        .filter(|h| !h.is_empty())
        .map(str::to_ascii_lowercase);

    let mut groups: Vec<SessionGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut count = 0;

    'days: for day in ordered {
        for session in day.sessions.values() {
            if count >= filter.limit {
                break 'days;
            }
            if let Some(host) = &wanted_host {
                if referrer_host(&session.referrer).as_deref() != Some(host.as_str()) {
                    continue;
                }
            }

            let score = session.score();
            if score < filter.min_score {
                continue;
            }

            let slot = *index.entry(session.referrer.clone()).or_insert_with(|| {
                groups.push(SessionGroup {
                    referrer: session.referrer.clone(),
                    scores: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].scores.push(score);
            count += 1;
        }
    }

    groups
}
