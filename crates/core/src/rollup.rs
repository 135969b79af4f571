//! Monthly rollup: a month of days folded into one bounded record.

use std::collections::HashMap;

use crate::compendium::Compendium;
use crate::events::{Day, Entry, Month, Stats};
use crate::limits::TOP_N;

/// Occurrence counter that remembers first-seen order.
///
/// Sorting is stable, so equal counts keep the order in which their keys
/// first appeared. That makes the top lists deterministic for a given input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopCounter {
    entries: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl TopCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, count: u64) {
        match self.index.get(key) {
            Some(&i) => self.entries[i].1 += count,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), count));
            }
        }
    }

    pub fn get(&self, key: &str) -> u64 {
        self.index.get(key).map(|&i| self.entries[i].1).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in first-seen order with their counts.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(k, c)| (k.as_str(), *c))
    }

    /// All entries, descending by count.
    pub fn sorted(&self) -> Vec<Entry> {
        let mut sorted: Vec<Entry> = self
            .entries
            .iter()
            .map(|(k, c)| Entry::new(k.clone(), *c))
            .collect();
        sorted.sort_by(|a, b| b.count.cmp(&a.count));
        sorted
    }

    /// The `n` largest entries.
    pub fn top(&self, n: usize) -> Vec<Entry> {
        let mut sorted = self.sorted();
        sorted.truncate(n);
        sorted
    }
}

/// Reduces the days of one domain into its month record.
///
/// Days are visited chronologically whatever their order in `days`, sessions
/// by id and events by arrival, so two runs over the same input serialize to
/// identical bytes.
pub fn reduce_month(domain: &str, month: &str, days: &[Day]) -> Month {
    let mut ordered: Vec<&Day> = days.iter().collect();
    ordered.sort_by(|a, b| a.day.cmp(&b.day));

    let mut stats = Stats::default();
    let mut compendium = Compendium::new();
    for day in ordered {
        for session in day.sessions.values() {
            if session.events.is_empty() {
                continue;
            }
            stats.add_session(session);
            compendium.apply(session);
        }
    }

    Month {
        domain: domain.to_string(),
        month: month.to_string(),
        total_sessions: stats.sessions,
        total_pageviews: stats.pageviews,
        total_score: stats.score,
        bounces: stats.bounces,
        bounce_rate: stats.bounce_rate(),
        top_pages: compendium.pages.top(TOP_N),
        top_referrers: compendium.referrers.top(TOP_N),
        top_referrer_scores: compendium.referrer_scores.top(TOP_N),
    }
}
