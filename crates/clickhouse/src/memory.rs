//! In-process durable store for tests and local runs.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracking_core::{Day, Error, Month, Result};

use crate::store::DurableStore;

#[derive(Debug, Default)]
struct State {
    days: BTreeMap<(String, String), Day>,
    months: BTreeMap<(String, String), Month>,
    failing_domains: HashSet<String>,
    offline: bool,
}

/// Keeps records in ordered maps keyed like the ClickHouse tables.
#[derive(Debug, Default)]
pub struct MemoryDurableStore {
    state: Mutex<State>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write for `domain` fail.
    pub fn fail_writes_for(&self, domain: &str) {
        self.state.lock().failing_domains.insert(domain.to_string());
    }

    pub fn allow_writes_for(&self, domain: &str) {
        self.state.lock().failing_domains.remove(domain);
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn day(&self, domain: &str, day: &str) -> Option<Day> {
        self.state
            .lock()
            .days
            .get(&(domain.to_string(), day.to_string()))
            .cloned()
    }

    pub fn month(&self, domain: &str, month: &str) -> Option<Month> {
        self.state
            .lock()
            .months
            .get(&(domain.to_string(), month.to_string()))
            .cloned()
    }

    pub fn day_count(&self) -> usize {
        self.state.lock().days.len()
    }

    pub fn month_count(&self) -> usize {
        self.state.lock().months.len()
    }

    fn check_read(state: &State) -> Result<()> {
        if state.offline {
            return Err(Error::durable("memory store offline"));
        }
        Ok(())
    }

    fn check_write(state: &State, domain: &str) -> Result<()> {
        Self::check_read(state)?;
        if state.failing_domains.contains(domain) {
            return Err(Error::durable(format!("write rejected for {domain}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn upsert_day(&self, day: &Day) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_write(&state, &day.domain)?;
        state
            .days
            .insert((day.domain.clone(), day.day.clone()), day.clone());
        Ok(())
    }

    async fn upsert_month(&self, month: &Month) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_write(&state, &month.domain)?;
        state
            .months
            .insert((month.domain.clone(), month.month.clone()), month.clone());
        Ok(())
    }

    async fn days_in_range(&self, domain: &str, from: &str, to: &str) -> Result<Vec<Day>> {
        let state = self.state.lock();
        Self::check_read(&state)?;
        Ok(state
            .days
            .range((domain.to_string(), from.to_string())..=(domain.to_string(), to.to_string()))
            .map(|(_, day)| day.clone())
            .collect())
    }

    async fn domains_with_days(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let state = self.state.lock();
        Self::check_read(&state)?;
        let mut domains: Vec<String> = state
            .days
            .keys()
            .filter(|(_, day)| day.as_str() >= from && day.as_str() <= to)
            .map(|(domain, _)| domain.clone())
            .collect();
        domains.dedup();
        Ok(domains)
    }

    async fn domains_with_days_before(&self, cutoff: &str) -> Result<Vec<(String, String)>> {
        let state = self.state.lock();
        Self::check_read(&state)?;
        let mut oldest: BTreeMap<String, String> = BTreeMap::new();
        for (domain, day) in state.days.keys() {
            if day.as_str() < cutoff {
                // Keys are ordered, so the first day seen per domain is its oldest.
                oldest.entry(domain.clone()).or_insert_with(|| day.clone());
            }
        }
        Ok(oldest.into_iter().collect())
    }

    async fn months_in_range(&self, domain: &str, from: &str, to: &str) -> Result<Vec<Month>> {
        let state = self.state.lock();
        Self::check_read(&state)?;
        Ok(state
            .months
            .range((domain.to_string(), from.to_string())..=(domain.to_string(), to.to_string()))
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn delete_days(&self, domain: &str, from: &str, until: &str) -> Result<u64> {
        let mut state = self.state.lock();
        Self::check_write(&state, domain)?;
        let before = state.days.len();
        state
            .days
            .retain(|(d, day), _| !(d == domain && day.as_str() >= from && day.as_str() < until));
        Ok((before - state.days.len()) as u64)
    }

    async fn ping(&self) -> Result<()> {
        Self::check_read(&self.state.lock())
    }
}
