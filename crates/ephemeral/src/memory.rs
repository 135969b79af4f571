//! In-process store for tests and single-node development.
//!
//! Lifetimes are not enforced; [`MemoryStore::expire_referrer`] simulates an
//! expired first-referrer entry.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracking_core::{Error, Result};

use crate::keys;
use crate::store::{EphemeralStore, Eviction, RawDay, RawSession, SessionAppend};

#[derive(Debug, Default)]
struct State {
    lists: BTreeMap<String, Vec<String>>,
    referrers: HashMap<String, String>,
    /// day -> domain -> appends since the domain became pending.
    pending: HashMap<String, BTreeMap<String, u64>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with a store error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn expire_referrer(&self, domain: &str, nonce: u32) {
        self.state.lock().referrers.remove(&keys::referrer_key(domain, nonce));
    }

    /// Raw list elements of one session, if present.
    pub fn session(&self, day: &str, domain: &str, nonce: u32) -> Option<Vec<String>> {
        self.state
            .lock()
            .lists
            .get(&keys::session_key(day, domain, nonce))
            .cloned()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().lists.len()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::ephemeral("memory store offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    async fn append_and_len(&self, append: &SessionAppend) -> Result<i64> {
        self.check_online()?;

        let session_key = append.session_key();
        let referrer_key = append.referrer_key();

        // One lock across the whole operation keeps it indivisible.
        let mut state = self.state.lock();
        let State {
            lists,
            referrers,
            pending,
        } = &mut *state;

        let list = lists.entry(session_key).or_default();
        if list.is_empty() {
            let referrer = if append.continuing {
                referrers
                    .get(&referrer_key)
                    .cloned()
                    .unwrap_or_else(|| append.referrer.clone())
            } else {
                append.referrer.clone()
            };
            referrers.insert(referrer_key, referrer.clone());
            list.push(referrer);
        }
        list.push(append.event.to_wire());

        *pending
            .entry(append.day.clone())
            .or_default()
            .entry(append.domain.clone())
            .or_default() += 1;

        Ok(list.len() as i64 - 1)
    }

    async fn pending_domains(&self, day: &str) -> Result<Vec<String>> {
        self.check_online()?;
        Ok(self
            .state
            .lock()
            .pending
            .get(day)
            .map(|domains| domains.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn read_day(&self, day: &str, domain: &str) -> Result<RawDay> {
        self.check_online()?;
        let prefix = keys::session_prefix(day, domain);
        let state = self.state.lock();
        let generation = state
            .pending
            .get(day)
            .and_then(|domains| domains.get(domain))
            .copied()
            .unwrap_or(0);

        let sessions = state
            .lists
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, elements)| {
                keys::session_id(key).map(|id| RawSession {
                    key: key.clone(),
                    id: id.to_string(),
                    elements: elements.clone(),
                })
            })
            .collect();

        Ok(RawDay {
            day: day.to_string(),
            domain: domain.to_string(),
            generation,
            sessions,
        })
    }

    async fn evict(&self, raw: &RawDay) -> Result<Eviction> {
        self.check_online()?;
        let mut state = self.state.lock();

        let current = state
            .pending
            .get(&raw.day)
            .and_then(|domains| domains.get(&raw.domain))
            .copied()
            .unwrap_or(0);
        if current != raw.generation {
            return Ok(Eviction::Changed);
        }

        for session in &raw.sessions {
            state.lists.remove(&session.key);
        }
        if let Some(domains) = state.pending.get_mut(&raw.day) {
            domains.remove(&raw.domain);
            if domains.is_empty() {
                state.pending.remove(&raw.day);
            }
        }
        Ok(Eviction::Evicted)
    }

    async fn ping(&self) -> Result<()> {
        self.check_online()
    }
}
