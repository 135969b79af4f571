//! Store trait and the raw shapes read back from it.

use async_trait::async_trait;
use tracking_core::{Day, Event, Result, Session};

use crate::keys;

/// One pixel hit to append to a session list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAppend {
    /// `YYYYMMDD` of the hit.
    pub day: String,
    pub domain: String,
    pub nonce: u32,
    pub event: Event,
    /// Referrer written when the session list is created and no stored
    /// referrer applies. Already normalized and checked against the denylist.
    pub referrer: String,
    /// The visitor presented a valid token; prefer the stored first referrer.
    pub continuing: bool,
}

impl SessionAppend {
    pub fn session_key(&self) -> String {
        keys::session_key(&self.day, &self.domain, self.nonce)
    }

    pub fn referrer_key(&self) -> String {
        keys::referrer_key(&self.domain, self.nonce)
    }

    pub fn pending_key(&self) -> String {
        keys::pending_key(&self.day)
    }
}

/// A session list as stored: element 0 is the referrer, the rest are events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSession {
    pub key: String,
    pub id: String,
    pub elements: Vec<String>,
}

impl RawSession {
    /// Decodes the list. Returns the session and the number of elements that
    /// did not decode as events.
    pub fn decode(&self) -> (Session, usize) {
        let Some((referrer, rest)) = self.elements.split_first() else {
            return (Session::default(), 0);
        };

        let events: Vec<Event> = rest.iter().filter_map(|e| Event::from_wire(e)).collect();
        let skipped = rest.len() - events.len();
        (Session::new(referrer.clone(), events), skipped)
    }
}

/// Every session list of one domain for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDay {
    pub day: String,
    pub domain: String,
    /// Appends counted for the domain when the read started. Zero when the
    /// domain was not pending.
    pub generation: u64,
    pub sessions: Vec<RawSession>,
}

impl RawDay {
    /// Builds the compiled day. Returns it with the count of undecodable
    /// elements across all sessions.
    pub fn assemble(&self) -> (Day, usize) {
        let mut day = Day::new(self.domain.clone(), self.day.clone());
        let mut skipped = 0;
        for raw in &self.sessions {
            let (session, bad) = raw.decode();
            skipped += bad;
            day.insert_session(raw.id.clone(), session);
        }
        (day, skipped)
    }
}

/// Result of [`EphemeralStore::evict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// Session lists deleted and the domain cleared from the pending set.
    Evicted,
    /// Events arrived after the read. Nothing was deleted and the domain
    /// stays pending, so the next compile reads the whole day again.
    Changed,
}

/// Storage for in-progress days.
///
/// Implementations must make [`append_and_len`](Self::append_and_len)
/// indivisible: concurrent appends to one session never lose or duplicate an
/// event and each caller sees a distinct length.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Creates the session list if absent, appends the event, refreshes
    /// lifetimes and bumps the domain's append count in the day's pending set.
    ///
    /// Returns the number of events in the session after the append.
    async fn append_and_len(&self, append: &SessionAppend) -> Result<i64>;

    /// Domains with uncompiled data for `day`, sorted.
    async fn pending_domains(&self, day: &str) -> Result<Vec<String>>;

    /// All session lists of `domain` for `day`, sorted by key, with the
    /// domain's append count read before the lists.
    async fn read_day(&self, day: &str, domain: &str) -> Result<RawDay>;

    /// Deletes the lists of `raw` and clears its domain from the pending set,
    /// but only if no append landed since `raw` was read.
    async fn evict(&self, raw: &RawDay) -> Result<Eviction>;

    async fn ping(&self) -> Result<()>;
}
