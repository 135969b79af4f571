//! Event, session and compiled record types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Error, Result};

/// A single recorded action inside a session.
///
/// Serializes untagged so compiled days keep the compact
/// `["/page", 5, "/other"]` document shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    /// A page view, identified by its normalized path and query signature.
    Page(String),
    /// A custom conversion score, always at least 1.
    Points(u32),
}

impl Event {
    const PAGE_TAG: char = 'p';
    const POINTS_TAG: char = 'n';

    /// Builds the event for one pixel hit.
    ///
    /// An absent or empty points parameter means a page view. A present one
    /// must be an integer of at least 1.
    pub fn from_request(page: String, points: Option<&str>) -> Result<Self> {
        match points.map(str::trim).filter(|p| !p.is_empty()) {
            None => Ok(Self::Page(page)),
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n >= 1 => Ok(Self::Points(n)),
                _ => Err(Error::client_input(format!(
                    "points must be an integer >= 1, got {raw:?}"
                ))),
            },
        }
    }

    /// Score contributed by this event: its value for points, 1 for a page.
    pub fn score(&self) -> u64 {
        match self {
            Self::Page(_) => 1,
            Self::Points(n) => u64::from(*n),
        }
    }

    pub fn is_page(&self) -> bool {
        matches!(self, Self::Page(_))
    }

    /// Encodes the event as a single ephemeral list element.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Page(page) => format!("{}{}", Self::PAGE_TAG, page),
            Self::Points(n) => format!("{}{}", Self::POINTS_TAG, n),
        }
    }

    /// Decodes an ephemeral list element. Returns `None` for anything that
    /// was not written by [`Event::to_wire`].
    pub fn from_wire(raw: &str) -> Option<Self> {
        let mut chars = raw.chars();
        match chars.next()? {
            Self::PAGE_TAG => Some(Self::Page(chars.as_str().to_string())),
            Self::POINTS_TAG => chars
                .as_str()
                .parse::<u32>()
                .ok()
                .filter(|n| *n >= 1)
                .map(Self::Points),
            _ => None,
        }
    }
}

/// Events from one visitor within one calendar day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// First-seen referrer; empty means direct traffic.
    pub referrer: String,
    pub events: Vec<Event>,
}

impl Session {
    pub fn new(referrer: impl Into<String>, events: Vec<Event>) -> Self {
        Self {
            referrer: referrer.into(),
            events,
        }
    }

    /// A bounce is a session whose only event is a page view.
    ///
    /// This single rule backs day stats, the live today view and the
    /// monthly reducer.
    pub fn is_bounce(&self) -> bool {
        matches!(self.events.as_slice(), [Event::Page(_)])
    }

    pub fn pageviews(&self) -> u64 {
        self.events.iter().filter(|e| e.is_page()).count() as u64
    }

    pub fn score(&self) -> u64 {
        self.events.iter().map(Event::score).sum()
    }
}

/// Aggregate counters over a set of sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub sessions: u64,
    pub bounces: u64,
    pub pageviews: u64,
    pub score: u64,
}

impl Stats {
    /// Computes stats over sessions, ignoring sessions without events.
    pub fn from_sessions<'a>(sessions: impl IntoIterator<Item = &'a Session>) -> Self {
        let mut stats = Self::default();
        for session in sessions {
            stats.add_session(session);
        }
        stats
    }

    pub fn add_session(&mut self, session: &Session) {
        if session.events.is_empty() {
            return;
        }
        self.sessions += 1;
        self.pageviews += session.pageviews();
        self.score += session.score();
        if session.is_bounce() {
            self.bounces += 1;
        }
    }

    pub fn merge(&mut self, other: &Stats) {
        self.sessions += other.sessions;
        self.bounces += other.bounces;
        self.pageviews += other.pageviews;
        self.score += other.score;
    }

    pub fn is_zero(&self) -> bool {
        self.sessions == 0 && self.pageviews == 0
    }

    /// Bounce rate scaled by 10000, rounded half up. Zero without sessions.
    pub fn bounce_rate(&self) -> u32 {
        scaled_rate(self.bounces, self.sessions)
    }
}

/// `round(10000 * part / whole)` in integer arithmetic.
pub fn scaled_rate(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    let scale = u128::from(crate::limits::BOUNCE_RATE_SCALE);
    let rate = (2 * scale * u128::from(part) + u128::from(whole)) / (2 * u128::from(whole));
    rate as u32
}

/// All sessions of one domain for one day, as persisted by the daily compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Day {
    pub domain: String,
    /// `YYYYMMDD`
    pub day: String,
    /// Session id (the visitor nonce) to session.
    pub sessions: BTreeMap<String, Session>,
}

impl Day {
    pub fn new(domain: impl Into<String>, day: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            day: day.into(),
            sessions: BTreeMap::new(),
        }
    }

    /// Adds a session unless it has no events.
    pub fn insert_session(&mut self, id: impl Into<String>, session: Session) {
        if !session.events.is_empty() {
            self.sessions.insert(id.into(), session);
        }
    }

    /// True when no session carries an event. Such days are never persisted.
    pub fn is_empty(&self) -> bool {
        self.sessions.values().all(|s| s.events.is_empty())
    }

    pub fn stats(&self) -> Stats {
        Stats::from_sessions(self.sessions.values())
    }

    /// The month (`YYYYMM`) this day belongs to.
    pub fn month(&self) -> &str {
        self.day.get(..6).unwrap_or(&self.day)
    }
}

/// An `(address, count)` pair for display and for the bounded top lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = "a")]
    pub address: String,
    #[serde(rename = "c")]
    pub count: u64,
}

impl Entry {
    pub const DIRECT: &'static str = "<direct>";

    pub fn new(address: impl Into<String>, count: u64) -> Self {
        Self {
            address: address.into(),
            count,
        }
    }

    /// Address for display: direct traffic has no referrer.
    pub fn display_address(&self) -> &str {
        if self.address.is_empty() {
            Self::DIRECT
        } else {
            &self.address
        }
    }
}

/// A month of days for one domain, reduced to bounded aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Month {
    pub domain: String,
    /// `YYYYMM`
    pub month: String,
    pub total_sessions: u64,
    pub total_pageviews: u64,
    pub total_score: u64,
    pub bounces: u64,
    /// Bounce rate scaled by 10000 (43.78% is 4378).
    pub bounce_rate: u32,
    pub top_pages: Vec<Entry>,
    pub top_referrers: Vec<Entry>,
    pub top_referrer_scores: Vec<Entry>,
}

impl Month {
    /// A month with no traffic, used to fill gaps in a series.
    pub fn empty(domain: impl Into<String>, month: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            month: month.into(),
            total_sessions: 0,
            total_pageviews: 0,
            total_score: 0,
            bounces: 0,
            bounce_rate: 0,
            top_pages: Vec::new(),
            top_referrers: Vec::new(),
            top_referrer_scores: Vec::new(),
        }
    }

    pub fn stats(&self) -> Stats {
        Stats {
            sessions: self.total_sessions,
            bounces: self.bounces,
            pageviews: self.total_pageviews,
            score: self.total_score,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total_sessions == 0 && self.total_pageviews == 0
    }
}

/// Query parameters accepted by the tracking pixel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PixelParams {
    /// Referrer of the visit, as seen by the tracking script.
    #[validate(length(max = 2048))]
    pub r: Option<String>,
    /// Points for a conversion event.
    #[validate(length(max = 10))]
    pub p: Option<String>,
    /// Session token when cookies are unavailable.
    #[validate(length(max = 128))]
    pub s: Option<String>,
}
