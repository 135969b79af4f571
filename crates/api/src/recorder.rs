//! Event recorder: the hot path behind the pixel.
//!
//! One request costs one ephemeral store round trip. Nothing here touches
//! the durable store.

use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use ephemeral_store::{EphemeralStore, SessionAppend};
use telemetry::metrics;
use tracing::{debug, error};
use tracking_core::referrer::{normalize, referrer_host};
use tracking_core::window::format_day;
use tracking_core::{Blacklist, Error, Event, Result, SessionCodec, SessionToken};

/// What happened to one hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// Appended; `offset` is the session's event count afterwards.
    Recorded { offset: i64, new_session: bool },
    /// Referrer is on the denylist; nothing was stored.
    Spam,
    /// The ephemeral store failed; nothing was stored.
    StoreUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Token to hand back to the visitor, if any.
    pub token: Option<String>,
    pub kind: RecordKind,
}

pub struct Recorder {
    ephemeral: Arc<dyn EphemeralStore>,
    codec: SessionCodec,
    blacklist: Arc<Blacklist>,
}

impl Recorder {
    pub fn new(
        ephemeral: Arc<dyn EphemeralStore>,
        codec: SessionCodec,
        blacklist: Arc<Blacklist>,
    ) -> Self {
        Self {
            ephemeral,
            codec,
            blacklist,
        }
    }

    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    /// Records one event for `domain` on the current UTC day.
    pub async fn record_event(
        &self,
        domain: &str,
        referrer: &str,
        event: Event,
        token: Option<&str>,
    ) -> RecordOutcome {
        self.record_event_on(Utc::now().date_naive(), domain, referrer, event, token)
            .await
    }

    /// Records one event on an explicit day.
    ///
    /// `referrer` only matters for a new session, or for a continuing one
    /// whose stored first referrer has expired.
    pub async fn record_event_on(
        &self,
        day: NaiveDate,
        domain: &str,
        referrer: &str,
        event: Event,
        token: Option<&str>,
    ) -> RecordOutcome {
        let start = Instant::now();

        let (session, continuing) = self.resolve_session(token);

        let referrer = match self.screen_referrer(referrer) {
            Ok(referrer) => referrer,
            // Only used if the stored first referrer expired.
            Err(e) if continuing => {
                debug!(domain, error = %e, "Dropping blacklisted fallback referrer");
                String::new()
            }
            Err(e) => {
                metrics().spam_rejected.inc();
                debug!(domain, error = %e, "Neutering session");
                return RecordOutcome {
                    token: Some(self.codec.neutered_token(&mut rand::thread_rng())),
                    kind: RecordKind::Spam,
                };
            }
        };

        let append = SessionAppend {
            day: format_day(day),
            domain: domain.to_string(),
            nonce: session.nonce,
            event,
            referrer,
            continuing,
        };

        let offset = match self.ephemeral.append_and_len(&append).await {
            Ok(offset) => offset,
            Err(e) => {
                metrics().store_errors.inc();
                error!(domain, error = %e, "Failed to record event");
                return RecordOutcome {
                    token: None,
                    kind: RecordKind::StoreUnavailable,
                };
            }
        };

        let m = metrics();
        m.events_recorded.inc();
        if append.event.is_page() {
            m.pageviews_recorded.inc();
        } else {
            m.points_recorded.inc();
        }
        if !continuing {
            m.sessions_started.inc();
        }
        m.record_latency_ms.observe(start.elapsed().as_millis() as u64);

        debug!(
            domain,
            day = %append.day,
            offset,
            new_session = !continuing,
            "Recorded event"
        );

        RecordOutcome {
            token: Some(self.codec.encode(&session.with_offset(offset))),
            kind: RecordKind::Recorded {
                offset,
                new_session: !continuing,
            },
        }
    }

    /// Normalizes a referrer, failing with [`Error::SpamDetected`] when its
    /// host is on the denylist.
    pub fn screen_referrer(&self, raw: &str) -> Result<String> {
        let referrer = normalize(raw);
        if self.blacklist.is_referrer_blacklisted(&referrer) {
            let host = referrer_host(&referrer).unwrap_or_else(|| referrer.clone());
            return Err(Error::spam(host));
        }
        Ok(referrer)
    }

    /// Decodes the visitor's token. Anything unusable starts a new session.
    fn resolve_session(&self, token: Option<&str>) -> (SessionToken, bool) {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(raw) => match self.codec.decode(raw) {
                Ok(session) => (session, true),
                Err(e) => {
                    debug!(error = %e, "Unusable session token, starting a new session");
                    (SessionToken::fresh(&mut rand::thread_rng()), false)
                }
            },
            None => (SessionToken::fresh(&mut rand::thread_rng()), false),
        }
    }
}
