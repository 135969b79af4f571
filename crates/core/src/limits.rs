//! Tunable bounds for sessions, tokens and rollups.
//!
//! TTLs bound how long uncompiled data can live in the ephemeral store even
//! when the daily compiler is late. The top-N size bounds every month record.
//!
//! `PixelParams` repeats the request field limits as literals in its
//! `#[validate]` attributes. Keep both in sync when modifying.

// === Ephemeral lifetimes ===

/// Session list lifetime in seconds (48 hours), refreshed on every write.
pub const SESSION_TTL_SECS: u64 = 48 * 60 * 60;

/// Lifetime of the nonce to first-referrer entry (5 hours).
pub const REFERRER_TTL_SECS: u64 = 5 * 60 * 60;

// === Session identity ===

/// Largest nonce handed out to a new session.
///
/// A 1e9 space keeps birthday collisions negligible across the sessions that
/// are active on one domain in one day.
pub const MAX_NONCE: u32 = 999_999_999;

/// Offset carried by a token before the recorder has appended anything.
pub const NEW_SESSION_OFFSET: i64 = -1;

/// Fourth number of a neutered token handed to spam referrers.
pub const SPAM_MARKER: i64 = 0x5ba4;

/// Maximum accepted token length (chars).
pub const MAX_TOKEN_LEN: usize = 128;

// === Request fields ===

/// Referrer URL max length, matching the HTTP Referer header limit.
pub const MAX_REFERRER_LEN: usize = 2048;

// === Rollups ===

/// Entries kept in each top list of a month record.
pub const TOP_N: usize = 10;

/// Bounce rates are stored as integers scaled by this factor.
pub const BOUNCE_RATE_SCALE: u64 = 10_000;

/// Days older than this are deleted once folded into a month.
pub const DEFAULT_RETENTION_DAYS: u32 = 100;

/// Default cap on sessions returned by referrer grouping.
pub const DEFAULT_SESSION_GROUP_LIMIT: usize = 400;
