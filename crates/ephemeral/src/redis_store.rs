//! Redis-backed store.
//!
//! The append and the eviction each run as one Lua script, so Redis executes
//! them without interleaving other commands.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::{debug, info};
use tracking_core::{Error, Result};

use crate::config::RedisConfig;
use crate::keys;
use crate::store::{EphemeralStore, Eviction, RawDay, RawSession, SessionAppend};

/// KEYS: session list, nonce referrer, day pending hash.
/// ARGV: event, fallback referrer, continuing flag, session ttl, referrer ttl, domain.
const APPEND_SCRIPT: &str = r#"
local n = redis.call('LLEN', KEYS[1])
if n == 0 then
  local ref = false
  if ARGV[3] == '1' then
    ref = redis.call('GET', KEYS[2])
  end
  if not ref then
    ref = ARGV[2]
  end
  redis.call('RPUSH', KEYS[1], ref)
  redis.call('SET', KEYS[2], ref, 'EX', ARGV[5])
else
  redis.call('EXPIRE', KEYS[2], ARGV[5])
end
n = redis.call('RPUSH', KEYS[1], ARGV[1])
redis.call('EXPIRE', KEYS[1], ARGV[4])
redis.call('HINCRBY', KEYS[3], ARGV[6], 1)
redis.call('EXPIRE', KEYS[3], ARGV[4])
return n - 1
"#;

/// KEYS: day pending hash, then the session lists read.
/// ARGV: domain, append count seen by the read.
const EVICT_SCRIPT: &str = r#"
local seen = redis.call('HGET', KEYS[1], ARGV[1]) or '0'
if seen ~= ARGV[2] then
  return 0
end
for i = 2, #KEYS do
  redis.call('DEL', KEYS[i])
end
redis.call('HDEL', KEYS[1], ARGV[1])
return 1
"#;

fn store_err(e: redis::RedisError) -> Error {
    Error::ephemeral(e.to_string())
}

pub struct RedisStore {
    conn: ConnectionManager,
    append: Script,
    evict: Script,
    config: RedisConfig,
}

impl RedisStore {
    /// Connects and verifies the server answers.
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str()).map_err(store_err)?;

        let conn = tokio::time::timeout(config.connect_timeout(), client.get_connection_manager())
            .await
            .map_err(|_| {
                Error::ephemeral(format!(
                    "connect timed out after {}ms",
                    config.connect_timeout_ms
                ))
            })?
            .map_err(store_err)?;

        info!(url = %redact(&config.url), "Connected to Redis");

        let store = Self {
            conn,
            append: Script::new(APPEND_SCRIPT),
            evict: Script::new(EVICT_SCRIPT),
            config,
        };
        store.ping().await?;
        Ok(store)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(self.config.scan_count)
                .query_async(&mut conn)
                .await
                .map_err(store_err)?;

            found.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        found.sort();
        found.dedup();
        Ok(found)
    }
}

/// Strips credentials from a connection URL for logging.
fn redact(url: &str) -> String {
    match url.split_once('@') {
        Some((scheme_and_auth, host)) => {
            let scheme = scheme_and_auth.split("://").next().unwrap_or("redis");
            format!("{scheme}://***@{host}")
        }
        None => url.to_string(),
    }
}

#[async_trait]
impl EphemeralStore for RedisStore {
    async fn append_and_len(&self, append: &SessionAppend) -> Result<i64> {
        let mut conn = self.conn.clone();

        let len: i64 = self
            .append
            .key(append.session_key())
            .key(append.referrer_key())
            .key(append.pending_key())
            .arg(append.event.to_wire())
            .arg(&append.referrer)
            .arg(if append.continuing { "1" } else { "0" })
            .arg(self.config.session_ttl_secs)
            .arg(self.config.referrer_ttl_secs)
            .arg(&append.domain)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;

        Ok(len)
    }

    async fn pending_domains(&self, day: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut domains: Vec<String> = conn
            .hkeys(keys::pending_key(day))
            .await
            .map_err(store_err)?;
        domains.sort();
        Ok(domains)
    }

    async fn read_day(&self, day: &str, domain: &str) -> Result<RawDay> {
        // Read before the lists so any later append shows up as a new count.
        let generation: Option<u64> = self
            .conn
            .clone()
            .hget(keys::pending_key(day), domain)
            .await
            .map_err(store_err)?;

        let keys = self.scan_keys(&keys::session_pattern(day, domain)).await?;
        debug!(day, domain, sessions = keys.len(), "Reading session lists");

        let lists: Vec<Vec<String>> = if keys.is_empty() {
            Vec::new()
        } else {
            let mut pipe = redis::pipe();
            for key in &keys {
                pipe.lrange(key, 0, -1);
            }
            let mut conn = self.conn.clone();
            pipe.query_async(&mut conn).await.map_err(store_err)?
        };

        let sessions = keys
            .into_iter()
            .zip(lists)
            .filter_map(|(key, elements)| {
                let id = keys::session_id(&key)?.to_string();
                Some(RawSession { key, id, elements })
            })
            .collect();

        Ok(RawDay {
            day: day.to_string(),
            domain: domain.to_string(),
            generation: generation.unwrap_or(0),
            sessions,
        })
    }

    async fn evict(&self, raw: &RawDay) -> Result<Eviction> {
        let mut invocation = self.evict.key(keys::pending_key(&raw.day));
        for session in &raw.sessions {
            invocation.key(&session.key);
        }
        invocation.arg(&raw.domain).arg(raw.generation);

        let mut conn = self.conn.clone();
        let evicted: i64 = invocation.invoke_async(&mut conn).await.map_err(store_err)?;
        Ok(if evicted == 1 {
            Eviction::Evicted
        } else {
            Eviction::Changed
        })
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
