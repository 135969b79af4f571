//! Mock implementations for testing.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ephemeral_store::{EphemeralStore, Eviction, MemoryStore, RawDay, SessionAppend};
use tracking_core::Result;

/// Ephemeral store that counts calls before delegating to a [`MemoryStore`].
///
/// Lets tests check that one pixel hit costs exactly one append.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryStore,
    appends: AtomicUsize,
    reads: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EphemeralStore for CountingStore {
    async fn append_and_len(&self, append: &SessionAppend) -> Result<i64> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.inner.append_and_len(append).await
    }

    async fn pending_domains(&self, day: &str) -> Result<Vec<String>> {
        self.inner.pending_domains(day).await
    }

    async fn read_day(&self, day: &str, domain: &str) -> Result<RawDay> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_day(day, domain).await
    }

    async fn evict(&self, raw: &RawDay) -> Result<Eviction> {
        self.inner.evict(raw).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}
