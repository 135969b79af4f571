//! Ephemeral per-day session storage.
//!
//! Every pixel hit lands here through one atomic [`EphemeralStore::append_and_len`]
//! call. The daily compiler later drains a day into the durable store.

pub mod config;
pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use config::RedisConfig;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::*;
