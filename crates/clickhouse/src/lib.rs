//! ClickHouse persistence for compiled days and monthly rollups.

pub mod client;
pub mod config;
pub mod insert;
pub mod memory;
pub mod query;
pub mod schema;
pub mod store;

pub use client::*;
pub use config::*;
pub use memory::MemoryDurableStore;
pub use store::*;
