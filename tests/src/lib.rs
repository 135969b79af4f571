//! Shared harness for the integration tests: the real router over
//! in-memory stores, plus containers for the Redis and ClickHouse suites.

pub mod containers;
pub mod fixtures;
pub mod mocks;
pub mod setup;
