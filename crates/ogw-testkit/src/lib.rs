//! ogw-testkit
//!
//! Deterministic in-memory [`EntityStore`] for unit and scenario tests.
//! No randomness, no network I/O, no database: ids are running counters and
//! every operation is synchronous under one lock.

mod mem_store;

pub use mem_store::MemStore;

/// Tenant name the seeded store answers for.
pub const TEST_DB: &str = "ordergate";

/// Seeded operator credentials.
pub const TEST_LOGIN: &str = "admin";
pub const TEST_PASSWORD: &str = "admin";
