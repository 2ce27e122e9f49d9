//! # rq Store
//!
//! Key-value store adapter the rq queue coordinates through.
//!
//! Supports:
//! - Redis (for production, shared by every process on every host)
//! - In-memory (for testing, shared by clones within one process)
//!
//! Only store primitives live here: list push/pop, blocking multi-key pop,
//! hashes, sorted sets, conditional creation, TTLs and existence checks.

pub mod backend;
pub mod memory;
pub mod redis_store;

pub use backend::{StoreBackend, StoreError};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
