//! Store implementations

pub mod memory;
pub mod redis;

pub use memory::{MemoryStore, MemoryStoreConfig};
pub use redis::{RedisStore, RedisStoreConfig};
