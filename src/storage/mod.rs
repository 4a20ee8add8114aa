//! Cache backends.
//!
//! - [`redis::RedisStore`]: production shard endpoint
//! - [`memory::InMemoryStore`]: tests and dry runs

pub mod traits;
pub mod redis;
pub mod memory;

pub use traits::{CacheStore, StorageError};
