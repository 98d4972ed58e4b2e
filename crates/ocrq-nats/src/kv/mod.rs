//! Typed NATS Key-Value buckets.
//!
//! - `KvStore<K, V, B>`: type-safe key-value operations
//! - `KvKey`: key formatting and parsing
//! - `KvBucket`: bucket name, description and TTL

mod kv_bucket;
mod kv_key;
mod kv_store;

pub use kv_bucket::{JobsBucket, KvBucket};
pub use kv_key::{JobKey, KvKey};
pub use kv_store::{KvEntry, KvStore, KvValue};
