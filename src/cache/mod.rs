pub mod disk;
pub mod key;
pub mod memory;
pub mod redis;
pub mod registry;
pub mod service;

pub use disk::FilesystemDriver;
pub use key::derive_key;
pub use memory::MemoryDriver;
pub use self::redis::RedisDriver;
pub use registry::DriverRegistry;
pub use service::{CacheEvents, CacheService, CacheStrategy, FanoutEvents, TracingEvents};

use crate::LogoKitError;
use bytes::Bytes;

/// Contract shared by every storage backend.
///
/// `get` returning `Ok(None)` means "absent" and is never used to report a
/// failure: I/O, network and metadata problems come back as
/// `LogoKitError::DriverError` so the service can count them separately.
#[async_trait::async_trait]
pub trait StorageDriver: Send + Sync {
    fn name(&self) -> &str;

    /// Get a stored value, treating expired entries as absent.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, LogoKitError>;

    /// Store a value. A `ttl_seconds` of 0 never expires.
    async fn set(&self, key: &str, value: Bytes, ttl_seconds: u64) -> Result<(), LogoKitError>;

    async fn delete(&self, key: &str) -> Result<(), LogoKitError>;

    /// Remove every entry this driver owns.
    async fn clear(&self) -> Result<(), LogoKitError>;

    /// Remove every entry whose key starts with `prefix`.
    async fn clear_prefix(&self, prefix: &str) -> Result<(), LogoKitError>;
}

/// Current wall clock as unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
