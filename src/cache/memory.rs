use crate::cache::StorageDriver;
use crate::LogoKitError;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct MemoryEntry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Process-local map from key to value.
///
/// Expired entries are dropped lazily on read. There is no size bound; TTL is
/// the only thing that reclaims memory.
#[derive(Default)]
pub struct MemoryDriver {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl StorageDriver for MemoryDriver {
    fn name(&self) -> &str {
        crate::config::MEMORY_DRIVER
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, LogoKitError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Re-check under the write lock; a concurrent set may have refreshed it.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
            tracing::trace!(key, "Dropped expired memory entry");
        }
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl_seconds: u64) -> Result<(), LogoKitError> {
        // A TTL past the clock's range is treated as no expiry.
        let expires_at = (ttl_seconds > 0)
            .then(|| Instant::now().checked_add(Duration::from_secs(ttl_seconds)))
            .flatten();
        self.entries
            .write()
            .await
            .insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), LogoKitError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), LogoKitError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), LogoKitError> {
        self.entries.write().await.retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let driver = MemoryDriver::new();
        driver.set("k", Bytes::from_static(b"logo"), 60).await.unwrap();
        assert_eq!(driver.get("k").await.unwrap().unwrap(), Bytes::from_static(b"logo"));
        assert!(driver.get("other").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_absent_and_removed() {
        let driver = MemoryDriver::new();
        driver.set("k", Bytes::from_static(b"v"), 1).await.unwrap();
        tokio::time::advance(Duration::from_millis(1100)).await;

        assert!(driver.get("k").await.unwrap().is_none());
        assert!(driver.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_never_expires() {
        let driver = MemoryDriver::new();
        driver.set("k", Bytes::from_static(b"v"), 0).await.unwrap();
        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert!(driver.get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn huge_ttl_does_not_overflow() {
        let driver = MemoryDriver::new();
        driver.set("k", Bytes::from_static(b"v"), u64::MAX).await.unwrap();
        assert_eq!(driver.get("k").await.unwrap().unwrap(), Bytes::from_static(b"v"));
    }

    #[tokio::test]
    async fn clear_prefix_keeps_other_namespaces() {
        let driver = MemoryDriver::new();
        driver.set("optimized:a", Bytes::from_static(b"1"), 0).await.unwrap();
        driver.set("thumbnails:a", Bytes::from_static(b"2"), 0).await.unwrap();

        driver.clear_prefix("optimized:").await.unwrap();
        assert!(driver.get("optimized:a").await.unwrap().is_none());
        assert!(driver.get("thumbnails:a").await.unwrap().is_some());

        driver.delete("thumbnails:a").await.unwrap();
        assert!(driver.is_empty().await);
    }
}
