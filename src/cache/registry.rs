use crate::cache::{FilesystemDriver, MemoryDriver, RedisDriver, StorageDriver};
use crate::config::CacheConfig;
use crate::LogoKitError;
use std::collections::HashMap;
use std::sync::Arc;

/// Named storage drivers, built once by the process entry point and handed to
/// the cache service.
#[derive(Default, Clone)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn StorageDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates every enabled driver in `config`.
    pub fn from_config(config: &CacheConfig) -> Result<Self, LogoKitError> {
        let mut registry = Self::new();
        if config.memory.enabled {
            registry.register(crate::config::MEMORY_DRIVER, Arc::new(MemoryDriver::new()));
        }
        if config.redis.enabled {
            registry.register(crate::config::REDIS_DRIVER, Arc::new(RedisDriver::new(&config.redis)?));
        }
        if config.filesystem.enabled {
            registry.register(
                crate::config::FILESYSTEM_DRIVER,
                Arc::new(FilesystemDriver::new(&config.filesystem)),
            );
        }
        tracing::info!(drivers = ?registry.names(), "Storage drivers registered");
        Ok(registry)
    }

    /// Adds or replaces a driver under `name`.
    pub fn register(&mut self, name: &str, driver: Arc<dyn StorageDriver>) -> &mut Self {
        self.drivers.insert(name.to_string(), driver);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StorageDriver>> {
        self.drivers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
