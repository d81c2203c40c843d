use crate::cache::{DriverRegistry, StorageDriver};
use crate::config::CacheConfig;
use crate::LogoKitError;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// Hooks invoked by the cache service. All methods default to no-ops.
pub trait CacheEvents: Send + Sync {
    fn on_hit(&self, _key: &str) {}
    fn on_miss(&self, _key: &str) {}
    fn on_error(&self, _error: &LogoKitError) {}
}

/// Logs every cache event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl CacheEvents for TracingEvents {
    fn on_hit(&self, key: &str) {
        tracing::debug!(key, "Cache hit");
    }

    fn on_miss(&self, key: &str) {
        tracing::debug!(key, "Cache miss");
    }

    fn on_error(&self, error: &LogoKitError) {
        tracing::warn!(%error, "Cache error");
    }
}

/// Forwards each event to every inner hook, in order.
#[derive(Default, Clone)]
pub struct FanoutEvents(pub Vec<Arc<dyn CacheEvents>>);

impl CacheEvents for FanoutEvents {
    fn on_hit(&self, key: &str) {
        self.0.iter().for_each(|e| e.on_hit(key));
    }

    fn on_miss(&self, key: &str) {
        self.0.iter().for_each(|e| e.on_miss(key));
    }

    fn on_error(&self, error: &LogoKitError) {
        self.0.iter().for_each(|e| e.on_error(error));
    }
}

/// A resolved strategy: which driver, which key prefix, which TTL.
#[derive(Clone)]
pub struct CacheStrategy {
    pub name: String,
    pub driver: Arc<dyn StorageDriver>,
    pub prefix: String,
    pub ttl_seconds: u64,
}

impl CacheStrategy {
    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

/// Strategy-indexed front for the storage drivers.
///
/// Driver failures are reported through [`CacheEvents::on_error`] and then
/// swallowed: `get` turns them into a miss, the other operations into a
/// no-op. The only errors a caller ever sees are configuration errors such as
/// an unknown strategy name.
pub struct CacheService {
    enabled: bool,
    default_strategy: String,
    strategies: HashMap<String, CacheStrategy>,
    events: Arc<dyn CacheEvents>,
}

impl CacheService {
    /// Resolves every configured strategy against `registry`.
    ///
    /// # Errors
    /// `LogoKitError::ConfigError` when a strategy names a driver that is not
    /// registered (typically because it is disabled).
    pub fn new(
        config: &CacheConfig,
        registry: &DriverRegistry,
        events: Arc<dyn CacheEvents>,
    ) -> Result<Self, LogoKitError> {
        let mut strategies = HashMap::new();
        if config.enabled {
            for (name, strategy) in &config.strategies {
                let driver = registry.get(&strategy.driver).ok_or_else(|| {
                    LogoKitError::ConfigError(format!(
                        "strategy '{}' uses driver '{}' which is not enabled",
                        name, strategy.driver
                    ))
                })?;
                strategies.insert(
                    name.clone(),
                    CacheStrategy {
                        name: name.clone(),
                        driver,
                        prefix: strategy.prefix.clone(),
                        ttl_seconds: strategy.ttl_seconds,
                    },
                );
            }
            if !strategies.contains_key(&config.default_strategy) {
                return Err(LogoKitError::UnknownStrategy(config.default_strategy.clone()));
            }
        }

        Ok(Self {
            enabled: config.enabled,
            default_strategy: config.default_strategy.clone(),
            strategies,
            events,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn strategy(&self, name: Option<&str>) -> Result<&CacheStrategy, LogoKitError> {
        let name = name.unwrap_or(&self.default_strategy);
        self.strategies
            .get(name)
            .ok_or_else(|| LogoKitError::UnknownStrategy(name.to_string()))
    }

    fn report(&self, op: &str, strategy: &CacheStrategy, error: LogoKitError) {
        tracing::warn!(
            op,
            strategy = %strategy.name,
            driver = strategy.driver.name(),
            %error,
            "Cache driver failed, continuing without cache"
        );
        self.events.on_error(&error);
    }

    /// Looks `key` up under the strategy. Driver errors read as a miss.
    pub async fn get(&self, key: &str, strategy: Option<&str>) -> Result<Option<Bytes>, LogoKitError> {
        if !self.enabled {
            return Ok(None);
        }
        let strategy = self.strategy(strategy)?;
        let storage_key = strategy.storage_key(key);

        match strategy.driver.get(&storage_key).await {
            Ok(Some(value)) => {
                self.events.on_hit(&storage_key);
                Ok(Some(value))
            }
            Ok(None) => {
                self.events.on_miss(&storage_key);
                Ok(None)
            }
            Err(e) => {
                self.report("get", strategy, e);
                Ok(None)
            }
        }
    }

    pub async fn set(&self, key: &str, value: Bytes, strategy: Option<&str>) -> Result<(), LogoKitError> {
        if !self.enabled {
            return Ok(());
        }
        let strategy = self.strategy(strategy)?;
        if let Err(e) = strategy
            .driver
            .set(&strategy.storage_key(key), value, strategy.ttl_seconds)
            .await
        {
            self.report("set", strategy, e);
        }
        Ok(())
    }

    pub async fn delete(&self, key: &str, strategy: Option<&str>) -> Result<(), LogoKitError> {
        if !self.enabled {
            return Ok(());
        }
        let strategy = self.strategy(strategy)?;
        if let Err(e) = strategy.driver.delete(&strategy.storage_key(key)).await {
            self.report("delete", strategy, e);
        }
        Ok(())
    }

    /// Clears the strategy's entries. Only the strategy's prefix is touched
    /// unless the prefix is empty, in which case the whole driver is cleared.
    pub async fn clear(&self, strategy: Option<&str>) -> Result<(), LogoKitError> {
        if !self.enabled {
            return Ok(());
        }
        let strategy = self.strategy(strategy)?;
        let result = if strategy.prefix.is_empty() {
            strategy.driver.clear().await
        } else {
            strategy.driver.clear_prefix(&strategy.prefix).await
        };
        match result {
            Ok(()) => tracing::info!(strategy = %strategy.name, "Cleared cache strategy"),
            Err(e) => self.report("clear", strategy, e),
        }
        Ok(())
    }
}
