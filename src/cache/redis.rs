use crate::cache::StorageDriver;
use crate::config::RedisDriverConfig;
use crate::LogoKitError;
use ::redis::aio::{ConnectionManager, ConnectionManagerConfig};
use ::redis::{AsyncCommands, Client};
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Keys deleted per DEL round trip during clears.
const DELETE_BATCH: usize = 500;

/// Connect attempts per (re)connect. Kept low: a cache call waits on them.
const CONNECT_RETRIES: usize = 1;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Redis-backed driver.
///
/// Every key is stored under the configured namespace and expiry is delegated
/// to Redis (`SET .. EX`). The connection is opened on first use, so a Redis
/// outage at startup surfaces as per-call `DriverError`s rather than a boot
/// failure; a failed first connect is retried on the next call. Once open, the
/// `ConnectionManager` reconnects on its own after the server drops it: the
/// call that hits the dead socket fails, later ones go through. Errors are
/// returned as-is; the cache service decides what to do with them.
pub struct RedisDriver {
    client: Client,
    namespace: String,
    conn: OnceCell<ConnectionManager>,
}

impl RedisDriver {
    pub fn new(config: &RedisDriverConfig) -> Result<Self, LogoKitError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| LogoKitError::ConfigError(format!("Redis client error: {}", e)))?;
        Ok(Self {
            client,
            namespace: config.namespace.clone(),
            conn: OnceCell::new(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    async fn connection(&self) -> Result<ConnectionManager, LogoKitError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                tracing::debug!("Opening redis connection");
                let config = ConnectionManagerConfig::new()
                    .set_number_of_retries(CONNECT_RETRIES)
                    .set_connection_timeout(CONNECT_TIMEOUT);
                self.client
                    .get_connection_manager_with_config(config)
                    .await
                    .map_err(|e| LogoKitError::DriverError(format!("Redis connection error: {}", e)))
            })
            .await?;
        Ok(conn.clone())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, LogoKitError> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = conn
            .keys(pattern)
            .await
            .map_err(|e| LogoKitError::DriverError(format!("Redis KEYS error: {}", e)))?;

        for chunk in keys.chunks(DELETE_BATCH) {
            let _: () = conn
                .del(chunk.to_vec())
                .await
                .map_err(|e| LogoKitError::DriverError(format!("Redis DEL error: {}", e)))?;
        }
        Ok(keys.len())
    }
}

/// Escapes glob metacharacters so a literal prefix can be used in KEYS.
fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait::async_trait]
impl StorageDriver for RedisDriver {
    fn name(&self) -> &str {
        crate::config::REDIS_DRIVER
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, LogoKitError> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn
            .get(self.namespaced(key))
            .await
            .map_err(|e| LogoKitError::DriverError(format!("Redis GET error: {}", e)))?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl_seconds: u64) -> Result<(), LogoKitError> {
        let mut conn = self.connection().await?;
        let key = self.namespaced(key);
        if ttl_seconds > 0 {
            let _: () = conn
                .set_ex(&key, value.as_ref(), ttl_seconds)
                .await
                .map_err(|e| LogoKitError::DriverError(format!("Redis SETEX error: {}", e)))?;
        } else {
            let _: () = conn
                .set(&key, value.as_ref())
                .await
                .map_err(|e| LogoKitError::DriverError(format!("Redis SET error: {}", e)))?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), LogoKitError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(self.namespaced(key))
            .await
            .map_err(|e| LogoKitError::DriverError(format!("Redis DEL error: {}", e)))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), LogoKitError> {
        let removed = self.delete_matching(&format!("{}*", escape_glob(&self.namespace))).await?;
        tracing::info!(removed, namespace = %self.namespace, "Cleared redis namespace");
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), LogoKitError> {
        let pattern = format!("{}*", escape_glob(&self.namespaced(prefix)));
        let removed = self.delete_matching(&pattern).await?;
        tracing::info!(removed, prefix, "Cleared redis prefix");
        Ok(())
    }
}
