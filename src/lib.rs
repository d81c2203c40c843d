use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

pub mod cache;
pub mod config;
pub mod delivery;
pub mod metrics;
pub mod pipeline;
pub mod transform;

use crate::cache::{CacheEvents, CacheService, DriverRegistry, FanoutEvents, TracingEvents};
use crate::config::LogoKitConfig;
use crate::delivery::{DeliveryRegistry, RemoteAsset, UploadOptions, UrlOptions};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pipeline::{Derivative, Pipeline};
use crate::transform::params::TransformOptions;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LogoKitError {
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("Driver error: {0}")]
    DriverError(String),
    #[error("Transformation error: {0}")]
    TransformError(String),
    #[error("Delivery provider not found: {0}")]
    ProviderNotFound(String),
    #[error("Upload error: {0}")]
    UploadError(String),
    #[error("Purge error: {0}")]
    PurgeError(String),
    #[error("Unknown cache strategy: {0}")]
    UnknownStrategy(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for LogoKitError {
    fn from(e: config::ConfigError) -> Self {
        LogoKitError::ConfigError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LogoKitError>;

/// Entry point used by the upload and serving handlers.
///
/// Owns the driver registry, the cache service, the delivery providers and
/// the transformation pipeline. Build it once per process.
pub struct LogoKit {
    drivers: DriverRegistry,
    cache: Arc<CacheService>,
    delivery: Arc<DeliveryRegistry>,
    pipeline: Pipeline,
    metrics: Arc<Metrics>,
}

impl LogoKit {
    pub fn from_config(config: &LogoKitConfig) -> Result<Self> {
        Self::with_events(config, Vec::new())
    }

    /// Like [`LogoKit::from_config`], with extra hit/miss/error hooks that run
    /// after the built-in logging and metrics.
    pub fn with_events(config: &LogoKitConfig, hooks: Vec<Arc<dyn CacheEvents>>) -> Result<Self> {
        config.validate()?;

        let drivers = DriverRegistry::from_config(&config.cache)?;
        let metrics = Arc::new(Metrics::new());
        let mut events: Vec<Arc<dyn CacheEvents>> = vec![Arc::new(TracingEvents), metrics.clone()];
        events.extend(hooks);

        let cache = Arc::new(CacheService::new(&config.cache, &drivers, Arc::new(FanoutEvents(events)))?);
        let delivery = Arc::new(DeliveryRegistry::from_config(&config.delivery));
        Ok(Self::from_parts(drivers, cache, delivery, config, metrics))
    }

    /// Assembles the facade from pre-built parts, e.g. substitute drivers or
    /// providers in tests.
    pub fn from_parts(
        drivers: DriverRegistry,
        cache: Arc<CacheService>,
        delivery: Arc<DeliveryRegistry>,
        config: &LogoKitConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let uploads = (!delivery.is_empty()).then(|| delivery.clone());
        let pipeline = Pipeline::new(cache.clone(), uploads, config.transform.clone(), metrics.clone());
        Self { drivers, cache, delivery, pipeline, metrics }
    }

    pub async fn optimize_buffer(&self, source: Bytes, options: &TransformOptions, upload: bool) -> Result<Derivative> {
        self.pipeline.optimize(source, options, upload).await
    }

    pub async fn generate_thumbnail(&self, source: Bytes, options: &TransformOptions, upload: bool) -> Result<Derivative> {
        self.pipeline.thumbnail(source, options, upload).await
    }

    pub async fn generate_responsive_images(
        &self,
        source: Bytes,
        options: &TransformOptions,
        upload: bool,
    ) -> Result<Vec<Derivative>> {
        self.pipeline.responsive_set(source, options, upload).await
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.pipeline.clear_cache().await
    }

    pub fn get_cdn_url(&self, path: &str, options: Option<&UrlOptions>, provider: Option<&str>) -> Result<String> {
        self.delivery.get_url(path, options, provider)
    }

    pub async fn purge_cdn_cache(&self, paths: &[String], provider: Option<&str>) -> Result<()> {
        self.delivery.purge_cache(paths, provider).await
    }

    /// Direct upload. Unlike the pipeline's opportunistic upload, failures
    /// are returned to the caller.
    pub async fn upload_image(&self, bytes: Bytes, options: &UploadOptions, provider: Option<&str>) -> Result<RemoteAsset> {
        let result = self.delivery.upload_image(bytes, options, provider).await;
        self.metrics.record_upload(result.is_ok());
        result
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }
}
