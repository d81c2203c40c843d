use crate::cache::{derive_key, CacheService};
use crate::config::{TransformConfig, OPTIMIZED_STRATEGY, THUMBNAILS_STRATEGY};
use crate::delivery::{DeliveryRegistry, RemoteAsset, UploadOptions};
use crate::metrics::Metrics;
use crate::transform::params::TransformOptions;
use crate::transform::{self, ImageVariant};
use crate::LogoKitError;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type InFlight = Shared<BoxFuture<'static, Result<(ImageVariant, bool), LogoKitError>>>;

/// Result of one pipeline call.
#[derive(Debug, Clone)]
pub struct Derivative {
    pub variant: ImageVariant,
    pub cache_key: String,
    pub from_cache: bool,
    pub remote: Option<RemoteAsset>,
}

impl Derivative {
    pub fn width(&self) -> u32 {
        self.variant.width
    }

    pub fn height(&self) -> u32 {
        self.variant.height
    }
}

/// Cache-first transformation pipeline.
///
/// Concurrent calls for the same key share one computation. The map entry is
/// dropped by the computation itself once it settles.
pub struct Pipeline {
    cache: Arc<CacheService>,
    delivery: Option<Arc<DeliveryRegistry>>,
    config: Arc<TransformConfig>,
    metrics: Arc<Metrics>,
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
}

impl Pipeline {
    pub fn new(
        cache: Arc<CacheService>,
        delivery: Option<Arc<DeliveryRegistry>>,
        config: TransformConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cache,
            delivery,
            config: Arc::new(config),
            metrics,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    pub async fn optimize(
        &self,
        source: Bytes,
        options: &TransformOptions,
        upload: bool,
    ) -> Result<Derivative, LogoKitError> {
        self.run(source, options, OPTIMIZED_STRATEGY, upload).await
    }

    /// `optimize` with the configured thumbnail preset and its own strategy.
    /// Format, background and crop from `options` are kept.
    pub async fn thumbnail(
        &self,
        source: Bytes,
        options: &TransformOptions,
        upload: bool,
    ) -> Result<Derivative, LogoKitError> {
        let preset = &self.config.thumbnail;
        let options = TransformOptions {
            width: Some(preset.width),
            height: Some(preset.height),
            quality: Some(preset.quality),
            fit: Some(preset.fit),
            max_width: None,
            max_height: None,
            ..options.clone()
        };
        self.run(source, &options, THUMBNAILS_STRATEGY, upload).await
    }

    /// One derivative per configured width, each cached under its own key.
    pub async fn responsive_set(
        &self,
        source: Bytes,
        options: &TransformOptions,
        upload: bool,
    ) -> Result<Vec<Derivative>, LogoKitError> {
        let calls = self.config.responsive_sizes.iter().map(|&size| {
            let options = TransformOptions { height: None, ..options.clone() }.with_width(size);
            let source = source.clone();
            async move { self.run(source, &options, OPTIMIZED_STRATEGY, upload).await }
        });
        futures::future::try_join_all(calls).await
    }

    /// Clears both pipeline strategies. Remote assets are left alone.
    pub async fn clear_cache(&self) -> Result<(), LogoKitError> {
        self.cache.clear(Some(OPTIMIZED_STRATEGY)).await?;
        self.cache.clear(Some(THUMBNAILS_STRATEGY)).await
    }

    async fn run(
        &self,
        source: Bytes,
        options: &TransformOptions,
        strategy: &'static str,
        upload: bool,
    ) -> Result<Derivative, LogoKitError> {
        options.validate()?;
        if source.len() > self.config.max_input_size {
            return Err(LogoKitError::InvalidOptions(format!(
                "source is {} bytes, limit is {}",
                source.len(),
                self.config.max_input_size
            )));
        }
        if self.cache.is_enabled() {
            // Fail fast on a misconfigured strategy before spawning work.
            self.cache.strategy(Some(strategy))?;
        }

        let key = derive_key(&source, options)?;
        let (variant, from_cache) = self.coalesced(&key, source, options, strategy).await?;

        let remote = if upload { self.publish(&key, &variant, options).await } else { None };

        Ok(Derivative { variant, cache_key: key, from_cache, remote })
    }

    async fn coalesced(
        &self,
        key: &str,
        source: Bytes,
        options: &TransformOptions,
        strategy: &'static str,
    ) -> Result<(ImageVariant, bool), LogoKitError> {
        let slot = format!("{}:{}", strategy, key);
        let shared = {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| LogoKitError::TransformError("in-flight map poisoned".into()))?;
            match in_flight.get(&slot) {
                Some(existing) => {
                    tracing::debug!(key, strategy, "Joining in-flight transform");
                    existing.clone()
                }
                None => {
                    let fut = compute(
                        self.cache.clone(),
                        self.config.clone(),
                        self.metrics.clone(),
                        key.to_string(),
                        source,
                        options.clone(),
                        strategy,
                    );
                    let map = self.in_flight.clone();
                    let done_slot = slot.clone();
                    let fut = async move {
                        let result = fut.await;
                        if let Ok(mut map) = map.lock() {
                            map.remove(&done_slot);
                        }
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(slot, fut.clone());
                    fut
                }
            }
        };
        shared.await
    }

    async fn publish(&self, key: &str, variant: &ImageVariant, options: &TransformOptions) -> Option<RemoteAsset> {
        let Some(delivery) = &self.delivery else {
            tracing::warn!(key, "Upload requested but no delivery provider is configured");
            return None;
        };

        let path = format!(
            "{}/{}.{}",
            self.config.upload_folder.trim_matches('/'),
            key,
            variant.format.extension()
        );
        let upload_options = UploadOptions::for_variant(path, variant, options);
        match delivery.upload_image(variant.bytes.clone(), &upload_options, None).await {
            Ok(asset) => {
                self.metrics.record_upload(true);
                Some(asset)
            }
            Err(error) => {
                self.metrics.record_upload(false);
                tracing::warn!(key, %error, "Remote upload failed, returning local variant");
                None
            }
        }
    }
}

async fn compute(
    cache: Arc<CacheService>,
    config: Arc<TransformConfig>,
    metrics: Arc<Metrics>,
    key: String,
    source: Bytes,
    options: TransformOptions,
    strategy: &'static str,
) -> Result<(ImageVariant, bool), LogoKitError> {
    if let Some(bytes) = cache.get(&key, Some(strategy)).await? {
        match ImageVariant::from_encoded(bytes) {
            Ok(variant) => return Ok((variant, true)),
            Err(error) => tracing::warn!(%key, %error, "Cached entry unreadable, recomputing"),
        }
    }

    let start = std::time::Instant::now();
    let variant = tokio::task::spawn_blocking(move || transform::apply(&source, &options, &config))
        .await
        .map_err(|e| LogoKitError::TransformError(e.to_string()))??;
    metrics.record_transform();
    tracing::info!(
        %key,
        strategy,
        width = variant.width,
        height = variant.height,
        format = %variant.format,
        size_bytes = variant.size_bytes,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Transformed image"
    );

    cache.set(&key, variant.bytes.clone(), Some(strategy)).await?;
    Ok((variant, false))
}
