pub mod bunny;
pub mod cloudflare;
pub mod signing;

pub use bunny::BunnyProvider;
pub use cloudflare::CloudflareProvider;

use crate::config::{DeliveryConfig, ImageFormat};
use crate::transform::params::{FitMode, TransformOptions};
use crate::transform::{probe, ImageVariant};
use crate::LogoKitError;
use bytes::Bytes;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A derivative published to a delivery provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteAsset {
    pub url: String,
    /// Provider handle; keep it to purge the asset later.
    pub public_id: String,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub size_bytes: usize,
}

/// What to publish and how to describe it to the provider.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Remote path, e.g. `logos/<key>.webp`.
    pub path: String,
    pub content_type: mime::Mime,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// Transform that produced the bytes, forwarded as metadata.
    pub transform: TransformOptions,
}

impl UploadOptions {
    pub fn for_variant(path: impl Into<String>, variant: &ImageVariant, transform: &TransformOptions) -> Self {
        Self {
            path: path.into(),
            content_type: variant.format.mime(),
            width: variant.width,
            height: variant.height,
            format: variant.format,
            transform: transform.clone(),
        }
    }

    /// Describes already-encoded bytes by reading their headers.
    pub fn probe(path: impl Into<String>, bytes: &[u8]) -> Result<Self, LogoKitError> {
        let (width, height, format) = probe(bytes)?;
        Ok(Self {
            path: path.into(),
            content_type: format.mime(),
            width,
            height,
            format,
            transform: TransformOptions::default(),
        })
    }

    fn remote_asset(&self, url: String, public_id: String, size_bytes: usize) -> RemoteAsset {
        RemoteAsset {
            url,
            public_id,
            width: self.width,
            height: self.height,
            format: self.format,
            size_bytes,
        }
    }
}

/// Edge transformation parameters encoded into delivery URLs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrlOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<ImageFormat>,
    pub quality: Option<u8>,
    pub fit: Option<FitMode>,
    /// Device pixel ratio.
    pub dpr: Option<f32>,
    /// Provider-specific flags passed through verbatim.
    pub extra: BTreeMap<String, String>,
}

impl UrlOptions {
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(w) = self.width { pairs.push(("width".to_string(), w.to_string())); }
        if let Some(h) = self.height { pairs.push(("height".to_string(), h.to_string())); }
        if let Some(f) = self.format { pairs.push(("format".to_string(), f.to_string())); }
        if let Some(q) = self.quality { pairs.push(("quality".to_string(), q.to_string())); }
        if let Some(fit) = self.fit { pairs.push(("fit".to_string(), fit.to_string())); }
        if let Some(dpr) = self.dpr { pairs.push(("dpr".to_string(), dpr.to_string())); }
        pairs.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }
}

/// Joins base and path and appends `pairs` as a query string. The path is
/// inserted unmodified.
pub(crate) fn build_url(base: &str, path: &str, pairs: &[(String, String)]) -> String {
    let mut url = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    if !pairs.is_empty() {
        url.push('?');
        url.push_str(&serde_urlencoded::to_string(pairs).unwrap_or_default());
    }
    url
}

/// Truncates a provider error body for inclusion in error messages.
pub(crate) fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    let body: String = body.chars().take(512).collect();
    format!("status {}: {}", status, body)
}

/// One remote delivery service.
#[async_trait::async_trait]
pub trait DeliveryProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn upload(&self, bytes: Bytes, options: &UploadOptions) -> Result<RemoteAsset, LogoKitError>;

    /// Pure string building; never touches the network.
    fn url(&self, path: &str, options: Option<&UrlOptions>) -> String;

    /// Invalidates previously published paths. Any non-2xx answer is an error.
    async fn purge(&self, paths: &[String]) -> Result<(), LogoKitError>;
}

/// Enabled providers by name, with one default.
pub struct DeliveryRegistry {
    providers: HashMap<String, Arc<dyn DeliveryProvider>>,
    default_provider: String,
}

impl DeliveryRegistry {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self { providers: HashMap::new(), default_provider: default_provider.into() }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        let client = reqwest::Client::new();
        let mut registry = Self::new(config.default_provider.clone());
        if let Some(cf) = config.cloudflare.as_ref().filter(|c| c.enabled) {
            registry.register(Arc::new(CloudflareProvider::new(client.clone(), cf.clone())));
        }
        if let Some(bunny) = config.bunny.as_ref().filter(|c| c.enabled) {
            registry.register(Arc::new(BunnyProvider::new(client.clone(), bunny.clone())));
        }
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn DeliveryProvider>) -> &mut Self {
        tracing::info!(provider = provider.name(), "Delivery provider registered");
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider(&self, name: Option<&str>) -> Result<Arc<dyn DeliveryProvider>, LogoKitError> {
        let name = name.unwrap_or(&self.default_provider);
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LogoKitError::ProviderNotFound(name.to_string()))
    }

    pub async fn upload_image(
        &self,
        bytes: Bytes,
        options: &UploadOptions,
        provider: Option<&str>,
    ) -> Result<RemoteAsset, LogoKitError> {
        let provider = self.provider(provider)?;
        let asset = provider.upload(bytes, options).await?;
        tracing::info!(provider = provider.name(), public_id = %asset.public_id, "Uploaded asset");
        Ok(asset)
    }

    pub fn get_url(
        &self,
        path: &str,
        options: Option<&UrlOptions>,
        provider: Option<&str>,
    ) -> Result<String, LogoKitError> {
        Ok(self.provider(provider)?.url(path, options))
    }

    pub async fn purge_cache(&self, paths: &[String], provider: Option<&str>) -> Result<(), LogoKitError> {
        let provider = self.provider(provider)?;
        if paths.is_empty() {
            return Ok(());
        }
        provider.purge(paths).await?;
        tracing::info!(provider = provider.name(), count = paths.len(), "Purged delivery paths");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_keeps_path_and_encodes_options() {
        let opts = UrlOptions {
            width: Some(100),
            format: Some(ImageFormat::Webp),
            ..Default::default()
        };
        let url = build_url("https://cdn.example.com/", "logos/abc.png", &opts.query_pairs());
        assert_eq!(url, "https://cdn.example.com/logos/abc.png?width=100&format=webp");
    }

    #[test]
    fn url_without_options_has_no_query() {
        assert_eq!(build_url("https://cdn.example.com", "/a.png", &[]), "https://cdn.example.com/a.png");
    }

    #[test]
    fn passthrough_flags_are_escaped() {
        let mut extra = BTreeMap::new();
        extra.insert("background".to_string(), "#fff".to_string());
        let opts = UrlOptions { dpr: Some(2.0), fit: Some(FitMode::Contain), extra, ..Default::default() };
        let url = build_url("https://cdn.example.com", "a.png", &opts.query_pairs());
        assert!(url.ends_with("?fit=contain&dpr=2&background=%23fff"));
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let registry = DeliveryRegistry::new("cloudflare");
        assert!(matches!(
            registry.get_url("a.png", None, None),
            Err(LogoKitError::ProviderNotFound(name)) if name == "cloudflare"
        ));
        assert!(matches!(
            registry.get_url("a.png", None, Some("bunny")),
            Err(LogoKitError::ProviderNotFound(_))
        ));
    }
}
