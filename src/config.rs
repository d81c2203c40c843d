use crate::transform::params::FitMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_QUALITY: u8 = 80;
pub const DEFAULT_MAX_INPUT_SIZE: usize = 8 * 1024 * 1024;
/// 1GB on-disk ceiling for the filesystem driver.
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_RESPONSIVE_SIZES: [u32; 5] = [320, 640, 960, 1280, 1920];

pub const MEMORY_DRIVER: &str = "memory";
pub const REDIS_DRIVER: &str = "redis";
pub const FILESYSTEM_DRIVER: &str = "filesystem";

pub const OPTIMIZED_STRATEGY: &str = "optimized";
pub const THUMBNAILS_STRATEGY: &str = "thumbnails";

/// Ten years; longer TTLs are almost certainly a unit mistake.
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Avif => "image/avif",
        }
    }

    pub fn mime(&self) -> mime::Mime {
        match self {
            ImageFormat::Jpeg => mime::IMAGE_JPEG,
            ImageFormat::Png => mime::IMAGE_PNG,
            other => other
                .content_type()
                .parse()
                .unwrap_or(mime::APPLICATION_OCTET_STREAM),
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageFormat::Jpeg => write!(f, "jpeg"),
            ImageFormat::Png => write!(f, "png"),
            ImageFormat::Webp => write!(f, "webp"),
            ImageFormat::Avif => write!(f, "avif"),
        }
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "webp" => Ok(ImageFormat::Webp),
            "avif" => Ok(ImageFormat::Avif),
            _ => Err(format!("Invalid format: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoKitConfig {
    pub cache: CacheConfig,
    pub transform: TransformConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Administrative switch; when false every cache call is a no-op.
    pub enabled: bool,
    pub default_strategy: String,
    pub memory: MemoryDriverConfig,
    pub redis: RedisDriverConfig,
    pub filesystem: FilesystemDriverConfig,
    pub strategies: BTreeMap<String, StrategyConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut strategies = BTreeMap::new();
        strategies.insert(
            OPTIMIZED_STRATEGY.to_string(),
            StrategyConfig {
                driver: FILESYSTEM_DRIVER.to_string(),
                prefix: "optimized:".to_string(),
                ttl_seconds: 7 * 24 * 3600,
            },
        );
        strategies.insert(
            THUMBNAILS_STRATEGY.to_string(),
            StrategyConfig {
                driver: MEMORY_DRIVER.to_string(),
                prefix: "thumbnails:".to_string(),
                ttl_seconds: 24 * 3600,
            },
        );
        Self {
            enabled: true,
            default_strategy: OPTIMIZED_STRATEGY.to_string(),
            memory: MemoryDriverConfig::default(),
            redis: RedisDriverConfig::default(),
            filesystem: FilesystemDriverConfig::default(),
            strategies,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryDriverConfig {
    pub enabled: bool,
}

impl Default for MemoryDriverConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisDriverConfig {
    pub enabled: bool,
    /// Connection URL, credentials included (e.g. `redis://:pass@host:6379/0`).
    pub url: String,
    /// Namespace prepended to every key this driver touches.
    pub namespace: String,
}

impl Default for RedisDriverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "redis://127.0.0.1:6379".to_string(),
            namespace: "logokit:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemDriverConfig {
    pub enabled: bool,
    pub root: PathBuf,
    pub max_size_bytes: u64,
}

impl Default for FilesystemDriverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("./cache"),
            max_size_bytes: DEFAULT_MAX_CACHE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub driver: String,
    #[serde(default)]
    pub prefix: String,
    /// 0 keeps entries until evicted or deleted.
    #[serde(default)]
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub default_quality: u8,
    pub default_fit: FitMode,
    /// RGBA fill used when `contain` pads the output.
    pub background: [u8; 4],
    pub max_input_size: usize,
    pub thumbnail: ThumbnailPreset,
    pub responsive_sizes: Vec<u32>,
    /// Remote folder that opportunistic uploads are placed in.
    pub upload_folder: String,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            default_quality: DEFAULT_QUALITY,
            default_fit: FitMode::Inside,
            background: [255, 255, 255, 0],
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
            thumbnail: ThumbnailPreset::default(),
            responsive_sizes: DEFAULT_RESPONSIVE_SIZES.to_vec(),
            upload_folder: "logos".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailPreset {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub fit: FitMode,
}

impl Default for ThumbnailPreset {
    fn default() -> Self {
        Self { width: 200, height: 200, quality: 70, fit: FitMode::Cover }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub default_provider: String,
    pub cloudflare: Option<CloudflareConfig>,
    pub bunny: Option<BunnyConfig>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            default_provider: crate::delivery::cloudflare::PROVIDER_NAME.to_string(),
            cloudflare: None,
            bunny: None,
        }
    }
}

impl DeliveryConfig {
    pub fn any_enabled(&self) -> bool {
        self.cloudflare.as_ref().is_some_and(|c| c.enabled)
            || self.bunny.as_ref().is_some_and(|c| c.enabled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareConfig {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub account_id: String,
    pub api_token: String,
    pub zone_id: String,
    /// Public delivery host, e.g. `https://imagedelivery.net/<account-hash>`.
    pub delivery_base_url: String,
    #[serde(default = "cloudflare_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BunnyConfig {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub storage_zone: String,
    pub storage_api_key: String,
    #[serde(default = "bunny_storage_endpoint")]
    pub storage_endpoint: String,
    pub pull_zone_url: String,
    pub api_key: String,
    #[serde(default = "bunny_api_base")]
    pub api_base: String,
    /// Enables signed URLs when set.
    #[serde(default)]
    pub signing_key: Option<String>,
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_seconds: i64,
}

fn enabled_by_default() -> bool {
    true
}

fn cloudflare_api_base() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn bunny_storage_endpoint() -> String {
    "https://storage.bunnycdn.com".to_string()
}

fn bunny_api_base() -> String {
    "https://api.bunny.net".to_string()
}

fn default_signed_url_ttl() -> i64 {
    3600
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Default strategy '{0}' is not configured")] MissingDefaultStrategy(String),
    #[error("Strategy '{strategy}' references unknown driver '{driver}'")]
    UnknownDriver { strategy: String, driver: String },
    #[error("Strategy '{0}' is required while the cache is enabled")]
    MissingPipelineStrategy(String),
    #[error("Strategy '{strategy}' TTL of {ttl_seconds}s exceeds the maximum of {}s", MAX_TTL_SECONDS)]
    InvalidTtl { strategy: String, ttl_seconds: u64 },
    #[error("Filesystem cache max size must be > 0")] InvalidMaxCacheSize,
    #[error("Max input size must be > 0")] InvalidMaxInput,
    #[error("Quality must be within 1..=100, got {0}")] InvalidQuality(u8),
    #[error("Responsive sizes must be non-empty and > 0")] InvalidResponsiveSizes,
    #[error("Default delivery provider '{0}' is not configured or disabled")]
    MissingDefaultProvider(String),
    #[error("Failed to read config file: {0}")] Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")] Parse(#[from] serde_json::Error),
    #[error("Invalid value for {name}: {value}")] InvalidEnv { name: &'static str, value: String },
}

impl LogoKitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cache = &self.cache;
        if !cache.strategies.contains_key(&cache.default_strategy) {
            return Err(ConfigError::MissingDefaultStrategy(cache.default_strategy.clone()));
        }
        for (name, strategy) in &cache.strategies {
            if ![MEMORY_DRIVER, REDIS_DRIVER, FILESYSTEM_DRIVER].contains(&strategy.driver.as_str()) {
                return Err(ConfigError::UnknownDriver {
                    strategy: name.clone(),
                    driver: strategy.driver.clone(),
                });
            }
            if strategy.ttl_seconds > MAX_TTL_SECONDS {
                return Err(ConfigError::InvalidTtl {
                    strategy: name.clone(),
                    ttl_seconds: strategy.ttl_seconds,
                });
            }
        }
        if cache.enabled {
            for required in [OPTIMIZED_STRATEGY, THUMBNAILS_STRATEGY] {
                if !cache.strategies.contains_key(required) {
                    return Err(ConfigError::MissingPipelineStrategy(required.to_string()));
                }
            }
        }
        if cache.filesystem.enabled && cache.filesystem.max_size_bytes == 0 {
            return Err(ConfigError::InvalidMaxCacheSize);
        }

        let transform = &self.transform;
        if transform.max_input_size == 0 { return Err(ConfigError::InvalidMaxInput); }
        for q in [transform.default_quality, transform.thumbnail.quality] {
            if q == 0 || q > 100 { return Err(ConfigError::InvalidQuality(q)); }
        }
        if transform.responsive_sizes.is_empty() || transform.responsive_sizes.contains(&0) {
            return Err(ConfigError::InvalidResponsiveSizes);
        }

        let delivery = &self.delivery;
        if delivery.any_enabled() {
            let default_enabled = match delivery.default_provider.as_str() {
                crate::delivery::cloudflare::PROVIDER_NAME => {
                    delivery.cloudflare.as_ref().is_some_and(|c| c.enabled)
                }
                crate::delivery::bunny::PROVIDER_NAME => {
                    delivery.bunny.as_ref().is_some_and(|c| c.enabled)
                }
                _ => false,
            };
            if !default_enabled {
                return Err(ConfigError::MissingDefaultProvider(delivery.default_provider.clone()));
            }
        }
        Ok(())
    }

    /// Loads `LOGOKIT_CONFIG` (JSON) when set, otherwise defaults, then
    /// applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var("LOGOKIT_CONFIG") {
            Ok(path) => {
                let contents = std::fs::read_to_string(path)?;
                serde_json::from_str(&contents)?
            }
            Err(_) => Self::default(),
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var("LOGOKIT_CACHE_ENABLED") {
            self.cache.enabled = match v.as_str() {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => return Err(ConfigError::InvalidEnv { name: "LOGOKIT_CACHE_ENABLED", value: v }),
            };
        }
        if let Ok(url) = std::env::var("LOGOKIT_REDIS_URL") {
            self.cache.redis.enabled = true;
            self.cache.redis.url = url;
        }
        if let Ok(dir) = std::env::var("LOGOKIT_CACHE_DIR") {
            self.cache.filesystem.root = PathBuf::from(dir);
        }
        if let Ok(v) = std::env::var("LOGOKIT_CACHE_MAX_SIZE") {
            self.cache.filesystem.max_size_bytes = v
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { name: "LOGOKIT_CACHE_MAX_SIZE", value: v })?;
        }
        if let Ok(token) = std::env::var("LOGOKIT_CLOUDFLARE_API_TOKEN") {
            if let Some(cf) = self.delivery.cloudflare.as_mut() { cf.api_token = token; }
        }
        if let Ok(key) = std::env::var("LOGOKIT_BUNNY_API_KEY") {
            if let Some(bunny) = self.delivery.bunny.as_mut() { bunny.api_key = key; }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(LogoKitConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_unknown_strategy_driver() {
        let mut cfg = LogoKitConfig::default();
        cfg.cache.strategies.insert(
            "broken".into(),
            StrategyConfig { driver: "memcached".into(), prefix: String::new(), ttl_seconds: 0 },
        );
        assert!(matches!(cfg.validate(), Err(ConfigError::UnknownDriver { .. })));
    }

    #[test]
    fn rejects_missing_default_strategy() {
        let mut cfg = LogoKitConfig::default();
        cfg.cache.default_strategy = "nope".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingDefaultStrategy(_))));
    }

    #[test]
    fn rejects_ttl_beyond_limit() {
        let mut cfg = LogoKitConfig::default();
        cfg.cache.strategies.get_mut(OPTIMIZED_STRATEGY).unwrap().ttl_seconds = u64::MAX;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidTtl { strategy, ttl_seconds: u64::MAX }) if strategy == OPTIMIZED_STRATEGY
        ));

        cfg.cache.strategies.get_mut(OPTIMIZED_STRATEGY).unwrap().ttl_seconds = MAX_TTL_SECONDS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn pipeline_strategies_required_when_cache_enabled() {
        let mut cfg = LogoKitConfig::default();
        cfg.cache.strategies.remove(THUMBNAILS_STRATEGY);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingPipelineStrategy(name)) if name == THUMBNAILS_STRATEGY
        ));

        // A disabled cache never resolves strategies.
        cfg.cache.enabled = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_disabled_default_provider() {
        let mut cfg = LogoKitConfig::default();
        cfg.delivery.default_provider = "cloudflare".into();
        cfg.delivery.bunny = Some(BunnyConfig {
            enabled: true,
            storage_zone: "zone".into(),
            storage_api_key: "k".into(),
            storage_endpoint: bunny_storage_endpoint(),
            pull_zone_url: "https://logos.b-cdn.net".into(),
            api_key: "k".into(),
            api_base: bunny_api_base(),
            signing_key: None,
            signed_url_ttl_seconds: 60,
        });
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingDefaultProvider(_))));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: LogoKitConfig = serde_json::from_str(
            r#"{"cache": {"enabled": false}, "transform": {"responsive_sizes": [100, 200]}}"#,
        )
        .unwrap();
        assert!(!cfg.cache.enabled);
        assert_eq!(cfg.cache.default_strategy, OPTIMIZED_STRATEGY);
        assert_eq!(cfg.transform.responsive_sizes, vec![100, 200]);
        assert_eq!(cfg.transform.default_quality, DEFAULT_QUALITY);
    }

    #[test]
    fn format_parses_aliases() {
        assert_eq!("JPG".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert_eq!("webp".parse::<ImageFormat>().unwrap(), ImageFormat::Webp);
        assert!("tiff".parse::<ImageFormat>().is_err());
        assert_eq!(ImageFormat::Webp.mime().essence_str(), "image/webp");
    }
}
