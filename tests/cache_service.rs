mod common;

use bytes::Bytes;
use common::{CountingDriver, FailingDriver, RecordingEvents};
use logokit::cache::{CacheService, DriverRegistry, FilesystemDriver, MemoryDriver, StorageDriver};
use logokit::config::{CacheConfig, StrategyConfig, OPTIMIZED_STRATEGY, THUMBNAILS_STRATEGY};
use logokit::LogoKitError;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn config(driver: &str) -> CacheConfig {
    let mut strategies = BTreeMap::new();
    for (name, prefix) in [(OPTIMIZED_STRATEGY, "optimized:"), (THUMBNAILS_STRATEGY, "thumbnails:")] {
        strategies.insert(
            name.to_string(),
            StrategyConfig { driver: driver.to_string(), prefix: prefix.to_string(), ttl_seconds: 3600 },
        );
    }
    CacheConfig { strategies, ..CacheConfig::default() }
}

fn service(driver_name: &str, driver: Arc<dyn StorageDriver>, events: Arc<RecordingEvents>) -> CacheService {
    let mut registry = DriverRegistry::new();
    registry.register(driver_name, driver);
    CacheService::new(&config(driver_name), &registry, events).unwrap()
}

#[tokio::test]
async fn get_fails_open_and_reports_once() {
    let events = Arc::new(RecordingEvents::default());
    let cache = service("failing", Arc::new(FailingDriver), events.clone());

    let value = cache.get("abc", None).await.unwrap();
    assert!(value.is_none());
    assert_eq!(events.counts(), (0, 0, 1));
}

#[tokio::test]
async fn writes_fail_open() {
    let events = Arc::new(RecordingEvents::default());
    let cache = service("failing", Arc::new(FailingDriver), events.clone());

    cache.set("abc", Bytes::from_static(b"v"), None).await.unwrap();
    cache.delete("abc", None).await.unwrap();
    cache.clear(Some(THUMBNAILS_STRATEGY)).await.unwrap();
    assert_eq!(events.counts(), (0, 0, 3));
}

#[tokio::test]
async fn hit_and_miss_events() {
    let events = Arc::new(RecordingEvents::default());
    let cache = service("memory", Arc::new(MemoryDriver::new()), events.clone());

    assert!(cache.get("k", None).await.unwrap().is_none());
    cache.set("k", Bytes::from_static(b"value"), None).await.unwrap();
    assert_eq!(cache.get("k", None).await.unwrap().unwrap(), Bytes::from_static(b"value"));
    assert_eq!(events.counts(), (1, 1, 0));
}

#[tokio::test]
async fn keys_are_prefixed_per_strategy() {
    let driver = Arc::new(MemoryDriver::new());
    let cache = service("memory", driver.clone(), Arc::new(RecordingEvents::default()));

    cache.set("k", Bytes::from_static(b"o"), Some(OPTIMIZED_STRATEGY)).await.unwrap();
    cache.set("k", Bytes::from_static(b"t"), Some(THUMBNAILS_STRATEGY)).await.unwrap();

    assert_eq!(driver.get("optimized:k").await.unwrap().unwrap(), Bytes::from_static(b"o"));
    assert_eq!(driver.get("thumbnails:k").await.unwrap().unwrap(), Bytes::from_static(b"t"));
}

#[tokio::test]
async fn clearing_one_strategy_keeps_the_other() {
    let cache = service("memory", Arc::new(MemoryDriver::new()), Arc::new(RecordingEvents::default()));

    cache.set("a", Bytes::from_static(b"full"), Some(OPTIMIZED_STRATEGY)).await.unwrap();
    cache.set("a", Bytes::from_static(b"thumb"), Some(THUMBNAILS_STRATEGY)).await.unwrap();
    cache.clear(Some(OPTIMIZED_STRATEGY)).await.unwrap();

    assert!(cache.get("a", Some(OPTIMIZED_STRATEGY)).await.unwrap().is_none());
    assert_eq!(
        cache.get("a", Some(THUMBNAILS_STRATEGY)).await.unwrap().unwrap(),
        Bytes::from_static(b"thumb")
    );
}

#[tokio::test]
async fn strategy_isolation_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(FilesystemDriver::with_root(dir.path().to_path_buf(), 1024 * 1024));
    let cache = service("filesystem", driver, Arc::new(RecordingEvents::default()));

    cache.set("a", Bytes::from_static(b"thumb"), Some(THUMBNAILS_STRATEGY)).await.unwrap();
    cache.set("a", Bytes::from_static(b"full"), Some(OPTIMIZED_STRATEGY)).await.unwrap();
    cache.clear(Some(OPTIMIZED_STRATEGY)).await.unwrap();

    assert!(cache.get("a", Some(OPTIMIZED_STRATEGY)).await.unwrap().is_none());
    assert!(cache.get("a", Some(THUMBNAILS_STRATEGY)).await.unwrap().is_some());
}

#[tokio::test]
async fn disabled_cache_is_a_no_op() {
    let driver = Arc::new(CountingDriver::default());
    let mut registry = DriverRegistry::new();
    registry.register("counting", driver.clone());
    let cfg = CacheConfig { enabled: false, ..config("counting") };
    let cache = CacheService::new(&cfg, &registry, Arc::new(RecordingEvents::default())).unwrap();

    cache.set("k", Bytes::from_static(b"v"), None).await.unwrap();
    assert!(cache.get("k", None).await.unwrap().is_none());
    // Even unknown strategies are ignored while disabled.
    assert!(cache.get("k", Some("nope")).await.unwrap().is_none());
    assert_eq!((driver.gets(), driver.sets()), (0, 0));
}

#[tokio::test]
async fn unknown_strategy_is_an_error() {
    let cache = service("memory", Arc::new(MemoryDriver::new()), Arc::new(RecordingEvents::default()));
    assert!(matches!(
        cache.get("k", Some("banners")).await,
        Err(LogoKitError::UnknownStrategy(name)) if name == "banners"
    ));
}

#[test]
fn strategy_with_unregistered_driver_is_rejected() {
    let registry = DriverRegistry::new();
    let err = CacheService::new(&config("redis"), &registry, Arc::new(RecordingEvents::default()));
    assert!(matches!(err, Err(LogoKitError::ConfigError(_))));
}

#[tokio::test]
async fn unvalidated_huge_ttl_is_stored_without_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let drivers: [(&str, Arc<dyn StorageDriver>); 2] = [
        ("memory", Arc::new(MemoryDriver::new())),
        ("filesystem", Arc::new(FilesystemDriver::with_root(dir.path().to_path_buf(), 1024 * 1024))),
    ];
    for (name, driver) in drivers {
        let mut cfg = config(name);
        for strategy in cfg.strategies.values_mut() {
            strategy.ttl_seconds = u64::MAX;
        }
        let mut registry = DriverRegistry::new();
        registry.register(name, driver);
        let events = Arc::new(RecordingEvents::default());
        let cache = CacheService::new(&cfg, &registry, events.clone()).unwrap();

        cache.set("k", Bytes::from_static(b"v"), None).await.unwrap();
        assert_eq!(cache.get("k", None).await.unwrap().unwrap(), Bytes::from_static(b"v"));
        assert_eq!(events.counts(), (1, 0, 0), "{} reported an error", name);
    }
}

async fn assert_round_trip_and_expiry(driver: &dyn StorageDriver) {
    let value = Bytes::from_static(b"\x89PNG derivative bytes");
    driver.set("rt", value.clone(), 60).await.unwrap();
    assert_eq!(driver.get("rt").await.unwrap().unwrap(), value);

    driver.set("ttl", value.clone(), 1).await.unwrap();
    driver.set("forever", value.clone(), 0).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(driver.get("ttl").await.unwrap().is_none(), "{} kept an expired entry", driver.name());
    assert!(driver.get("forever").await.unwrap().is_some());

    driver.delete("rt").await.unwrap();
    assert!(driver.get("rt").await.unwrap().is_none());
}

#[tokio::test]
async fn memory_round_trip_and_expiry() {
    assert_round_trip_and_expiry(&MemoryDriver::new()).await;
}

#[tokio::test]
async fn filesystem_round_trip_and_expiry() {
    let dir = tempfile::tempdir().unwrap();
    assert_round_trip_and_expiry(&FilesystemDriver::with_root(dir.path().to_path_buf(), 1024 * 1024)).await;
}

#[tokio::test]
async fn redis_round_trip_and_expiry() {
    let Ok(url) = std::env::var("LOGOKIT_TEST_REDIS_URL") else {
        eprintln!("LOGOKIT_TEST_REDIS_URL not set, skipping");
        return;
    };
    let cfg = logokit::config::RedisDriverConfig {
        enabled: true,
        url,
        namespace: format!("logokit-test-{}:", std::process::id()),
    };
    let driver = logokit::cache::RedisDriver::new(&cfg).unwrap();
    assert_round_trip_and_expiry(&driver).await;
    driver.clear().await.unwrap();
}
