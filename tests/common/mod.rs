#![allow(dead_code)]

use bytes::Bytes;
use image::{DynamicImage, Rgba, RgbaImage};
use logokit::cache::{CacheEvents, MemoryDriver, StorageDriver};
use logokit::LogoKitError;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Encodes a gradient PNG so transforms have real pixels to work on.
pub fn png(width: u32, height: u32) -> Bytes {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    });
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    Bytes::from(out)
}

/// Memory driver that counts calls.
#[derive(Default)]
pub struct CountingDriver {
    inner: MemoryDriver,
    pub gets: AtomicUsize,
    pub hits: AtomicUsize,
    pub sets: AtomicUsize,
}

impl CountingDriver {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StorageDriver for CountingDriver {
    fn name(&self) -> &str {
        "counting"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, LogoKitError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let value = self.inner.get(key).await?;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Bytes, ttl_seconds: u64) -> Result<(), LogoKitError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl_seconds).await
    }

    async fn delete(&self, key: &str) -> Result<(), LogoKitError> {
        self.inner.delete(key).await
    }

    async fn clear(&self) -> Result<(), LogoKitError> {
        self.inner.clear().await
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), LogoKitError> {
        self.inner.clear_prefix(prefix).await
    }
}

/// Driver whose every operation fails.
pub struct FailingDriver;

#[async_trait::async_trait]
impl StorageDriver for FailingDriver {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<Bytes>, LogoKitError> {
        Err(LogoKitError::DriverError("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: u64) -> Result<(), LogoKitError> {
        Err(LogoKitError::DriverError("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), LogoKitError> {
        Err(LogoKitError::DriverError("connection refused".into()))
    }

    async fn clear(&self) -> Result<(), LogoKitError> {
        Err(LogoKitError::DriverError("connection refused".into()))
    }

    async fn clear_prefix(&self, _prefix: &str) -> Result<(), LogoKitError> {
        Err(LogoKitError::DriverError("connection refused".into()))
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    pub hits: AtomicUsize,
    pub misses: AtomicUsize,
    pub errors: AtomicUsize,
}

impl RecordingEvents {
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.hits.load(Ordering::SeqCst),
            self.misses.load(Ordering::SeqCst),
            self.errors.load(Ordering::SeqCst),
        )
    }
}

impl CacheEvents for RecordingEvents {
    fn on_hit(&self, _key: &str) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_miss(&self, _key: &str) {
        self.misses.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _error: &LogoKitError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}
