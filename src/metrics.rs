use crate::cache::CacheEvents;
use crate::LogoKitError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for the cache and pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub cache_errors: AtomicU64,
    pub transforms: AtomicU64,
    pub uploads: AtomicU64,
    pub upload_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_errors: u64,
    pub transforms: u64,
    pub uploads: u64,
    pub upload_failures: u64,
    pub hit_rate_percent: f64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transform(&self) {
        self.transforms.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload(&self, ok: bool) {
        if ok {
            self.uploads.fetch_add(1, Ordering::Relaxed);
        } else {
            self.upload_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate_percent = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        MetricsSnapshot {
            cache_hits: hits,
            cache_misses: misses,
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            transforms: self.transforms.load(Ordering::Relaxed),
            uploads: self.uploads.load(Ordering::Relaxed),
            upload_failures: self.upload_failures.load(Ordering::Relaxed),
            hit_rate_percent,
        }
    }

    /// Prometheus text exposition of the counters.
    pub fn render(&self) -> String {
        let s = self.snapshot();
        let counters = [
            ("logokit_cache_hits_total", "Total number of cache hits", s.cache_hits),
            ("logokit_cache_misses_total", "Total number of cache misses", s.cache_misses),
            ("logokit_cache_errors_total", "Total number of cache driver errors", s.cache_errors),
            ("logokit_transforms_total", "Total number of image transformations", s.transforms),
            ("logokit_uploads_total", "Total number of successful remote uploads", s.uploads),
            ("logokit_upload_failures_total", "Total number of failed remote uploads", s.upload_failures),
        ];
        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!("# HELP {} {}\n# TYPE {} counter\n{} {}\n", name, help, name, name, value));
        }
        out
    }
}

impl CacheEvents for Metrics {
    fn on_hit(&self, _key: &str) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn on_miss(&self, _key: &str) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn on_error(&self, _error: &LogoKitError) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(feature = "prometheus")]
pub use prom::PrometheusEvents;

#[cfg(feature = "prometheus")]
mod prom {
    use super::*;
    use prometheus::{IntCounter, Registry};

    /// Cache event hook backed by prometheus counters.
    pub struct PrometheusEvents {
        hits: IntCounter,
        misses: IntCounter,
        errors: IntCounter,
    }

    impl PrometheusEvents {
        pub fn register(registry: &Registry) -> prometheus::Result<Self> {
            let hits = IntCounter::new("logokit_cache_hits_total", "Total number of cache hits")?;
            let misses = IntCounter::new("logokit_cache_misses_total", "Total number of cache misses")?;
            let errors = IntCounter::new("logokit_cache_errors_total", "Total number of cache driver errors")?;
            registry.register(Box::new(hits.clone()))?;
            registry.register(Box::new(misses.clone()))?;
            registry.register(Box::new(errors.clone()))?;
            Ok(Self { hits, misses, errors })
        }
    }

    impl CacheEvents for PrometheusEvents {
        fn on_hit(&self, _key: &str) {
            self.hits.inc();
        }

        fn on_miss(&self, _key: &str) {
            self.misses.inc();
        }

        fn on_error(&self, _error: &LogoKitError) {
            self.errors.inc();
        }
    }

}
