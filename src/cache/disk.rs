use crate::cache::{now_millis, StorageDriver};
use crate::config::FilesystemDriverConfig;
use crate::LogoKitError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::fs;

const VALUE_EXT: &str = "bin";
const META_SUFFIX: &str = ".meta.json";
const TMP_EXT: &str = "tmp";

/// Strays younger than this may belong to a `set` still in flight.
const ORPHAN_GRACE: Duration = Duration::from_secs(60);

/// Sidecar stored next to every value file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntryMeta {
    /// Storage key, kept so prefix clears can match entries.
    pub key: String,
    pub stored_at: i64,
    /// Unix milliseconds; `None` never expires.
    pub expires_at: Option<i64>,
    pub size_bytes: u64,
}

impl EntryMeta {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// What one cleanup sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub expired: usize,
    pub evicted: usize,
    /// Leftover temp files and values without a sidecar.
    pub orphans: usize,
    /// Value bytes still on disk after the sweep.
    pub total_bytes: u64,
}

/// Local-disk driver with sidecar metadata and size-bounded cleanup.
///
/// Each key maps to `<sha256(key)>.bin` plus `<sha256(key)>.meta.json` under
/// the root. Both files are written to a temp name and renamed into place,
/// value first, so a sidecar never points at a half-written value. A value
/// whose length disagrees with its sidecar is treated as absent.
///
/// Every `set` runs a sweep over the whole directory: expired pairs are
/// removed, then the entries closest to expiry are evicted until the total
/// value size fits `max_size_bytes`. Sidecars that vanish or fail to parse
/// mid-sweep (another writer got there first) are skipped. Temp files and
/// values left without a sidecar by an interrupted write are deleted once
/// they are older than a minute.
pub struct FilesystemDriver {
    root: PathBuf,
    max_size: u64,
    tmp_counter: AtomicU64,
}

impl FilesystemDriver {
    pub fn new(config: &FilesystemDriverConfig) -> Self {
        Self::with_root(config.root.clone(), config.max_size_bytes)
    }

    pub fn with_root(root: PathBuf, max_size: u64) -> Self {
        Self { root, max_size, tmp_counter: AtomicU64::new(0) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn hash_for(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn value_path(&self, hash: &str) -> PathBuf {
        self.root.join(format!("{}.{}", hash, VALUE_EXT))
    }

    fn meta_path(&self, hash: &str) -> PathBuf {
        self.root.join(format!("{}{}", hash, META_SUFFIX))
    }

    async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), LogoKitError> {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{}.{}.{}", std::process::id(), n, TMP_EXT));
        fs::write(&tmp, data).await.map_err(io_error)?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_error(e));
        }
        Ok(())
    }

    async fn read_meta(&self, hash: &str) -> Result<Option<EntryMeta>, LogoKitError> {
        let raw = match fs::read(self.meta_path(hash)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| LogoKitError::DriverError(format!("Malformed sidecar {}: {}", hash, e)))
    }

    /// Removes sidecar then value; missing files are fine.
    async fn remove_pair(&self, hash: &str) -> Result<(), LogoKitError> {
        for path in [self.meta_path(hash), self.value_path(hash)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(e)),
            }
        }
        Ok(())
    }

    /// Reads every parseable sidecar under the root.
    async fn scan(&self) -> Result<Vec<(String, EntryMeta)>, LogoKitError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(io_error)? {
            let name = entry.file_name();
            let Some(hash) = name.to_str().and_then(|n| n.strip_suffix(META_SUFFIX)) else {
                continue;
            };
            let meta = match fs::read(entry.path()).await {
                Ok(raw) => serde_json::from_slice::<EntryMeta>(&raw).ok(),
                Err(_) => None,
            };
            match meta {
                Some(meta) => entries.push((hash.to_string(), meta)),
                None => tracing::trace!(hash, "Skipping unreadable sidecar during scan"),
            }
        }
        Ok(entries)
    }

    /// Temp files and sidecar-less values older than `ORPHAN_GRACE`.
    async fn find_orphans(&self) -> Result<Vec<PathBuf>, LogoKitError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(e)),
        };
        let cutoff = SystemTime::now().checked_sub(ORPHAN_GRACE).unwrap_or(SystemTime::UNIX_EPOCH);

        let mut orphans = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            let stray = match path.extension().and_then(|e| e.to_str()) {
                Some(TMP_EXT) => true,
                Some(VALUE_EXT) => match path.file_stem().and_then(|s| s.to_str()) {
                    Some(hash) => !fs::try_exists(self.meta_path(hash)).await.unwrap_or(true),
                    None => false,
                },
                _ => false,
            };
            if !stray {
                continue;
            }
            let old_enough = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified <= cutoff,
                Err(_) => false,
            };
            if old_enough {
                orphans.push(path);
            }
        }
        Ok(orphans)
    }

    /// Removes orphaned files, drops expired entries, then evicts
    /// oldest-expiry-first until the total value size is within the
    /// configured maximum.
    pub async fn sweep(&self) -> Result<SweepStats, LogoKitError> {
        let mut stats = SweepStats::default();
        for path in self.find_orphans().await? {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    stats.orphans += 1;
                    tracing::debug!(path = %path.display(), "Removed orphaned cache file");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(e)),
            }
        }

        let now = now_millis();
        let entries = self.scan().await?;
        stats.scanned = entries.len();

        let mut live = Vec::with_capacity(entries.len());
        for (hash, meta) in entries {
            if meta.is_expired(now) {
                self.remove_pair(&hash).await?;
                stats.expired += 1;
            } else {
                stats.total_bytes += meta.size_bytes;
                live.push((hash, meta));
            }
        }

        if stats.total_bytes > self.max_size {
            tracing::info!(
                total = stats.total_bytes,
                max = self.max_size,
                "Filesystem cache over limit, evicting"
            );
            live.sort_by_key(|(_, m)| (m.expires_at.unwrap_or(i64::MAX), m.stored_at));
            for (hash, meta) in live {
                if stats.total_bytes <= self.max_size {
                    break;
                }
                self.remove_pair(&hash).await?;
                stats.total_bytes -= meta.size_bytes;
                stats.evicted += 1;
                tracing::debug!(key = %meta.key, size = meta.size_bytes, "Evicted filesystem entry");
            }
        }

        Ok(stats)
    }

    /// Sum of live value sizes as recorded by sidecars.
    pub async fn total_size(&self) -> Result<u64, LogoKitError> {
        let now = now_millis();
        Ok(self
            .scan()
            .await?
            .iter()
            .filter(|(_, m)| !m.is_expired(now))
            .map(|(_, m)| m.size_bytes)
            .sum())
    }
}

/// `now + ttl` in unix milliseconds, `None` when it would not fit.
fn expiry_millis(now: i64, ttl_seconds: u64) -> Option<i64> {
    i64::try_from(ttl_seconds)
        .ok()
        .and_then(|ttl| ttl.checked_mul(1000))
        .and_then(|ms| now.checked_add(ms))
}

fn io_error(e: std::io::Error) -> LogoKitError {
    LogoKitError::DriverError(format!("Filesystem cache I/O error: {}", e))
}

#[async_trait::async_trait]
impl StorageDriver for FilesystemDriver {
    fn name(&self) -> &str {
        crate::config::FILESYSTEM_DRIVER
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, LogoKitError> {
        let hash = Self::hash_for(key);
        let Some(meta) = self.read_meta(&hash).await? else {
            return Ok(None);
        };

        if meta.is_expired(now_millis()) {
            tracing::trace!(key, "Removing expired filesystem entry");
            self.remove_pair(&hash).await?;
            return Ok(None);
        }

        let value = match fs::read(self.value_path(&hash)).await {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };
        if value.len() as u64 != meta.size_bytes {
            tracing::debug!(key, "Value and sidecar disagree, treating as absent");
            return Ok(None);
        }
        Ok(Some(Bytes::from(value)))
    }

    async fn set(&self, key: &str, value: Bytes, ttl_seconds: u64) -> Result<(), LogoKitError> {
        fs::create_dir_all(&self.root).await.map_err(io_error)?;

        let hash = Self::hash_for(key);
        let now = now_millis();
        let meta = EntryMeta {
            key: key.to_string(),
            stored_at: now,
            expires_at: (ttl_seconds > 0).then(|| expiry_millis(now, ttl_seconds)).flatten(),
            size_bytes: value.len() as u64,
        };
        let meta_json = serde_json::to_vec(&meta)
            .map_err(|e| LogoKitError::DriverError(e.to_string()))?;

        self.write_atomic(&self.value_path(&hash), &value).await?;
        self.write_atomic(&self.meta_path(&hash), &meta_json).await?;

        let stats = self.sweep().await?;
        if stats.expired + stats.evicted > 0 {
            tracing::debug!(?stats, "Filesystem sweep removed entries");
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), LogoKitError> {
        self.remove_pair(&Self::hash_for(key)).await
    }

    async fn clear(&self) -> Result<(), LogoKitError> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(e)),
        }
        fs::create_dir_all(&self.root).await.map_err(io_error)?;
        tracing::info!(root = %self.root.display(), "Cleared filesystem cache");
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), LogoKitError> {
        let mut removed = 0usize;
        for (hash, meta) in self.scan().await? {
            if meta.key.starts_with(prefix) {
                self.remove_pair(&hash).await?;
                removed += 1;
            }
        }
        tracing::info!(removed, prefix, "Cleared filesystem prefix");
        Ok(())
    }
}
