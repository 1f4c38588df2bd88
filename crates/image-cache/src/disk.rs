//! Capacity-bounded disk tier
//!
//! Stores one encoded image per key under the cache directory. A file's
//! modification time doubles as its last-access time: it is refreshed on every
//! successful read and every write, and capacity cleanup evicts the oldest
//! files first.

use crate::error::Result;
use crate::types::{is_lossless, DiskEntry, DiskUsage, EvictionReport};
use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat};
use std::future::Future;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Subdirectory where writes are staged before being renamed into place
const STAGING_DIR: &str = ".staging";

/// Durable key -> image storage with oldest-first eviction
pub struct DiskStore {
    cache_dir: PathBuf,
    /// Maximum summed size of entry files in bytes
    max_capacity: AtomicU64,
    /// Encoding used for new entries
    format: ImageFormat,
    /// Serializes writes, cleanup passes and clears over the directory
    write_lock: Mutex<()>,
}

impl DiskStore {
    /// Create a disk store rooted at `cache_dir`. Call [`init`](Self::init)
    /// before use.
    pub fn new(cache_dir: PathBuf, max_capacity: u64) -> Self {
        Self {
            cache_dir,
            max_capacity: AtomicU64::new(max_capacity),
            format: ImageFormat::Png,
            write_lock: Mutex::new(()),
        }
    }

    /// Use `format` when encoding new entries. Lossy formats would break
    /// round-trips through the disk tier and are replaced with PNG.
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        if is_lossless(format) {
            self.format = format;
        } else {
            warn!(?format, "Disk cache format is not lossless, using PNG");
            self.format = ImageFormat::Png;
        }
        self
    }

    /// Create the cache directory, drop leftovers from interrupted writes and
    /// run one capacity cleanup pass
    pub async fn init(&self) {
        if let Err(e) = fs::create_dir_all(&self.cache_dir).await {
            warn!(cache_dir = ?self.cache_dir, error = %e, "Failed to create cache directory");
            return;
        }

        match fs::remove_dir_all(self.staging_dir()).await {
            Ok(()) => debug!("Discarded staged writes from a previous run"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "Failed to discard staged writes"),
        }

        let report = self.enforce_capacity().await;
        info!(
            cache_dir = ?self.cache_dir,
            evicted = report.evicted,
            remaining_bytes = report.remaining_bytes,
            "Disk cache initialized"
        );
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Path of the entry file for `key`
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(key)
    }

    fn staging_dir(&self) -> PathBuf {
        self.cache_dir.join(STAGING_DIR)
    }

    pub fn maximum_capacity(&self) -> u64 {
        self.max_capacity.load(Ordering::Relaxed)
    }

    /// Change the byte capacity. Takes effect on the next write-triggered
    /// cleanup; nothing is evicted here.
    pub fn set_maximum_capacity(&self, bytes: u64) {
        self.max_capacity.store(bytes, Ordering::Relaxed);
    }

    /// Read and decode the image stored under `key`, refreshing its
    /// last-access time. Missing or undecodable entries are a miss.
    pub async fn value(&self, key: &str) -> Option<DynamicImage> {
        let path = self.entry_path(key);
        let data = read_entry(key, &path).await?;

        match image::load_from_memory(&data) {
            Ok(image) => {
                refresh(key, &path).await;
                Some(image)
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Cached file is not a decodable image");
                None
            }
        }
    }

    /// Encode and write `value` under `key`, then enforce capacity.
    ///
    /// An absent value is ignored; deleting goes through [`remove`](Self::remove).
    pub async fn set(&self, value: Option<&DynamicImage>, key: &str) {
        let Some(image) = value else {
            debug!(key = %key, "Ignoring store of an absent image");
            return;
        };

        match encode(image, self.format) {
            Ok(data) => self.put_bytes(key, &data).await,
            Err(e) => warn!(key = %key, error = %e, "Failed to encode image for disk cache"),
        }
    }

    /// Raw encoded bytes stored under `key`, refreshing its last-access time
    pub async fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        let data = read_entry(key, &path).await?;
        refresh(key, &path).await;
        Some(data)
    }

    /// Write already-encoded bytes under `key`, then enforce capacity
    pub async fn put_bytes(&self, key: &str, data: &[u8]) {
        let _guard = self.write_lock.lock().await;

        if let Err(e) = self.write_entry(key, data).await {
            warn!(key = %key, error = %e, "Failed to write cached file");
            return;
        }
        debug!(key = %key, size = data.len(), "Cached image on disk");

        self.enforce_capacity_locked().await;
    }

    async fn write_entry(&self, key: &str, data: &[u8]) -> Result<()> {
        let staging = self.staging_dir();
        fs::create_dir_all(&staging).await?;

        let staged = staging.join(key);
        fs::write(&staged, data).await?;

        // Stamp before the rename; the timestamp moves with the file
        if let Err(e) = touch(&staged).await {
            warn!(key = %key, error = %e, "Failed to set last-access time on new entry");
        }

        if let Err(e) = fs::rename(&staged, self.entry_path(key)).await {
            let _ = fs::remove_file(&staged).await;
            return Err(e.into());
        }

        Ok(())
    }

    /// Delete the entry for `key` if present
    pub async fn remove(&self, key: &str) {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => debug!(key = %key, "Removed cached file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(key = %key, error = %e, "Failed to remove cached file"),
        }
    }

    /// Delete every entry file
    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;

        let entries = match self.list_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                log_list_failure(&e);
                return;
            }
        };

        let mut removed = 0usize;
        for entry in entries {
            match fs::remove_file(&entry.path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(key = %entry.key, error = %e, "Failed to remove cached file"),
            }
        }

        info!(removed, "Cleared disk cache");
    }

    /// All entry files, most recently accessed first
    pub async fn entries(&self) -> Vec<DiskEntry> {
        match self.list_entries().await {
            Ok(mut entries) => {
                entries.sort_by(|a, b| b.last_access.cmp(&a.last_access));
                entries
            }
            Err(e) => {
                log_list_failure(&e);
                Vec::new()
            }
        }
    }

    /// Number of entries and their summed size
    pub async fn usage(&self) -> DiskUsage {
        match self.list_entries().await {
            Ok(entries) => DiskUsage {
                entries: entries.len(),
                total_size: entries.iter().map(|e| e.size).sum(),
            },
            Err(e) => {
                log_list_failure(&e);
                DiskUsage::default()
            }
        }
    }

    /// Run a capacity cleanup pass now
    pub async fn enforce_capacity(&self) -> EvictionReport {
        let _guard = self.write_lock.lock().await;
        self.enforce_capacity_locked().await
    }

    /// Run cleanup over the current directory listing. Caller must hold
    /// `write_lock`.
    async fn enforce_capacity_locked(&self) -> EvictionReport {
        let entries = match self.list_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                log_list_failure(&e);
                return EvictionReport::default();
            }
        };

        evict_oldest(entries, self.maximum_capacity(), |entry| {
            let path = entry.path.clone();
            async move { fs::remove_file(path).await }
        })
        .await
    }

    /// Scan the cache directory for entry files. Entries whose metadata
    /// cannot be read sort as the oldest with an unknown (zero) size.
    async fn list_entries(&self) -> Result<Vec<DiskEntry>> {
        let mut dir = fs::read_dir(&self.cache_dir).await?;
        let mut entries = Vec::new();

        while let Some(item) = dir.next_entry().await? {
            let key = item.file_name().to_string_lossy().into_owned();
            let path = item.path();

            let entry = match item.metadata().await {
                Ok(meta) if !meta.is_file() => continue,
                Ok(meta) => DiskEntry {
                    key,
                    path,
                    size: meta.len(),
                    last_access: meta
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or(DateTime::<Utc>::MIN_UTC),
                },
                Err(e) => {
                    debug!(key = %key, error = %e, "Unreadable cache entry metadata");
                    DiskEntry {
                        key,
                        path,
                        size: 0,
                        last_access: DateTime::<Utc>::MIN_UTC,
                    }
                }
            };
            entries.push(entry);
        }

        Ok(entries)
    }
}

/// Delete entries oldest first until their total fits `capacity`.
///
/// The most recently accessed entry is never evicted, so one entry larger than
/// the whole capacity stays on its own. A failed delete leaves the total
/// unchanged and the pass moves on; an entry that is already gone counts as
/// freed.
async fn evict_oldest<F, Fut>(
    mut entries: Vec<DiskEntry>,
    capacity: u64,
    mut delete: F,
) -> EvictionReport
where
    F: FnMut(&DiskEntry) -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let mut total: u64 = entries.iter().map(|e| e.size).sum();
    let mut report = EvictionReport::default();

    if total > capacity {
        entries.sort_by(|a, b| {
            a.last_access
                .cmp(&b.last_access)
                .then_with(|| a.key.cmp(&b.key))
        });
        entries.pop();

        for entry in &entries {
            if total <= capacity {
                break;
            }

            match delete(entry).await {
                Ok(()) => {
                    total = total.saturating_sub(entry.size);
                    report.evicted += 1;
                    report.bytes_freed += entry.size;
                    debug!(key = %entry.key, size = entry.size, "Evicted oldest cache entry");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    total = total.saturating_sub(entry.size);
                }
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "Failed to evict cache entry");
                }
            }
        }

        if total > capacity {
            info!(total, capacity, "Disk cache remains over capacity after cleanup");
        }
    }

    report.remaining_bytes = total;
    report
}

async fn read_entry(key: &str, path: &Path) -> Option<Vec<u8>> {
    match fs::read(path).await {
        Ok(data) => Some(data),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(key = %key, "Disk cache miss");
            None
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to read cached file");
            None
        }
    }
}

async fn refresh(key: &str, path: &Path) {
    if let Err(e) = touch(path).await {
        if !e.is_not_found() {
            warn!(key = %key, error = %e, "Failed to update last-access time");
        }
    }
}

/// Set the file's modification time to now
async fn touch(path: &Path) -> Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path).await?;
    file.into_std().await.set_modified(SystemTime::now())?;
    Ok(())
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format)?;
    Ok(buf.into_inner())
}

fn log_list_failure(err: &crate::error::CacheError) {
    if err.is_not_found() {
        debug!("Cache directory does not exist");
    } else {
        warn!(error = %err, "Failed to list cache directory");
    }
}
