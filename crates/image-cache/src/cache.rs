//! Two-tier image cache
//!
//! Reads consult memory, then disk, promoting disk hits into memory. Writes go
//! through to both tiers before returning, and removals clear both tiers so a
//! removed image can never be promoted back from disk.

use crate::disk::DiskStore;
use crate::locks::KeyLocks;
use crate::memory::MemoryStore;
use crate::types::{CacheConfig, CacheStats};
use image::DynamicImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Memory tier in front of a capacity-bounded disk tier
pub struct ImageCache {
    memory: MemoryStore,
    disk: DiskStore,
    /// Serializes stores, removals and promotions per key
    locks: KeyLocks,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
}

impl ImageCache {
    /// Create a cache from `config`. Call [`init`](Self::init) before use.
    pub fn new(config: CacheConfig) -> Self {
        let disk = DiskStore::new(config.cache_dir, config.max_disk_capacity)
            .with_format(config.disk_format);
        Self::from_parts(MemoryStore::new(config.memory_capacity), disk)
    }

    /// Assemble a cache from already-built tiers
    pub fn from_parts(memory: MemoryStore, disk: DiskStore) -> Self {
        Self {
            memory,
            disk,
            locks: KeyLocks::new(),
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Prepare the disk tier and run its startup cleanup
    pub async fn init(&self) {
        self.disk.init().await;
        info!(cache_dir = ?self.disk.cache_dir(), "Image cache ready");
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn disk(&self) -> &DiskStore {
        &self.disk
    }

    pub fn maximum_disk_capacity(&self) -> u64 {
        self.disk.maximum_capacity()
    }

    pub fn set_maximum_disk_capacity(&self, bytes: u64) {
        self.disk.set_maximum_capacity(bytes);
    }

    /// Store `image` under `key` in memory, then on disk
    pub async fn store(&self, image: impl Into<Arc<DynamicImage>>, key: &str) {
        let image = image.into();
        let _guard = self.locks.lock(key).await;

        self.memory.store(key, image.clone()).await;
        self.disk.set(Some(&image), key).await;
        debug!(key = %key, "Stored image");
    }

    /// Look up `key`, promoting a disk hit into memory. `None` means the
    /// caller must fetch the image from its origin and `store` it.
    ///
    /// A memory hit does not touch the disk, so it leaves the entry's disk
    /// recency alone. Images served only from memory in a long-running
    /// process age on disk and are evicted there first; they stay served from
    /// memory until the memory tier drops them.
    pub async fn retrieve(&self, key: &str) -> Option<Arc<DynamicImage>> {
        if let Some(image) = self.memory.retrieve(key).await {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Memory cache hit");
            return Some(image);
        }

        let _guard = self.locks.lock(key).await;

        // A concurrent store or promotion may have filled memory meanwhile
        if let Some(image) = self.memory.retrieve(key).await {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Some(image);
        }

        match self.disk.value(key).await {
            Some(image) => {
                let image = Arc::new(image);
                self.memory.store(key, image.clone()).await;
                self.disk_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Disk cache hit, promoted to memory");
                Some(image)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    /// Remove `key` from both tiers
    pub async fn remove(&self, key: &str) {
        let _guard = self.locks.lock(key).await;

        self.memory.remove(key).await;
        self.disk.remove(key).await;
    }

    /// Empty both tiers
    pub async fn remove_all(&self) {
        let _guards = self.locks.lock_all().await;

        self.memory.remove_all();
        self.disk.clear().await;
        info!("Removed all cached images");
    }

    /// Current cache statistics
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            memory_entries: self.memory.entry_count(),
            disk: self.disk.usage().await,
            max_disk_capacity: self.disk.maximum_capacity(),
        }
    }
}
