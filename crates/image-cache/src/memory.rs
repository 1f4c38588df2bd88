//! In-memory hot tier

use image::DynamicImage;
use moka::future::Cache;
use std::sync::Arc;

/// Bounded key -> decoded image map. Eviction under the byte budget is left
/// to moka.
pub struct MemoryStore {
    cache: Cache<String, Arc<DynamicImage>>,
}

impl MemoryStore {
    /// Create a store holding at most `max_bytes` of decoded pixel data
    pub fn new(max_bytes: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|_key: &String, image: &Arc<DynamicImage>| -> u32 {
                image.as_bytes().len().try_into().unwrap_or(u32::MAX)
            })
            .build();

        Self { cache }
    }

    pub async fn store(&self, key: &str, image: Arc<DynamicImage>) {
        self.cache.insert(key.to_string(), image).await;
    }

    pub async fn retrieve(&self, key: &str) -> Option<Arc<DynamicImage>> {
        self.cache.get(key).await
    }

    pub async fn remove(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    pub fn remove_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of resident entries
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
