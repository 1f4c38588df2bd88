//! Two-tier image cache
//!
//! A bounded in-memory tier sits in front of a persistent disk tier. Reads
//! promote disk hits into memory, writes go through to both tiers, and the
//! disk tier keeps its total size under a byte capacity by evicting the least
//! recently accessed files first.
//!
//! Filesystem and codec failures never reach the caller: they are logged and
//! the cache behaves as if the entry were absent.

mod cache;
mod disk;
mod error;
mod locks;
mod memory;
mod types;

pub use cache::ImageCache;
pub use disk::DiskStore;
pub use error::{CacheError, Result};
pub use memory::MemoryStore;
pub use types::{
    default_cache_dir, is_lossless, parse_format, CacheConfig, CacheStats, DiskEntry, DiskUsage,
    EvictionReport, CACHE_DIR_NAME,
};

pub use image::{DynamicImage, ImageFormat};
