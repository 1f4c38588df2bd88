//! Cache types

use chrono::{DateTime, Utc};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Name of the cache directory under the platform cache root
pub const CACHE_DIR_NAME: &str = "DiskImageCache";

const DEFAULT_MAX_DISK_CAPACITY: u64 = 100 * 1024 * 1024; // 100MB
const DEFAULT_MEMORY_CAPACITY: u64 = 64 * 1024 * 1024; // 64MB

/// Configuration for an [`ImageCache`](crate::ImageCache)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding one file per cached key
    pub cache_dir: PathBuf,
    /// Upper bound on the summed size of entry files, in bytes
    pub max_disk_capacity: u64,
    /// Budget for decoded pixel data held in memory, in bytes
    pub memory_capacity: u64,
    /// Encoding used when writing images to disk
    pub disk_format: ImageFormat,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_disk_capacity: DEFAULT_MAX_DISK_CAPACITY,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            disk_format: ImageFormat::Png,
        }
    }
}

impl CacheConfig {
    /// Parse configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache_dir = env::var("IMAGE_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let max_disk_capacity = env::var("IMAGE_CACHE_MAX_DISK_BYTES")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.max_disk_capacity);

        let memory_capacity = env::var("IMAGE_CACHE_MEMORY_BYTES")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.memory_capacity);

        let disk_format = env::var("IMAGE_CACHE_FORMAT")
            .ok()
            .and_then(|ext| parse_format(&ext))
            .unwrap_or(defaults.disk_format);

        Self {
            cache_dir,
            max_disk_capacity,
            memory_capacity,
            disk_format,
        }
    }
}

/// Resolve a disk format from a file extension such as `png` or `webp`.
/// Only lossless encodings are accepted.
pub fn parse_format(ext: &str) -> Option<ImageFormat> {
    ImageFormat::from_extension(ext.trim().trim_start_matches('.')).filter(|f| is_lossless(*f))
}

/// Whether images written in `format` decode back to identical pixels
pub fn is_lossless(format: ImageFormat) -> bool {
    // image's WebP encoder only writes lossless frames
    matches!(format, ImageFormat::Png | ImageFormat::WebP)
}

/// Platform cache root joined with [`CACHE_DIR_NAME`]
pub fn default_cache_dir() -> PathBuf {
    let root = env::var_os("XDG_CACHE_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(env::temp_dir);
    root.join(CACHE_DIR_NAME)
}

/// An entry file found while scanning the cache directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskEntry {
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    /// File modification time; `DateTime::<Utc>::MIN_UTC` when unreadable
    pub last_access: DateTime<Utc>,
}

/// Summed footprint of the disk tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub entries: usize,
    pub total_size: u64,
}

/// Outcome of one capacity cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionReport {
    pub evicted: usize,
    pub bytes_freed: u64,
    pub remaining_bytes: u64,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub memory_entries: u64,
    pub disk: DiskUsage,
    pub max_disk_capacity: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert!(config.cache_dir.ends_with(CACHE_DIR_NAME));
        assert_eq!(config.max_disk_capacity, 100 * 1024 * 1024);
        assert_eq!(config.memory_capacity, 64 * 1024 * 1024);
        assert_eq!(config.disk_format, ImageFormat::Png);
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("png"), Some(ImageFormat::Png));
        assert_eq!(parse_format(".png"), Some(ImageFormat::Png));
        assert_eq!(parse_format(" webp "), Some(ImageFormat::WebP));
        assert_eq!(parse_format("nonsense"), None);
    }

    #[test]
    fn test_lossy_formats_are_rejected() {
        assert_eq!(parse_format("jpg"), None);
        assert_eq!(parse_format("jpeg"), None);
        assert!(!is_lossless(ImageFormat::Jpeg));
        assert!(is_lossless(ImageFormat::Png));
    }

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.memory_hits, 0);
        assert_eq!(stats.disk_hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.disk, DiskUsage::default());
    }

    #[test]
    fn test_cache_stats_serialization() {
        let stats = CacheStats {
            memory_hits: 7,
            disk_hits: 3,
            misses: 1,
            memory_entries: 2,
            disk: DiskUsage {
                entries: 4,
                total_size: 12345,
            },
            max_disk_capacity: 100,
        };

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"disk_hits\":3"));
        assert!(json.contains("12345"));

        let deserialized: CacheStats = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.disk.entries, 4);
    }
}
