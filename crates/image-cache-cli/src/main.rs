//! image-cache - inspect and maintain an on-disk image cache
//!
//! Works against the same directory layout an application's `ImageCache`
//! uses: one encoded image per key, file modification time as last access.

mod error;

use crate::error::{CliError, Result};
use clap::{Parser, Subcommand};
use image_cache::{parse_format, CacheConfig, ImageCache};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "image-cache", about = "Inspect and maintain an on-disk image cache")]
struct Cli {
    /// Cache directory (defaults to IMAGE_CACHE_DIR or the platform cache dir)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Disk capacity in bytes (defaults to IMAGE_CACHE_MAX_DISK_BYTES or 100MB)
    #[arg(long, global = true)]
    max_disk_bytes: Option<u64>,

    /// Lossless encoding for stored images, by extension: png, webp
    #[arg(long, global = true)]
    format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode an image file and store it under KEY
    Store { key: String, path: PathBuf },
    /// Write the image cached under KEY to OUTPUT
    Fetch { key: String, output: PathBuf },
    /// Remove KEY from the cache
    Remove { key: String },
    /// Remove every cached image
    Clear,
    /// List entries, most recently accessed first
    List,
    /// Print cache statistics as JSON
    Stats,
    /// Run a capacity cleanup pass and print what was evicted
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("image_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Max disk capacity: {} bytes", config.max_disk_capacity);

    let cache = ImageCache::new(config);
    cache.init().await;

    let output = run(&cache, cli.command).await?;
    if !output.is_empty() {
        println!("{}", output);
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<CacheConfig> {
    let mut config = CacheConfig::from_env();

    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(bytes) = cli.max_disk_bytes {
        config.max_disk_capacity = bytes;
    }
    if let Some(ext) = &cli.format {
        config.disk_format = parse_format(ext).ok_or_else(|| {
            CliError::Config(format!("unsupported lossless image format: {}", ext))
        })?;
    }

    Ok(config)
}

/// Execute one command, returning the text to print
async fn run(cache: &ImageCache, command: Command) -> Result<String> {
    match command {
        Command::Store { key, path } => {
            let data = tokio::fs::read(&path).await?;
            let image = image::load_from_memory(&data)?;
            cache.store(image, &key).await;
            Ok(String::new())
        }
        Command::Fetch { key, output } => {
            let image = cache
                .retrieve(&key)
                .await
                .ok_or_else(|| CliError::NotCached(key.clone()))?;
            image.save(&output)?;
            Ok(String::new())
        }
        Command::Remove { key } => {
            cache.remove(&key).await;
            Ok(String::new())
        }
        Command::Clear => {
            cache.remove_all().await;
            Ok(String::new())
        }
        Command::List => Ok(serde_json::to_string_pretty(
            &cache.disk().entries().await,
        )?),
        Command::Stats => Ok(serde_json::to_string_pretty(&cache.stats().await)?),
        Command::Cleanup => Ok(serde_json::to_string_pretty(
            &cache.disk().enforce_capacity().await,
        )?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use tempfile::tempdir;

    fn test_cache(dir: &std::path::Path) -> ImageCache {
        ImageCache::new(CacheConfig {
            cache_dir: dir.to_path_buf(),
            max_disk_capacity: 1024 * 1024,
            memory_capacity: 1024 * 1024,
            disk_format: ImageFormat::Png,
        })
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "image-cache",
            "--cache-dir",
            "/tmp/elsewhere",
            "--max-disk-bytes",
            "2048",
            "--format",
            "webp",
            "stats",
        ]);
        let config = load_config(&cli).unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/elsewhere"));
        assert_eq!(config.max_disk_capacity, 2048);
        assert_eq!(config.disk_format, ImageFormat::WebP);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let cli = Cli::parse_from(["image-cache", "--format", "bmpx", "clear"]);
        assert!(matches!(load_config(&cli), Err(CliError::Config(_))));
    }

    #[tokio::test]
    async fn test_store_fetch_remove() {
        let cache_dir = tempdir().unwrap();
        let work = tempdir().unwrap();
        let cache = test_cache(cache_dir.path());
        cache.init().await;

        let source = work.path().join("in.png");
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 255])));
        image.save(&source).unwrap();

        run(
            &cache,
            Command::Store {
                key: "k".to_string(),
                path: source,
            },
        )
        .await
        .unwrap();

        let output = work.path().join("out.png");
        run(
            &cache,
            Command::Fetch {
                key: "k".to_string(),
                output: output.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(image::open(&output).unwrap(), image);

        run(
            &cache,
            Command::Remove {
                key: "k".to_string(),
            },
        )
        .await
        .unwrap();

        let missing = run(
            &cache,
            Command::Fetch {
                key: "k".to_string(),
                output,
            },
        )
        .await;
        assert!(matches!(missing, Err(CliError::NotCached(_))));
    }

    #[tokio::test]
    async fn test_store_missing_file_is_io_error() {
        let cache_dir = tempdir().unwrap();
        let work = tempdir().unwrap();
        let cache = test_cache(cache_dir.path());
        cache.init().await;

        let result = run(
            &cache,
            Command::Store {
                key: "k".to_string(),
                path: work.path().join("absent.png"),
            },
        )
        .await;
        assert!(matches!(result, Err(CliError::Io(_))));
    }

    #[tokio::test]
    async fn test_store_undecodable_file_is_image_error() {
        let cache_dir = tempdir().unwrap();
        let work = tempdir().unwrap();
        let cache = test_cache(cache_dir.path());
        cache.init().await;

        let path = work.path().join("notes.txt");
        std::fs::write(&path, b"plain text").unwrap();

        let result = run(
            &cache,
            Command::Store {
                key: "k".to_string(),
                path,
            },
        )
        .await;
        assert!(matches!(result, Err(CliError::Image(_))));
    }

    #[test]
    fn test_lossy_format_flag_is_rejected() {
        let cli = Cli::parse_from(["image-cache", "--format", "jpg", "stats"]);
        assert!(matches!(load_config(&cli), Err(CliError::Config(_))));
    }

    #[tokio::test]
    async fn test_stats_and_list_are_json() {
        let dir = tempdir().unwrap();
        let cache = test_cache(dir.path());
        cache.init().await;
        cache.disk().put_bytes("raw", b"0123456789").await;

        let stats: serde_json::Value =
            serde_json::from_str(&run(&cache, Command::Stats).await.unwrap()).unwrap();
        assert_eq!(stats["disk"]["entries"], 1);
        assert_eq!(stats["disk"]["total_size"], 10);

        let list: serde_json::Value =
            serde_json::from_str(&run(&cache, Command::List).await.unwrap()).unwrap();
        assert_eq!(list[0]["key"], "raw");

        let report: serde_json::Value =
            serde_json::from_str(&run(&cache, Command::Cleanup).await.unwrap()).unwrap();
        assert_eq!(report["evicted"], 0);
    }
}
