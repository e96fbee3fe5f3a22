use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use imgcache::{
    cache::CacheStore,
    errors::AppError,
    config::Config,
    database::Database,
    params::{ResizeMode, TransformOp, TransformRequest},
    services::{IngestService, TransformPipeline, VersioningService},
    storage::ImageStore,
    transform::ImageBackend,
};

#[derive(Parser)]
#[command(name = "imgcache")]
#[command(version = "0.1.0")]
#[command(about = "Content-addressed image transformation cache with versioning")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Cache store URL (overrides config file)
    #[arg(short = 'r', long, value_name = "URL")]
    cache_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register an image file as a new original
    Ingest {
        /// Path to the image file
        file: String,
        /// Owning user id
        #[arg(long)]
        user_id: Option<Uuid>,
    },
    /// Download and register an image from a URL
    IngestUrl {
        url: String,
        #[arg(long)]
        user_id: Option<Uuid>,
    },
    /// Apply transformations to a registered original
    Transform {
        /// Original image id
        original_id: Uuid,
        #[arg(long)]
        grayscale: bool,
        #[arg(long, value_name = "RADIUS")]
        blur: Option<f32>,
        #[arg(long, value_name = "DEGREES")]
        rotate: Option<i32>,
        #[arg(long, value_name = "PIXELS")]
        resize_width: Option<i32>,
        #[arg(long, value_name = "PIXELS")]
        resize_height: Option<i32>,
        /// Resize mode: fit or stretch
        #[arg(long, default_value = "fit")]
        resize_mode: String,
        #[arg(long)]
        remove_background: bool,
        #[arg(long)]
        user_id: Option<Uuid>,
    },
    /// List the versions of one original
    Versions { original_id: Uuid },
    /// Show recently ingested originals
    History {
        #[arg(long, default_value = "10")]
        limit: i64,
    },
    /// Show cache statistics
    Stats,
    /// Clear volatile cache entries (the durable store is untouched)
    Clear {
        /// Only drop version mirrors, keep the hash tiers
        #[arg(long)]
        versions_only: bool,
        /// Restrict to one original image
        #[arg(long)]
        original_id: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("imgcache={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    if let Some(cache_url) = cli.cache_url {
        config.cache.url = cache_url;
    }

    let db = Database::new(&config.database).await?;
    db.migrate().await?;

    let cache = CacheStore::new(&config.cache.url, config.cache.op_timeout_ms)?;
    let store = ImageStore::new(
        config.storage.originals_path.clone(),
        config.storage.processed_path.clone(),
    );
    store.ensure_storage_dirs().await?;

    let ingest = IngestService::new(db.clone(), store.clone());
    let versioning =
        VersioningService::new(db.clone(), cache.clone(), config.cache.version_ttl_secs);
    let pipeline = TransformPipeline::new(
        db.clone(),
        cache.clone(),
        versioning.clone(),
        store,
        Arc::new(ImageBackend),
        config.cache.similarity_threshold,
    );

    match cli.command {
        Command::Ingest { file, user_id } => {
            let data = tokio::fs::read(&file).await?;
            let original = ingest.register_upload(&data, &file, user_id).await?;
            println!("{} {}", original.id, original.file_path);
        }
        Command::IngestUrl { url, user_id } => {
            let original = ingest.register_from_url(&url, user_id).await?;
            println!("{} {}", original.id, original.file_path);
        }
        Command::Transform {
            original_id,
            grayscale,
            blur,
            rotate,
            resize_width,
            resize_height,
            resize_mode,
            remove_background,
            user_id,
        } => {
            let mut ops = Vec::new();
            if remove_background {
                ops.push(TransformOp::RemoveBackground);
            }
            if resize_width.is_some() || resize_height.is_some() {
                let mode = match resize_mode.as_str() {
                    "fit" => ResizeMode::Fit,
                    "stretch" => ResizeMode::Stretch,
                    other => anyhow::bail!("unrecognized resize mode: {}", other),
                };
                ops.push(TransformOp::Resize {
                    width: resize_width,
                    height: resize_height,
                    mode,
                });
            }
            if let Some(angle) = rotate {
                ops.push(TransformOp::Rotate { angle });
            }
            if grayscale {
                ops.push(TransformOp::Grayscale);
            }
            if let Some(radius) = blur {
                ops.push(TransformOp::Blur { radius });
            }

            let original = ingest.get_original(original_id).await?;
            let request = TransformRequest::new(ops);
            let outcome = pipeline.transform(&original, &request, user_id).await?;
            info!(
                "version {} cached={} artifact={}",
                outcome.version.version_number,
                outcome.was_cached,
                outcome.artifact_path()
            );
            println!("{}", outcome.artifact_path());
        }
        Command::Versions { original_id } => {
            for version in versioning.list_versions(original_id).await? {
                println!(
                    "v{}\t{}\t{}",
                    version.version_number, version.file_path, version.operation_params
                );
            }
        }
        Command::History { limit } => {
            for original in ingest.recent_originals(limit).await? {
                println!(
                    "{}\t{}\t{} versions\t{}",
                    original.id,
                    original.file_path,
                    original.version_count,
                    original.created_at.to_rfc3339()
                );
            }
        }
        Command::Stats => {
            let stats = cache.stats().await.map_err(AppError::Cache)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Clear {
            versions_only,
            original_id,
        } => {
            let deleted = if versions_only || original_id.is_some() {
                cache.clear_versions(original_id).await
            } else {
                cache.clear_all().await
            }
            .map_err(AppError::Cache)?;
            println!("Removed {} cache entries", deleted);
        }
    }

    Ok(())
}
