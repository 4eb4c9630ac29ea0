mod assets;
mod cli;
mod error;
mod pipeline;
#[cfg(test)]
mod testing;
mod web;

use anyhow::{Context, Result};
use assets::acquire::{AcquireConfig, AssetAcquirer};
use assets::remote::{BackdropKeyRemover, BackgroundRemover, HttpGarmentSource, RemoteBackgroundRemover};
use assets::store::AssetStore;
use cli::Args;
use pipeline::frame::{FramePipeline, PipelineConfig};
use pipeline::pose::{NoPoseEstimator, PoseEstimator, RemotePoseEstimator};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use web::api::AppState;
use web::server::run_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse_args();

    let store = AssetStore::open(&args.cache_dir, args.cache_capacity)
        .with_context(|| format!("Failed to open cache at {:?}", args.cache_dir))?;
    let stats = store.stats();
    info!(
        "Cache at {:?}: {} garments on disk, memory capacity {}",
        store.root(),
        stats.disk_files,
        stats.capacity
    );

    let acquire_config = AcquireConfig {
        fetch_timeout: Duration::from_secs(args.fetch_timeout_secs),
        segment_timeout: Duration::from_secs(args.segment_timeout_secs),
    };

    let source = Arc::new(HttpGarmentSource::new(acquire_config.fetch_timeout)?);
    let remover: Arc<dyn BackgroundRemover> = match &args.segmenter_url {
        Some(url) => {
            info!("Background removal via {}", url);
            Arc::new(RemoteBackgroundRemover::new(
                url.clone(),
                args.segmenter_api_key.clone(),
                acquire_config.segment_timeout,
            )?)
        }
        None => {
            warn!("No segmenter configured, keying out white backdrops locally");
            Arc::new(BackdropKeyRemover::default())
        }
    };
    let pose: Arc<dyn PoseEstimator> = match &args.pose_url {
        Some(url) => {
            info!("Pose estimation via {}", url);
            Arc::new(RemotePoseEstimator::new(
                url.clone(),
                Duration::from_secs(args.pose_timeout_secs),
            )?)
        }
        None => {
            warn!("No pose estimator configured, frames will be returned undressed");
            Arc::new(NoPoseEstimator)
        }
    };

    let acquirer = Arc::new(AssetAcquirer::new(
        Arc::new(store),
        source,
        remover,
        acquire_config,
    ));
    let pipeline = Arc::new(FramePipeline::new(
        acquirer,
        pose,
        PipelineConfig {
            jpeg_quality: args.jpeg_quality,
        },
    ));

    run_server(args.host, args.port, AppState::new(pipeline)).await?;

    Ok(())
}
