use crate::assets::store::CacheStats;
use crate::assets::CacheKey;
use crate::error::PipelineError;
use crate::pipeline::frame::FramePipeline;
use crate::pipeline::types::{Category, GarmentRequest};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct AppState {
    pub pipeline: Arc<FramePipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<FramePipeline>) -> Arc<Self> {
        Arc::new(Self { pipeline })
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub pose: String,
    pub cache_size: usize,
    pub cache_disk_files: usize,
    pub cache_capacity: usize,
}

#[derive(Deserialize)]
pub struct ProcessFrameRequest {
    pub frame: String,
    #[serde(default)]
    pub clothes: Vec<GarmentRequest>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProcessFrameResponse {
    pub success: bool,
    pub frame: String,
    pub fps_hint: String,
}

#[derive(Deserialize)]
pub struct ProcessClothingRequest {
    #[serde(rename = "imageURL")]
    pub image_url: String,
    pub category: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProcessClothingResponse {
    pub success: bool,
    pub cache_key: String,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "originalURL")]
    pub original_url: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ClearCacheResponse {
    pub status: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct FailureResponse {
    pub success: bool,
    pub error: String,
}

fn failure(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<FailureResponse>) {
    (
        status,
        Json(FailureResponse {
            success: false,
            error: message.into(),
        }),
    )
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store = state.pipeline.acquirer().store().clone();
    let capacity = store.capacity();
    let stats = tokio::task::spawn_blocking(move || store.stats())
        .await
        .unwrap_or(CacheStats {
            memory_entries: 0,
            disk_files: 0,
            capacity,
        });

    Json(HealthResponse {
        status: "ok".to_string(),
        pose: state.pipeline.pose_backend().to_string(),
        cache_size: stats.memory_entries,
        cache_disk_files: stats.disk_files,
        cache_capacity: stats.capacity,
    })
}

pub async fn process_frame(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ProcessFrameRequest>,
) -> Result<Json<ProcessFrameResponse>, (StatusCode, Json<FailureResponse>)> {
    let raw = STANDARD
        .decode(payload.frame.trim())
        .map_err(|e| failure(StatusCode::BAD_REQUEST, format!("frame is not valid base64: {}", e)))?;

    match state.pipeline.process(&raw, &payload.clothes).await {
        Ok(processed) => Ok(Json(ProcessFrameResponse {
            success: true,
            frame: STANDARD.encode(&processed.bytes),
            fps_hint: processed.status.as_str().to_string(),
        })),
        Err(e @ PipelineError::Decode(_)) => Err(failure(StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => {
            error!("Frame processing failed: {}", e);
            Err(failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Runs a garment through download and background removal ahead of time so
/// the first frame that wears it is served from cache.
pub async fn process_clothing(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ProcessClothingRequest>,
) -> Result<Json<ProcessClothingResponse>, (StatusCode, Json<FailureResponse>)> {
    if let Err(e) = payload.category.parse::<Category>() {
        warn!("{} (garment {})", e, payload.image_url);
    }
    info!("Processing garment {} ({})", payload.image_url, payload.category);

    match state.pipeline.acquirer().acquire(&payload.image_url, true).await {
        Ok(asset) => Ok(Json(ProcessClothingResponse {
            success: true,
            cache_key: CacheKey::from_url(&payload.image_url).to_string(),
            width: asset.width(),
            height: asset.height(),
            original_url: payload.image_url,
        })),
        Err(e) => {
            error!("Garment processing failed: {}", e);
            Err(failure(StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClearCacheResponse>, (StatusCode, Json<FailureResponse>)> {
    let store = state.pipeline.acquirer().store().clone();
    let cleared = tokio::task::spawn_blocking(move || store.clear())
        .await
        .map_err(|e| failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    match cleared {
        Ok(removed) => {
            info!("Cache cleared, {} files removed", removed);
            Ok(Json(ClearCacheResponse {
                status: "ok".to_string(),
                message: format!("Cache cleared ({} files removed)", removed),
            }))
        }
        Err(e) => {
            error!("Failed to clear cache: {}", e);
            Err(failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

pub async fn not_found() -> impl IntoResponse {
    failure(StatusCode::NOT_FOUND, "no such endpoint")
}
