// Per-frame try-on pipeline: decode, detect pose, gather garments, composite, encode.

use crate::assets::acquire::AssetAcquirer;
use crate::assets::GarmentAsset;
use crate::error::PipelineError;
use crate::pipeline::anchor;
use crate::pipeline::composite::{composite, BlendOutcome};
use crate::pipeline::pose::PoseEstimator;
use crate::pipeline::types::{Category, FrameStatus, GarmentRequest, PoseLandmarkSet, ProcessedFrame};
use futures::future::join_all;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// At most one garment per category.
pub type Wardrobe = BTreeMap<Category, Arc<GarmentAsset>>;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { jpeg_quality: 80 }
    }
}

pub struct FramePipeline {
    acquirer: Arc<AssetAcquirer>,
    pose: Arc<dyn PoseEstimator>,
    config: PipelineConfig,
}

impl FramePipeline {
    pub fn new(
        acquirer: Arc<AssetAcquirer>,
        pose: Arc<dyn PoseEstimator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            acquirer,
            pose,
            config,
        }
    }

    pub fn acquirer(&self) -> &Arc<AssetAcquirer> {
        &self.acquirer
    }

    pub fn pose_backend(&self) -> &'static str {
        self.pose.name()
    }

    /// Dresses one camera frame. Only an undecodable input frame or a failing
    /// encoder is an error; every other problem degrades to returning the
    /// frame with fewer (or no) garments on it.
    pub async fn process(
        &self,
        raw: &[u8],
        garments: &[GarmentRequest],
    ) -> Result<ProcessedFrame, PipelineError> {
        let start = Instant::now();
        let frame = image::load_from_memory(raw)
            .map_err(PipelineError::Decode)?
            .to_rgb8();

        let landmarks = match self.pose.detect(&frame).await {
            Ok(Some(landmarks)) if !landmarks.is_empty() => landmarks,
            Ok(_) => return self.finish(&frame, FrameStatus::NoBodyDetected, Vec::new()),
            Err(e) => {
                warn!("Pose estimation failed: {:#}", e);
                return self.finish(&frame, FrameStatus::Degraded, Vec::new());
            }
        };

        let wardrobe = self.gather(garments).await;
        if wardrobe.is_empty() {
            return self.finish(&frame, FrameStatus::Ok, Vec::new());
        }

        let dressed = tokio::task::spawn_blocking(move || {
            let mut frame = frame;
            let applied = dress(&mut frame, &landmarks, &wardrobe);
            (frame, applied)
        })
        .await;

        match dressed {
            Ok((frame, applied)) => {
                debug!(
                    "Frame dressed with {:?} in {:.1}ms",
                    applied,
                    start.elapsed().as_secs_f64() * 1000.0
                );
                self.finish(&frame, FrameStatus::Ok, applied)
            }
            Err(e) => {
                // The frame moved into the failed task; start again from the input
                warn!("Compositing task failed: {}", e);
                let frame = image::load_from_memory(raw)
                    .map_err(PipelineError::Decode)?
                    .to_rgb8();
                self.finish(&frame, FrameStatus::Degraded, Vec::new())
            }
        }
    }

    /// Acquires every requested garment concurrently. Unknown categories and
    /// failed acquisitions are logged and left out.
    async fn gather(&self, garments: &[GarmentRequest]) -> Wardrobe {
        let mut wanted: BTreeMap<Category, &GarmentRequest> = BTreeMap::new();
        for garment in garments {
            match garment.category.parse::<Category>() {
                // Later entries win
                Ok(category) => {
                    wanted.insert(category, garment);
                }
                Err(e) => warn!("Skipping garment {}: {}", garment.image_url, e),
            }
        }

        let results = join_all(wanted.into_iter().map(|(category, garment)| async move {
            let result = self.acquirer.acquire(garment.preferred_url(), false).await;
            (category, result)
        }))
        .await;

        let mut wardrobe = Wardrobe::new();
        for (category, result) in results {
            match result {
                Ok(asset) => {
                    wardrobe.insert(category, asset);
                }
                Err(e) => warn!("Leaving {} out of frame: {}", category, e),
            }
        }
        wardrobe
    }

    fn finish(
        &self,
        frame: &RgbImage,
        status: FrameStatus,
        applied: Vec<Category>,
    ) -> Result<ProcessedFrame, PipelineError> {
        Ok(ProcessedFrame {
            bytes: encode_jpeg(frame, self.config.jpeg_quality)?,
            status,
            applied,
        })
    }
}

/// Paints the wardrobe onto `frame` back to front and returns the categories
/// that actually landed on it.
pub fn dress(frame: &mut RgbImage, landmarks: &PoseLandmarkSet, wardrobe: &Wardrobe) -> Vec<Category> {
    let frame_size = frame.dimensions();
    let mut applied = Vec::new();

    for category in Category::DRAW_ORDER {
        let Some(asset) = wardrobe.get(&category) else {
            continue;
        };
        let Some(placement) = anchor::resolve(
            category,
            Some(landmarks),
            frame_size,
            (asset.width(), asset.height()),
        ) else {
            debug!("No anchor for {} on this frame", category);
            continue;
        };

        match composite(frame, &asset.pixels, &placement) {
            BlendOutcome::Blended { .. } => {
                debug!(
                    "{} anchored at ({:.0}, {:.0})",
                    category, placement.center.0, placement.center.1
                );
                applied.push(category);
            }
            other => debug!("{} ({}) not drawn: {:?}", category, asset.source_id, other),
        }
    }

    applied
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(frame)
        .map_err(PipelineError::Encode)?;
    Ok(out)
}
