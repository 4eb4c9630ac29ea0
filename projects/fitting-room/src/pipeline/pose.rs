// Pose estimation backends

use crate::pipeline::types::{Landmark, Point, PoseLandmarkSet};
use anyhow::{Context, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Landmarks reported below this visibility are treated as not detected.
pub const MIN_VISIBILITY: f32 = 0.5;

/// Finds the body in a frame. `Ok(None)` means nobody is in view, which is
/// not an error.
#[async_trait]
pub trait PoseEstimator: Send + Sync {
    async fn detect(&self, frame: &RgbImage) -> Result<Option<PoseLandmarkSet>>;

    /// Short label reported by the health endpoint.
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Used when no pose model is configured: frames pass through undressed.
pub struct NoPoseEstimator;

#[async_trait]
impl PoseEstimator for NoPoseEstimator {
    async fn detect(&self, _frame: &RgbImage) -> Result<Option<PoseLandmarkSet>> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[derive(Debug, Deserialize)]
struct WireLandmark {
    x: f32,
    y: f32,
    #[serde(default = "fully_visible")]
    visibility: f32,
}

fn fully_visible() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    landmarks: Option<Vec<WireLandmark>>,
}

/// Parses a pose service reply. Landmarks are indexed in BlazePose order; an
/// absent or null list means no body was found.
pub fn parse_landmarks(body: &[u8]) -> Result<Option<PoseLandmarkSet>> {
    let reply: WireResponse =
        serde_json::from_slice(body).context("pose service returned malformed JSON")?;
    let Some(raw) = reply.landmarks else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }

    let mut set = PoseLandmarkSet::new();
    for landmark in Landmark::ALL {
        if let Some(wire) = raw.get(landmark.pose_index()) {
            if wire.visibility >= MIN_VISIBILITY {
                set.insert(landmark, Point { x: wire.x, y: wire.y });
            }
        }
    }
    Ok(Some(set))
}

/// Sends each frame as JPEG to an HTTP pose model and reads back landmarks.
pub struct RemotePoseEstimator {
    client: Client,
    endpoint: String,
}

impl RemotePoseEstimator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl PoseEstimator for RemotePoseEstimator {
    async fn detect(&self, frame: &RgbImage) -> Result<Option<PoseLandmarkSet>> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 85).encode_image(frame)?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        let landmarks = parse_landmarks(&body)?;
        debug!(
            "Pose service found {} landmarks",
            landmarks.as_ref().map(|l| l.len()).unwrap_or(0)
        );
        Ok(landmarks)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_with(visibility: impl Fn(usize) -> f32) -> String {
        let points: Vec<String> = (0..33)
            .map(|i| {
                format!(
                    r#"{{"x":{},"y":0.5,"visibility":{}}}"#,
                    i as f32 / 64.0,
                    visibility(i)
                )
            })
            .collect();
        format!(r#"{{"landmarks":[{}]}}"#, points.join(","))
    }

    #[test]
    fn test_parse_full_reply() {
        let set = parse_landmarks(reply_with(|_| 0.9).as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(set.len(), Landmark::ALL.len());
        assert_eq!(set.get(Landmark::LeftShoulder).unwrap().x, 11.0 / 64.0);
        assert_eq!(set.get(Landmark::RightAnkle).unwrap().x, 28.0 / 64.0);
    }

    #[test]
    fn test_low_visibility_points_are_dropped() {
        let body = reply_with(|i| if i == 27 || i == 28 { 0.1 } else { 0.99 });
        let set = parse_landmarks(body.as_bytes()).unwrap().unwrap();
        assert!(set.get(Landmark::LeftAnkle).is_none());
        assert!(set.get(Landmark::RightAnkle).is_none());
        assert!(set.get(Landmark::LeftHip).is_some());
    }

    #[test]
    fn test_missing_visibility_counts_as_visible() {
        let set = parse_landmarks(br#"{"landmarks":[{"x":0.5,"y":0.25}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(set.get(Landmark::Nose), Some(Point { x: 0.5, y: 0.25 }));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_no_body() {
        assert!(parse_landmarks(br#"{"landmarks":null}"#).unwrap().is_none());
        assert!(parse_landmarks(br#"{"landmarks":[]}"#).unwrap().is_none());
        assert!(parse_landmarks(b"{}").unwrap().is_none());
    }

    #[test]
    fn test_malformed_reply_is_error() {
        assert!(parse_landmarks(b"<html>").is_err());
    }

    #[tokio::test]
    async fn test_disabled_estimator_sees_nobody() {
        let frame = RgbImage::new(8, 8);
        assert!(NoPoseEstimator.detect(&frame).await.unwrap().is_none());
        assert_eq!(NoPoseEstimator.name(), "disabled");
    }
}
