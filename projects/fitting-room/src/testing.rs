// In-process stand-ins for the remote collaborators, shared by unit tests

use crate::assets::remote::{BackgroundRemover, GarmentSource};
use crate::pipeline::pose::PoseEstimator;
use crate::pipeline::types::PoseLandmarkSet;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn png_of(img: &RgbImage) -> Vec<u8> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

pub fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    png_of(&RgbImage::from_pixel(width, height, Rgb(color)))
}

/// Serves fixed bodies per URL; unknown URLs fail like a refused connection.
#[derive(Default)]
pub struct FakeSource {
    pub calls: AtomicUsize,
    routes: HashMap<String, Vec<u8>>,
    delay: Duration,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, body: Vec<u8>) -> Self {
        self.routes.insert(url.to_string(), body);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GarmentSource for FakeSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.routes
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused"))
    }
}

/// Keeps every pixel and stamps a fixed alpha on it.
pub struct FakeRemover {
    pub calls: AtomicUsize,
    pub alpha: u8,
    pub fail: bool,
    pub delay: Duration,
}

impl Default for FakeRemover {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            alpha: 255,
            fail: false,
            delay: Duration::ZERO,
        }
    }
}

impl FakeRemover {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackgroundRemover for FakeRemover {
    async fn remove_background(&self, image: &RgbImage) -> Result<RgbaImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(anyhow!("model crashed"));
        }
        let alpha = self.alpha;
        Ok(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
            let [r, g, b] = image.get_pixel(x, y).0;
            image::Rgba([r, g, b, alpha])
        }))
    }
}

/// Returns the same landmarks for every frame, or fails when built with `failing`.
#[derive(Default)]
pub struct FakePose {
    pub calls: AtomicUsize,
    landmarks: Option<PoseLandmarkSet>,
    fail: bool,
}

impl FakePose {
    pub fn detecting(landmarks: PoseLandmarkSet) -> Self {
        Self {
            landmarks: Some(landmarks),
            ..Self::default()
        }
    }

    pub fn nobody() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl PoseEstimator for FakePose {
    async fn detect(&self, _frame: &RgbImage) -> Result<Option<PoseLandmarkSet>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("pose service unavailable"));
        }
        Ok(self.landmarks.clone())
    }
}
