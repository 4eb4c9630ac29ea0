// Remote collaborators used while acquiring garments: the image host and the
// background-removal service.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::{ImageFormat, RgbImage, RgbaImage};
use reqwest::{multipart, Client};
use std::io::Cursor;
use std::time::Duration;

/// Where garment images are downloaded from.
#[async_trait]
pub trait GarmentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Turns an opaque garment photo into a cutout with a transparent background.
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    async fn remove_background(&self, image: &RgbImage) -> Result<RgbaImage>;
}

pub struct HttpGarmentSource {
    client: Client,
}

impl HttpGarmentSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fitting-room/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl GarmentSource for HttpGarmentSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Client for a remove.bg-compatible endpoint: the image goes up as the
/// `image_file` multipart field and the cutout comes back as PNG bytes.
pub struct RemoteBackgroundRemover {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RemoteBackgroundRemover {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl BackgroundRemover for RemoteBackgroundRemover {
    async fn remove_background(&self, image: &RgbImage) -> Result<RgbaImage> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let part = multipart::Part::bytes(png)
            .file_name("garment.png")
            .mime_str("image/png")?;
        let form = multipart::Form::new()
            .part("image_file", part)
            .text("size", "auto");

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("segmenter returned {}: {}", status, body));
        }

        let bytes = response.bytes().await?;
        let cutout = image::load_from_memory(&bytes).context("segmenter returned an invalid image")?;
        Ok(cutout.to_rgba8())
    }
}

/// Fallback used when no segmenter is configured: treats near-white pixels as
/// background. Good enough for catalogue shots on a plain backdrop.
pub struct BackdropKeyRemover {
    pub threshold: u8,
}

impl Default for BackdropKeyRemover {
    fn default() -> Self {
        Self { threshold: 235 }
    }
}

#[async_trait]
impl BackgroundRemover for BackdropKeyRemover {
    async fn remove_background(&self, image: &RgbImage) -> Result<RgbaImage> {
        let threshold = self.threshold;
        Ok(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
            let [r, g, b] = image.get_pixel(x, y).0;
            let alpha = if r >= threshold && g >= threshold && b >= threshold {
                0
            } else {
                255
            };
            image::Rgba([r, g, b, alpha])
        }))
    }
}
