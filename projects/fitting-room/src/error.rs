// Error types shared across the asset cache and the frame pipeline

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure to obtain one garment asset. Recovered by the pipeline by omitting
/// that garment from the frame.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("{stage} for {url} timed out after {timeout:?}")]
    Timeout {
        url: String,
        stage: &'static str,
        timeout: Duration,
    },

    #[error("{url} is not a valid image: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },

    #[error("background removal failed for {url}: {message}")]
    Segmentation { url: String, message: String },
}

/// Errors surfaced at the frame boundary. Only these escape `FramePipeline::process`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("frame is not a valid image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode output frame: {0}")]
    Encode(#[source] image::ImageError),
}

/// Disk-tier failures of the asset store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode asset for {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
