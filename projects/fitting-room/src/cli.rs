use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to bind to
    #[arg(long, default_value_t = 5001)]
    pub port: u16,

    /// Directory holding processed garment PNGs
    #[arg(long, env = "FITTING_ROOM_CACHE_DIR", default_value = "cache_images")]
    pub cache_dir: PathBuf,

    /// Number of garments kept decoded in memory
    #[arg(long, env = "FITTING_ROOM_CACHE_CAPACITY", default_value_t = 100)]
    pub cache_capacity: usize,

    /// Garment download timeout
    #[arg(long, default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Background removal timeout
    #[arg(long, default_value_t = 30)]
    pub segment_timeout_secs: u64,

    /// Pose estimation timeout
    #[arg(long, default_value_t = 5)]
    pub pose_timeout_secs: u64,

    /// Quality of the JPEG frames sent back to clients
    #[arg(long, default_value_t = 80, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: u8,

    /// Pose estimation endpoint; without it frames are returned undressed
    #[arg(long, env = "FITTING_ROOM_POSE_URL")]
    pub pose_url: Option<String>,

    /// remove.bg-compatible endpoint; without it a white-backdrop key is used
    #[arg(long, env = "FITTING_ROOM_SEGMENTER_URL")]
    pub segmenter_url: Option<String>,

    #[arg(long, env = "FITTING_ROOM_SEGMENTER_API_KEY", hide_env_values = true)]
    pub segmenter_api_key: Option<String>,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
