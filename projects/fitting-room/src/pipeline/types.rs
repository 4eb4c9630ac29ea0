use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A 2D point in normalized coordinates [0, 1]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    /// Scales a normalized point into frame pixel space.
    pub fn to_pixels(self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

/// Garment categories, listed in the order they are painted (back to front).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Footwear,
    Bottom,
    Top,
    Outerwear,
    Accessory,
}

impl Category {
    /// Back-to-front draw order: later entries occlude earlier ones.
    pub const DRAW_ORDER: [Category; 5] = [
        Category::Footwear,
        Category::Bottom,
        Category::Top,
        Category::Outerwear,
        Category::Accessory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Footwear => "footwear",
            Category::Bottom => "bottom",
            Category::Top => "top",
            Category::Outerwear => "outerwear",
            Category::Accessory => "accessory",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Clients send capitalised names ("Top", "Footwear"), so matching ignores case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "footwear" => Ok(Category::Footwear),
            "bottom" => Ok(Category::Bottom),
            "top" => Ok(Category::Top),
            "outerwear" => Ok(Category::Outerwear),
            "accessory" => Ok(Category::Accessory),
            other => Err(format!("unknown garment category: {}", other)),
        }
    }
}

/// Named body keypoints, numbered as in the 33-point BlazePose topology.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Landmark {
    Nose,
    LeftShoulder,
    RightShoulder,
    LeftHip,
    RightHip,
    LeftAnkle,
    RightAnkle,
}

impl Landmark {
    pub const ALL: [Landmark; 7] = [
        Landmark::Nose,
        Landmark::LeftShoulder,
        Landmark::RightShoulder,
        Landmark::LeftHip,
        Landmark::RightHip,
        Landmark::LeftAnkle,
        Landmark::RightAnkle,
    ];

    pub fn pose_index(&self) -> usize {
        match self {
            Landmark::Nose => 0,
            Landmark::LeftShoulder => 11,
            Landmark::RightShoulder => 12,
            Landmark::LeftHip => 23,
            Landmark::RightHip => 24,
            Landmark::LeftAnkle => 27,
            Landmark::RightAnkle => 28,
        }
    }
}

/// Landmarks detected for one frame, in normalized frame-relative coordinates.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PoseLandmarkSet {
    points: BTreeMap<Landmark, Point>,
}

impl PoseLandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, landmark: Landmark, point: Point) -> Self {
        self.insert(landmark, point);
        self
    }

    pub fn insert(&mut self, landmark: Landmark, point: Point) {
        self.points.insert(landmark, point);
    }

    pub fn get(&self, landmark: Landmark) -> Option<Point> {
        self.points.get(&landmark).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Placement of one garment on one frame, in pixels.
/// `x`/`y` are the top-left corner and may be negative or past the frame edge.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub center: (f32, f32),
}

/// One garment requested by the client for a frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GarmentRequest {
    #[serde(rename = "imageURL")]
    pub image_url: String,
    #[serde(rename = "processedImageURL", default)]
    pub processed_image_url: Option<String>,
    pub category: String,
}

impl GarmentRequest {
    /// The pre-processed cutout is preferred when the caller has one.
    pub fn preferred_url(&self) -> &str {
        match self.processed_image_url.as_deref() {
            Some(url) if !url.trim().is_empty() => url,
            _ => &self.image_url,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    Ok,
    NoBodyDetected,
    /// Something failed after decoding; the frame is returned untouched.
    Degraded,
}

impl FrameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameStatus::Ok => "ok",
            FrameStatus::NoBodyDetected => "no_body_detected",
            FrameStatus::Degraded => "degraded",
        }
    }
}

/// Encoded output of one pipeline invocation
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub bytes: Vec<u8>,
    pub status: FrameStatus,
    /// Categories actually painted, in draw order.
    pub applied: Vec<Category>,
}
