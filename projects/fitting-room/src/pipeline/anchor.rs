// Anchor resolution: landmark set + garment category -> placement rectangle

use crate::pipeline::types::{Category, Landmark, Placement, PoseLandmarkSet};

/// Anchor spans at or below this many pixels are treated as degenerate
/// (occluded body part, extreme angle) and the garment is skipped.
pub const MIN_BODY_WIDTH_PX: f32 = 20.0;

/// Placements longer than this many times the frame's longer side come from
/// landmarks far outside the frame and are skipped.
pub const MAX_FRAME_MULTIPLE: f32 = 4.0;

/// Placement policy for one category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorRule {
    /// Midpoint is the garment centre; distance is the body width it scales with.
    pub pair: (Landmark, Landmark),
    pub scale: f32,
    /// Fraction of the garment height to shift it by; negative moves it up.
    pub vertical_offset: f32,
}

const SHOULDERS: (Landmark, Landmark) = (Landmark::LeftShoulder, Landmark::RightShoulder);
const HIPS: (Landmark, Landmark) = (Landmark::LeftHip, Landmark::RightHip);
const ANKLES: (Landmark, Landmark) = (Landmark::LeftAnkle, Landmark::RightAnkle);
const NOSE: (Landmark, Landmark) = (Landmark::Nose, Landmark::Nose);

pub const ANCHOR_TABLE: [(Category, AnchorRule); 5] = [
    (
        Category::Top,
        AnchorRule {
            pair: SHOULDERS,
            scale: 1.7,
            vertical_offset: -0.15,
        },
    ),
    (
        Category::Bottom,
        AnchorRule {
            pair: HIPS,
            scale: 1.5,
            vertical_offset: -0.10,
        },
    ),
    (
        Category::Footwear,
        AnchorRule {
            pair: ANKLES,
            scale: 1.1,
            vertical_offset: -0.40,
        },
    ),
    (
        Category::Outerwear,
        AnchorRule {
            pair: SHOULDERS,
            scale: 1.8,
            vertical_offset: -0.20,
        },
    ),
    // A single point has no span, so the degenerate guard always skips accessories.
    (
        Category::Accessory,
        AnchorRule {
            pair: NOSE,
            scale: 1.2,
            vertical_offset: -0.30,
        },
    ),
];

pub fn anchor_rule(category: Category) -> &'static AnchorRule {
    ANCHOR_TABLE
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, rule)| rule)
        .unwrap_or(&ANCHOR_TABLE[0].1)
}

fn pixel_pair(
    landmarks: &PoseLandmarkSet,
    pair: (Landmark, Landmark),
    frame_size: (u32, u32),
) -> Option<((f32, f32), (f32, f32))> {
    let (w, h) = frame_size;
    let a = landmarks.get(pair.0)?.to_pixels(w, h);
    let b = landmarks.get(pair.1)?.to_pixels(w, h);
    Some((a, b))
}

/// Computes where a garment of `asset_size` goes on a frame of `frame_size`.
///
/// Returns `None` when there is no body, a required landmark is missing, the
/// body span is degenerate, or the resulting rectangle would be empty or far
/// larger than the frame.
/// The garment keeps the asset's aspect ratio regardless of body proportions.
pub fn resolve(
    category: Category,
    landmarks: Option<&PoseLandmarkSet>,
    frame_size: (u32, u32),
    asset_size: (u32, u32),
) -> Option<Placement> {
    let landmarks = landmarks?;
    let rule = anchor_rule(category);
    let (asset_w, asset_h) = asset_size;
    if asset_w == 0 || asset_h == 0 {
        return None;
    }

    let (p1, p2) = pixel_pair(landmarks, rule.pair, frame_size)?;
    let body_width = (p1.0 - p2.0).hypot(p1.1 - p2.1);
    if body_width <= MIN_BODY_WIDTH_PX {
        return None;
    }
    let center = ((p1.0 + p2.0) / 2.0, (p1.1 + p2.1) / 2.0);

    let width = (body_width * rule.scale).round();
    let height = (width * asset_h as f32 / asset_w as f32).round();
    let limit = MAX_FRAME_MULTIPLE * frame_size.0.max(frame_size.1) as f32;
    if !(1.0..=limit).contains(&width) || !(1.0..=limit).contains(&height) {
        return None;
    }

    let x = (center.0 - width / 2.0).round() as i32;
    let y = (center.1 + height * rule.vertical_offset - height / 2.0).round() as i32;

    Some(Placement {
        x,
        y,
        width: width as u32,
        height: height as u32,
        center,
    })
}
