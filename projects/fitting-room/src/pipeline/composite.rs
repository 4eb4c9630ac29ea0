// Alpha compositing of garment cutouts onto an opaque frame

use crate::pipeline::types::Placement;
use image::imageops::{self, FilterType};
use image::{GenericImageView, RgbImage, RgbaImage};

/// What `composite` did with an overlay. Every variant except `Blended`
/// leaves the destination untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOutcome {
    Blended { width: u32, height: u32 },
    OffFrame,
    Degenerate,
    ShapeMismatch,
}

/// Pixel-space intersection of an overlay rectangle with the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Clip {
    dst_x: u32,
    dst_y: u32,
    src_x: u32,
    src_y: u32,
    dst_w: u32,
    dst_h: u32,
    src_w: u32,
    src_h: u32,
}

fn clip(frame_w: u32, frame_h: u32, placement: &Placement) -> Option<Clip> {
    let (w, h) = (frame_w as i64, frame_h as i64);
    let (x, y) = (placement.x as i64, placement.y as i64);
    let (ow, oh) = (placement.width as i64, placement.height as i64);

    if x >= w || y >= h || x + ow <= 0 || y + oh <= 0 {
        return None;
    }

    let (x1, y1) = (x.max(0), y.max(0));
    let (x2, y2) = ((x + ow).min(w), (y + oh).min(h));
    let (ox1, oy1) = ((-x).max(0), (-y).max(0));
    let (ox2, oy2) = (ow.min(w - x), oh.min(h - y));

    Some(Clip {
        dst_x: x1 as u32,
        dst_y: y1 as u32,
        src_x: ox1 as u32,
        src_y: oy1 as u32,
        dst_w: (x2 - x1).max(0) as u32,
        dst_h: (y2 - y1).max(0) as u32,
        src_w: (ox2 - ox1).max(0) as u32,
        src_h: (oy2 - oy1).max(0) as u32,
    })
}

/// One axis of the overlay window behind a visible span of the placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisWindow {
    /// First overlay pixel in the window.
    start: u32,
    /// Overlay pixels in the window.
    len: u32,
    /// Window length once scaled to placement pixels.
    scaled: u32,
    /// Placement coordinate the scaled window starts at.
    offset: u32,
}

impl AxisWindow {
    /// Maps placement pixels `[visible, visible + count)` on an axis `placed`
    /// pixels long back onto an overlay axis `source` pixels long.
    fn new(source: u32, placed: u32, visible: u32, count: u32) -> Self {
        let scale = source as f64 / placed as f64;
        let start = ((visible as f64 * scale).floor() as u32).min(source - 1);
        let end = (((visible + count) as f64 * scale).ceil() as u32).clamp(start + 1, source);
        let len = end - start;
        Self {
            start,
            len,
            scaled: (len as f64 / scale).round().max(1.0) as u32,
            offset: (start as f64 / scale).round() as u32,
        }
    }
}

#[inline]
fn blend_channel(overlay: u8, dst: u8, alpha: f32) -> u8 {
    (alpha * overlay as f32 + (1.0 - alpha) * dst as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Paints `overlay`, resized to `placement`, over `dst` using the overlay's
/// alpha channel. Parts of the rectangle outside the frame are clipped away.
/// Never fails: unusable geometry leaves `dst` as it was.
pub fn composite(dst: &mut RgbImage, overlay: &RgbaImage, placement: &Placement) -> BlendOutcome {
    if placement.width == 0
        || placement.height == 0
        || overlay.width() == 0
        || overlay.height() == 0
    {
        return BlendOutcome::Degenerate;
    }

    let Some(region) = clip(dst.width(), dst.height(), placement) else {
        return BlendOutcome::OffFrame;
    };
    if region.dst_w != region.src_w || region.dst_h != region.src_h {
        return BlendOutcome::ShapeMismatch;
    }
    if region.dst_w == 0 || region.dst_h == 0 {
        return BlendOutcome::Degenerate;
    }

    // Only the visible part of the overlay is resampled
    let (window, off_x, off_y) = if overlay.dimensions() == (placement.width, placement.height) {
        (None, 0, 0)
    } else {
        let x = AxisWindow::new(overlay.width(), placement.width, region.src_x, region.dst_w);
        let y = AxisWindow::new(overlay.height(), placement.height, region.src_y, region.dst_h);
        let view = overlay.view(x.start, y.start, x.len, y.len);
        let resized = imageops::resize(&*view, x.scaled, y.scaled, FilterType::Triangle);
        (Some(resized), x.offset, y.offset)
    };
    let src = window.as_ref().unwrap_or(overlay);
    let (max_x, max_y) = (src.width() - 1, src.height() - 1);

    for row in 0..region.dst_h {
        for col in 0..region.dst_w {
            let sx = (region.src_x + col).saturating_sub(off_x).min(max_x);
            let sy = (region.src_y + row).saturating_sub(off_y).min(max_y);
            let s = src.get_pixel(sx, sy).0;
            let d = dst.get_pixel_mut(region.dst_x + col, region.dst_y + row);
            match s[3] {
                0 => {}
                255 => d.0 = [s[0], s[1], s[2]],
                a => {
                    let alpha = a as f32 / 255.0;
                    for c in 0..3 {
                        d.0[c] = blend_channel(s[c], d.0[c], alpha);
                    }
                }
            }
        }
    }

    BlendOutcome::Blended {
        width: region.dst_w,
        height: region.dst_h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};

    fn placement(x: i32, y: i32, width: u32, height: u32) -> Placement {
        Placement {
            x,
            y,
            width,
            height,
            center: (
                x as f32 + width as f32 / 2.0,
                y as f32 + height as f32 / 2.0,
            ),
        }
    }

    fn backdrop() -> RgbImage {
        RgbImage::from_fn(40, 30, |x, y| Rgb([x as u8, y as u8, 100]))
    }

    #[test]
    fn test_off_frame_is_noop() {
        let overlay = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        for p in [
            placement(40, 0, 10, 10),
            placement(0, 30, 10, 10),
            placement(-10, 5, 10, 10),
            placement(5, -10, 10, 10),
            placement(-500, -500, 20, 20),
        ] {
            let mut dst = backdrop();
            assert_eq!(composite(&mut dst, &overlay, &p), BlendOutcome::OffFrame);
            assert_eq!(dst, backdrop());
        }
    }

    #[test]
    fn test_opaque_overlay_replaces_region() {
        let overlay = RgbaImage::from_pixel(4, 4, Rgba([9, 8, 7, 255]));
        let mut dst = backdrop();
        let outcome = composite(&mut dst, &overlay, &placement(10, 5, 8, 6));
        assert_eq!(
            outcome,
            BlendOutcome::Blended {
                width: 8,
                height: 6
            }
        );

        for y in 0..30 {
            for x in 0..40 {
                let inside = (10..18).contains(&x) && (5..11).contains(&y);
                let expected = if inside {
                    Rgb([9, 8, 7])
                } else {
                    *backdrop().get_pixel(x, y)
                };
                assert_eq!(*dst.get_pixel(x, y), expected, "pixel {},{}", x, y);
            }
        }
    }

    #[test]
    fn test_transparent_overlay_changes_nothing() {
        let overlay = RgbaImage::from_pixel(6, 6, Rgba([255, 255, 255, 0]));
        let mut dst = backdrop();
        composite(&mut dst, &overlay, &placement(3, 3, 12, 12));
        assert_eq!(dst, backdrop());
    }

    #[test]
    fn test_half_alpha_mixes() {
        let overlay = RgbaImage::from_pixel(2, 2, Rgba([200, 0, 50, 128]));
        let mut dst = RgbImage::from_pixel(2, 2, Rgb([0, 100, 50]));
        composite(&mut dst, &overlay, &placement(0, 0, 2, 2));
        let alpha = 128.0 / 255.0;
        let expected_r = (alpha * 200.0_f32).round() as u8;
        let expected_g = ((1.0 - alpha) * 100.0_f32).round() as u8;
        assert_eq!(dst.get_pixel(1, 1).0, [expected_r, expected_g, 50]);
    }

    #[test]
    fn test_partially_off_frame_is_clipped() {
        // Left half red, right half blue; placed hanging off the top-left corner
        let overlay = RgbaImage::from_fn(10, 10, |x, _| {
            if x < 5 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let mut dst = backdrop();
        let outcome = composite(&mut dst, &overlay, &placement(-5, -5, 10, 10));
        assert_eq!(
            outcome,
            BlendOutcome::Blended {
                width: 5,
                height: 5
            }
        );
        // Only the blue half is visible
        assert_eq!(dst.get_pixel(0, 0).0, [0, 0, 255]);
        assert_eq!(dst.get_pixel(4, 4).0, [0, 0, 255]);
        assert_eq!(*dst.get_pixel(5, 5), *backdrop().get_pixel(5, 5));
    }

    #[test]
    fn test_bottom_right_clipping() {
        let overlay = RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 255]));
        let mut dst = backdrop();
        let outcome = composite(&mut dst, &overlay, &placement(35, 27, 10, 10));
        assert_eq!(
            outcome,
            BlendOutcome::Blended {
                width: 5,
                height: 3
            }
        );
        assert_eq!(dst.get_pixel(39, 29).0, [1, 2, 3]);
        assert_eq!(*dst.get_pixel(34, 29), *backdrop().get_pixel(34, 29));
    }

    #[test]
    fn test_resize_keeps_alpha() {
        // Opaque top half, transparent bottom half, scaled 4x
        let overlay = RgbaImage::from_fn(4, 4, |_, y| {
            if y < 2 {
                Rgba([0, 255, 0, 255])
            } else {
                Rgba([0, 255, 0, 0])
            }
        });
        let mut dst = RgbImage::from_pixel(16, 16, Rgb([0, 0, 0]));
        composite(&mut dst, &overlay, &placement(0, 0, 16, 16));
        assert_eq!(dst.get_pixel(8, 0).0, [0, 255, 0]);
        assert_eq!(dst.get_pixel(8, 15).0, [0, 0, 0]);
    }

    #[test]
    fn test_huge_placement_resamples_only_visible_window() {
        let overlay = RgbaImage::from_pixel(100, 100, Rgba([4, 5, 6, 255]));
        let mut dst = backdrop();
        let outcome = composite(&mut dst, &overlay, &placement(-10_000, -10_000, 20_000, 20_000));
        assert_eq!(
            outcome,
            BlendOutcome::Blended {
                width: 40,
                height: 30
            }
        );
        assert!(dst.pixels().all(|p| p.0 == [4, 5, 6]));
    }

    #[test]
    fn test_windowed_resize_matches_full_resize() {
        let overlay = RgbaImage::from_fn(8, 8, |x, y| Rgba([x as u8 * 30, y as u8 * 30, 0, 255]));
        let full = imageops::resize(&overlay, 32, 32, FilterType::Triangle);

        let mut dst = RgbImage::from_pixel(16, 16, Rgb([0, 0, 0]));
        composite(&mut dst, &overlay, &placement(-16, -16, 32, 32));
        for (x, y) in [(2, 2), (7, 3), (15, 15)] {
            let expected = full.get_pixel(x + 16, y + 16).0;
            let got = dst.get_pixel(x, y).0;
            for c in 0..3 {
                assert!(got[c].abs_diff(expected[c]) <= 8, "pixel {},{}", x, y);
            }
        }
    }

    #[test]
    fn test_axis_window_covers_visible_span() {
        let w = AxisWindow::new(4, 16, 0, 16);
        assert_eq!(w, AxisWindow { start: 0, len: 4, scaled: 16, offset: 0 });

        let w = AxisWindow::new(100, 20_000, 10_000, 40);
        assert!(w.len <= 2);
        assert!(w.offset <= 10_000);
        assert!(10_040 <= w.offset + w.scaled);
    }

    #[test]
    fn test_zero_size_is_degenerate() {
        let overlay = RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 255]));
        let mut dst = backdrop();
        assert_eq!(
            composite(&mut dst, &overlay, &placement(1, 1, 0, 5)),
            BlendOutcome::Degenerate
        );
        assert_eq!(dst, backdrop());
    }

    #[test]
    fn test_clip_regions_agree() {
        for (x, y) in [(-7, 3), (20, -9), (38, 28), (0, 0)] {
            let c = clip(40, 30, &placement(x, y, 12, 9)).unwrap();
            assert_eq!((c.dst_w, c.dst_h), (c.src_w, c.src_h));
        }
    }
}
