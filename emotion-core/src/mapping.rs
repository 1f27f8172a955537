//! Face regions and their projection into display space.
//!
//! The overlay uses fit-to-center scaling: the whole analysis image must stay visible, so the
//! smaller axis ratio wins and the other axis is letterboxed. This is deliberately the
//! opposite of the fill-crop used when extracting luminance.

use serde::Serialize;

use crate::frame::CropRect;

/// Axis-aligned face rectangle in intensity-image coordinates, as reported by a locator.
///
/// Locators may report boxes that hang off the image edge; call [`FaceRegion::clamp_to`]
/// before touching pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaceRegion {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceRegion {
    pub const fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.left.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.top.saturating_add(self.height)
    }

    /// Clamp into a `image_width` x `image_height` image.
    ///
    /// The origin is pulled up to zero and the extent trimmed to the image edge. The extent is
    /// not grown to compensate for a negative origin. Returns `None` when nothing is left.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Option<CropRect> {
        let image_w = i64::from(image_width);
        let image_h = i64::from(image_height);
        let x = i64::from(self.left).max(0);
        let y = i64::from(self.top).max(0);
        let w = i64::from(self.width).min(image_w - x);
        let h = i64::from(self.height).min(image_h - y);
        if x >= image_w || y >= image_h || w <= 0 || h <= 0 {
            return None;
        }
        Some(CropRect {
            x: x as u32,
            y: y as u32,
            width: w as u32,
            height: h as u32,
        })
    }
}

/// Size of the surface the overlay is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplaySize {
    pub width: f32,
    pub height: f32,
}

impl DisplaySize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Rectangle in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl DisplayRect {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Uniform scale plus centering offset taking source pixels to display pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl FitTransform {
    /// Fit a `source` (width, height) inside `display`, centered.
    ///
    /// `None` when any dimension is zero or not finite.
    pub fn fit_center(source: (u32, u32), display: DisplaySize) -> Option<Self> {
        let (src_w, src_h) = (source.0 as f32, source.1 as f32);
        let usable = |v: f32| v.is_finite() && v > 0.0;
        if !(usable(src_w) && usable(src_h) && usable(display.width) && usable(display.height)) {
            return None;
        }
        let scale = f32::min(display.width / src_w, display.height / src_h);
        Some(Self {
            scale,
            offset_x: (display.width - src_w * scale) / 2.0,
            offset_y: (display.height - src_h * scale) / 2.0,
        })
    }

    /// Map one source point.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x.mul_add(self.scale, self.offset_x),
            y.mul_add(self.scale, self.offset_y),
        )
    }

    /// Map a region corner by corner.
    pub fn map_region(&self, region: &FaceRegion) -> DisplayRect {
        let (left, top) = self.apply(region.left as f32, region.top as f32);
        let (right, bottom) = self.apply(region.right() as f32, region.bottom() as f32);
        DisplayRect {
            left,
            top,
            right,
            bottom,
        }
    }
}

/// Project `regions` from a `source`-sized image onto `display`.
///
/// The source is scaled uniformly to fit inside the display and centered, so one axis may be
/// letterboxed. An empty result means "clear the overlay": no regions, or a zero-sized source
/// or display.
///
/// # Arguments
///
/// * `regions` - Face boxes in source pixel coordinates.
/// * `source` - Source image `(width, height)` in pixels.
/// * `display` - Size of the surface the overlay is drawn on.
///
/// # Examples
///
/// ```rust
/// use emotion_core::{DisplayRect, DisplaySize, FaceRegion, map_to_display};
///
/// let rects = map_to_display(
///     &[FaceRegion::new(50, 25, 100, 50)],
///     (200, 100),
///     DisplaySize::new(400.0, 400.0),
/// );
/// assert_eq!(
///     rects,
///     vec![DisplayRect { left: 100.0, top: 150.0, right: 300.0, bottom: 250.0 }]
/// );
/// ```
pub fn map_to_display(
    regions: &[FaceRegion],
    source: (u32, u32),
    display: DisplaySize,
) -> Vec<DisplayRect> {
    if regions.is_empty() {
        return Vec::new();
    }
    match FitTransform::fit_center(source, display) {
        Some(transform) => regions.iter().map(|r| transform.map_region(r)).collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    #[test]
    fn full_source_is_centered_and_letterboxed_on_one_axis() {
        let full = FaceRegion::new(0, 0, 480, 480);
        let rects = map_to_display(&[full], (480, 480), DisplaySize::new(1080.0, 1920.0));
        assert_eq!(rects.len(), 1);
        let r = rects[0];
        assert!((r.left - 0.0).abs() < EPS);
        assert!((r.right - 1080.0).abs() < EPS);
        // 1080 tall image in a 1920 tall display: 420 px bars top and bottom.
        assert!((r.top - 420.0).abs() < EPS);
        assert!((r.bottom - 1500.0).abs() < EPS);

        let landscape = map_to_display(
            &[FaceRegion::new(0, 0, 640, 480)],
            (640, 480),
            DisplaySize::new(1000.0, 480.0),
        );
        let r = landscape[0];
        assert!((r.top - 0.0).abs() < EPS && (r.bottom - 480.0).abs() < EPS);
        assert!((r.left - 180.0).abs() < EPS && (r.right - 820.0).abs() < EPS);
    }

    #[test]
    fn matching_aspect_has_no_letterbox() {
        let rects = map_to_display(
            &[FaceRegion::new(0, 0, 480, 480)],
            (480, 480),
            DisplaySize::new(960.0, 960.0),
        );
        assert_eq!(
            rects[0],
            DisplayRect {
                left: 0.0,
                top: 0.0,
                right: 960.0,
                bottom: 960.0,
            }
        );
    }

    #[test]
    fn mapping_is_linear_in_corners() {
        let transform =
            FitTransform::fit_center((200, 100), DisplaySize::new(400.0, 400.0)).unwrap();
        assert!((transform.scale - 2.0).abs() < EPS);
        assert!((transform.offset_x - 0.0).abs() < EPS);
        assert!((transform.offset_y - 100.0).abs() < EPS);

        let rect = transform.map_region(&FaceRegion::new(10, 20, 30, 40));
        assert!((rect.left - 20.0).abs() < EPS);
        assert!((rect.top - 140.0).abs() < EPS);
        assert!((rect.width() - 60.0).abs() < EPS);
        assert!((rect.height() - 80.0).abs() < EPS);
    }

    #[test]
    fn zero_dimensions_or_no_regions_clear() {
        let face = [FaceRegion::new(1, 1, 5, 5)];
        assert!(map_to_display(&[], (480, 480), DisplaySize::new(100.0, 100.0)).is_empty());
        assert!(map_to_display(&face, (0, 480), DisplaySize::new(100.0, 100.0)).is_empty());
        assert!(map_to_display(&face, (480, 480), DisplaySize::new(100.0, 0.0)).is_empty());
    }

    #[test]
    fn clamp_trims_to_image() {
        let region = FaceRegion::new(-10, 5, 50, 200);
        assert_eq!(
            region.clamp_to(100, 100),
            Some(CropRect {
                x: 0,
                y: 5,
                width: 50,
                height: 95,
            })
        );
        assert_eq!(FaceRegion::new(120, 0, 10, 10).clamp_to(100, 100), None);
        assert_eq!(FaceRegion::new(0, 0, 0, 10).clamp_to(100, 100), None);
        assert_eq!(
            FaceRegion::new(90, 90, 40, 40).clamp_to(100, 100),
            Some(CropRect {
                x: 90,
                y: 90,
                width: 10,
                height: 10,
            })
        );
    }
}
