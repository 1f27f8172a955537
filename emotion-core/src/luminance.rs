//! Luma extraction: raw camera plane -> upright, fill-cropped intensity image.
//!
//! Order matters. The frame is unpacked (dropping row padding), rotated by its hint, and only
//! then scaled, because the requested target size is expressed in upright orientation. The
//! scale is the larger of the two axis ratios, so the target is always completely covered and
//! whatever overhangs is cropped symmetrically.

use anyhow::Result;
use image::{GrayImage, imageops::{self, FilterType}};
use log::Level;

use crate::frame::{IntensityImage, RawFrame};
use emotion_utils::timing_guard;

/// Convert `frame` into an upright `target_width` x `target_height` intensity image.
///
/// The frame is rotated by its hint first, then scaled to cover the target and center-cropped.
/// Bytes the frame claims but its plane does not hold read as black.
///
/// # Arguments
///
/// * `frame` - Borrowed luma plane with its row stride and rotation hint.
/// * `target_width` - Output width in upright orientation.
/// * `target_height` - Output height in upright orientation.
///
/// # Errors
///
/// Fails when either size is zero or the row stride is shorter than the frame width.
pub fn extract_luminance(
    frame: &RawFrame<'_>,
    target_width: u32,
    target_height: u32,
) -> Result<IntensityImage> {
    let _guard = timing_guard("emotion_core::extract_luminance", Level::Trace);
    anyhow::ensure!(
        frame.width > 0 && frame.height > 0,
        "frame dimensions must be greater than zero"
    );
    anyhow::ensure!(
        target_width > 0 && target_height > 0,
        "target dimensions must be greater than zero"
    );
    anyhow::ensure!(
        frame.row_stride >= frame.width as usize,
        "row stride {} is smaller than frame width {}",
        frame.row_stride,
        frame.width
    );

    let upright = unpack_luma(frame).rotated(frame.rotation);
    Ok(scale_center_crop(upright.into_gray(), target_width, target_height).into())
}

/// Copy the luma plane into a packed image; bytes past the end of the plane read as black.
fn unpack_luma(frame: &RawFrame<'_>) -> IntensityImage {
    GrayImage::from_fn(frame.width, frame.height, |col, row| {
        image::Luma([frame.luma(col, row)])
    })
    .into()
}

/// Uniformly scale `source` until it covers the target, then keep the centered window.
fn scale_center_crop(source: GrayImage, target_width: u32, target_height: u32) -> GrayImage {
    let (src_w, src_h) = source.dimensions();
    if (src_w, src_h) == (target_width, target_height) {
        return source;
    }

    let scale = f64::max(
        target_width as f64 / src_w as f64,
        target_height as f64 / src_h as f64,
    );
    // Rounding may land one pixel short of the target; never crop from an undersized image.
    let scaled_w = ((src_w as f64 * scale).round() as u32).max(target_width);
    let scaled_h = ((src_h as f64 * scale).round() as u32).max(target_height);

    let scaled = if (scaled_w, scaled_h) == (src_w, src_h) {
        source
    } else {
        imageops::resize(&source, scaled_w, scaled_h, FilterType::Triangle)
    };

    let x = (scaled_w - target_width) / 2;
    let y = (scaled_h - target_height) / 2;
    imageops::crop_imm(&scaled, x, y, target_width, target_height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rotation;

    #[test]
    fn output_matches_target_for_any_aspect() {
        let sources = [(640u32, 480u32), (480, 640), (33, 7), (1, 1), (480, 480), (1920, 1080)];
        let targets = [(480u32, 480u32), (64, 48), (17, 91), (1, 1)];
        let rotations = [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270];

        for &(w, h) in &sources {
            let data = vec![128u8; (w * h) as usize];
            for &rotation in &rotations {
                let frame = RawFrame::packed(&data, w, h, rotation);
                for &(tw, th) in &targets {
                    let out = extract_luminance(&frame, tw, th).unwrap();
                    assert_eq!(out.dimensions(), (tw, th), "{w}x{h} {rotation:?} -> {tw}x{th}");
                }
            }
        }
    }

    #[test]
    fn padded_rows_are_skipped() {
        // 2x2 image with 2 bytes of padding per row (0xFF marks padding).
        let data = [10u8, 20, 0xFF, 0xFF, 30, 40, 0xFF, 0xFF];
        let frame = RawFrame {
            data: &data,
            width: 2,
            height: 2,
            row_stride: 4,
            rotation: Rotation::Deg0,
        };
        let out = extract_luminance(&frame, 2, 2).unwrap();
        assert_eq!(out.as_raw(), &[10, 20, 30, 40]);
    }

    #[test]
    fn short_plane_reads_as_black() {
        // Last row is missing entirely.
        let data = [50u8, 60, 70, 80];
        let frame = RawFrame::packed(&data, 2, 3, Rotation::Deg0);
        let out = extract_luminance(&frame, 2, 3).unwrap();
        assert_eq!(out.as_raw(), &[50, 60, 70, 80, 0, 0]);
    }

    #[test]
    fn rotation_happens_before_cropping() {
        // A 4x2 frame whose left half is dark and right half bright. Rotated 90 degrees
        // clockwise it becomes 2x4 with the dark half on top; a 2x2 center crop then straddles
        // the boundary, which it would not do if the crop ran in sensor orientation.
        let data = [0u8, 0, 255, 255, 0, 0, 255, 255];
        let frame = RawFrame::packed(&data, 4, 2, Rotation::Deg90);
        let out = extract_luminance(&frame, 2, 2).unwrap();
        assert_eq!(out.as_raw(), &[0, 0, 255, 255]);
    }

    #[test]
    fn center_crop_drops_the_overhang() {
        // 6x2 source, target 2x2: scale 1.0, keep columns 2..4.
        let data: Vec<u8> = (0..12).collect();
        let frame = RawFrame::packed(&data, 6, 2, Rotation::Deg0);
        let out = extract_luminance(&frame, 2, 2).unwrap();
        assert_eq!(out.as_raw(), &[2, 3, 8, 9]);
    }

    #[test]
    fn rejects_degenerate_input() {
        let data = [0u8; 4];
        assert!(extract_luminance(&RawFrame::packed(&data, 0, 4, Rotation::Deg0), 2, 2).is_err());
        assert!(extract_luminance(&RawFrame::packed(&data, 2, 2, Rotation::Deg0), 0, 2).is_err());
        let narrow = RawFrame {
            data: &data,
            width: 2,
            height: 2,
            row_stride: 1,
            rotation: Rotation::Deg0,
        };
        assert!(extract_luminance(&narrow, 2, 2).is_err());
    }
}
