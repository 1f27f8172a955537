use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage};

/// File extensions the replay front end accepts.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Load an image from disk into memory.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    image::open(path_ref).with_context(|| format!("failed to open image {}", path_ref.display()))
}

/// Load an image from disk and keep only its luma channel.
///
/// This is what a camera's Y plane looks like, so still images can be replayed through the
/// pipeline as if they had been captured.
pub fn load_luma<P: AsRef<Path>>(path: P) -> Result<GrayImage> {
    Ok(load_image(path)?.into_luma8())
}

/// Whether `path` has one of [`SUPPORTED_EXTENSIONS`] (case-insensitive).
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn load_luma_drops_color() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("white.png");
        RgbImage::from_pixel(3, 2, Rgb([255, 255, 255]))
            .save(&path)
            .expect("save png");

        let luma = load_luma(&path).expect("load");
        assert_eq!(luma.dimensions(), (3, 2));
        assert!(luma.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn missing_image_has_context() {
        let err = load_image("does/not/exist.png").expect_err("missing file");
        assert!(format!("{err}").contains("failed to open image"));
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(is_supported_image(Path::new("a/b/face.JPG")));
        assert!(is_supported_image(Path::new("frame.png")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("no_extension")));
    }
}
