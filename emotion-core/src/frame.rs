//! Frame and image types flowing through one pipeline pass.

use anyhow::Result;
use image::{GrayImage, imageops};

/// Clockwise rotation that brings a captured frame upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Parse a rotation hint in degrees. Only multiples of 90 are accepted; values wrap at 360.
    pub fn from_degrees(degrees: u32) -> Result<Self> {
        match degrees % 360 {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            other => anyhow::bail!("unsupported rotation {other}; expected 0, 90, 180 or 270"),
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Whether width and height trade places.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// A borrowed single-channel luma plane straight from the capture layer.
///
/// Rows may be padded: byte `(row, col)` lives at `row * row_stride + col`.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub row_stride: usize,
    pub rotation: Rotation,
}

impl<'a> RawFrame<'a> {
    /// A tightly packed frame (`row_stride == width`).
    pub fn packed(data: &'a [u8], width: u32, height: u32, rotation: Rotation) -> Self {
        Self {
            data,
            width,
            height,
            row_stride: width as usize,
            rotation,
        }
    }

    /// Luma value at `(col, row)`, or 0 when the byte lies outside the plane.
    #[inline]
    pub fn luma(&self, col: u32, row: u32) -> u8 {
        (row as usize)
            .checked_mul(self.row_stride)
            .and_then(|offset| offset.checked_add(col as usize))
            .and_then(|index| self.data.get(index).copied())
            .unwrap_or(0)
    }

    /// Frame dimensions once the rotation hint is applied.
    pub fn upright_dimensions(&self) -> (u32, u32) {
        if self.rotation.swaps_axes() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

/// A frame owned by the capture layer.
///
/// The pipeline takes frames by value and drops them when the pass ends, whatever the
/// outcome. Implementations release their underlying capture resource in `Drop`, so every
/// frame is released exactly once.
pub trait CapturedFrame: Send + 'static {
    /// Borrow the frame's luma plane.
    fn raw(&self) -> RawFrame<'_>;
}

/// A heap-owned luma frame, used for replayed images and tests.
#[derive(Debug, Clone)]
pub struct OwnedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub row_stride: usize,
    pub rotation: Rotation,
}

impl OwnedFrame {
    /// Wrap a packed grayscale image.
    pub fn from_gray(image: GrayImage, rotation: Rotation) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            row_stride: width as usize,
            rotation,
        }
    }

    /// A frame filled with a single luma value.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self::from_gray(GrayImage::from_pixel(width, height, image::Luma([value])), Rotation::Deg0)
    }
}

impl CapturedFrame for OwnedFrame {
    fn raw(&self) -> RawFrame<'_> {
        RawFrame {
            data: &self.data,
            width: self.width,
            height: self.height,
            row_stride: self.row_stride,
            rotation: self.rotation,
        }
    }
}

/// Integer rectangle guaranteed to lie inside the image it was clamped against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Owned, tightly packed single-channel image. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityImage {
    pixels: GrayImage,
}

impl IntensityImage {
    /// Build from packed row-major bytes.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        anyhow::ensure!(
            data.len() == expected,
            "intensity buffer has {} bytes, expected {expected} for {width}x{height}",
            data.len()
        );
        let pixels = GrayImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow::anyhow!("invalid {width}x{height} intensity buffer"))?;
        Ok(Self { pixels })
    }

    /// A uniformly filled image.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            pixels: GrayImage::from_pixel(width, height, image::Luma([value])),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Packed row-major bytes.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Borrow the underlying `image` buffer.
    pub fn as_gray(&self) -> &GrayImage {
        &self.pixels
    }

    /// Copy out the pixels inside `rect`.
    pub fn crop(&self, rect: CropRect) -> Result<Self> {
        let (width, height) = self.dimensions();
        anyhow::ensure!(
            rect.width > 0
                && rect.height > 0
                && rect.x + rect.width <= width
                && rect.y + rect.height <= height,
            "crop {rect:?} exceeds {width}x{height} image"
        );
        let pixels = imageops::crop_imm(&self.pixels, rect.x, rect.y, rect.width, rect.height)
            .to_image();
        Ok(Self { pixels })
    }

    /// A copy rotated clockwise by `rotation`.
    pub fn rotated(&self, rotation: Rotation) -> Self {
        let pixels = match rotation {
            Rotation::Deg0 => self.pixels.clone(),
            Rotation::Deg90 => imageops::rotate90(&self.pixels),
            Rotation::Deg180 => imageops::rotate180(&self.pixels),
            Rotation::Deg270 => imageops::rotate270(&self.pixels),
        };
        Self { pixels }
    }

    pub fn into_gray(self) -> GrayImage {
        self.pixels
    }
}

impl From<GrayImage> for IntensityImage {
    fn from(pixels: GrayImage) -> Self {
        Self { pixels }
    }
}
