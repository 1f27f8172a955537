//! Preparing face crops for the classifier.
//!
//! The crop is resized to the model's input resolution and each intensity is divided by 255.
//! Inputs are already luminance, so the value is replicated across however many channels the
//! model declares instead of being re-derived from color.

use anyhow::Result;
use image::imageops::{self, FilterType};
use log::Level;

use crate::frame::IntensityImage;
use emotion_utils::{ResizeQuality, timing_guard};

/// Largest representable intensity; inputs are scaled into `[0, 1]` by it.
pub const MAX_INTENSITY: f32 = 255.0;

/// Memory order of the model input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
    /// `[1, H, W, C]`, channels interleaved per pixel.
    #[default]
    Nhwc,
    /// `[1, C, H, W]`, one plane per channel.
    Nchw,
}

/// Fixed input geometry of the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub layout: TensorLayout,
}

impl InputShape {
    /// Square single-channel NHWC input, the common shape for emotion models.
    pub const fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            channels: 1,
            layout: TensorLayout::Nhwc,
        }
    }

    /// Number of `f32` values in one input tensor.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Batch-of-one tensor dimensions in this shape's layout.
    pub fn dims(&self) -> [usize; 4] {
        let (w, h, c) = (
            self.width as usize,
            self.height as usize,
            self.channels as usize,
        );
        match self.layout {
            TensorLayout::Nhwc => [1, h, w, c],
            TensorLayout::Nchw => [1, c, h, w],
        }
    }

    /// Interpret a `[1, a, b, c]` model input.
    ///
    /// A second dimension of 1 or 3 followed by a spatial-looking trailing dimension is read
    /// as NCHW; everything else as NHWC.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        anyhow::ensure!(
            dims.len() == 4,
            "classifier input must be rank 4, got shape {dims:?}"
        );
        anyhow::ensure!(
            dims[0] == 1,
            "classifier input must have batch size 1, got shape {dims:?}"
        );
        anyhow::ensure!(
            dims[1..].iter().all(|&d| d > 0 && d <= u32::MAX as usize),
            "classifier input has invalid dimensions {dims:?}"
        );
        let is_channel = |d: usize| d == 1 || d == 3;
        let (layout, channels, height, width) = if is_channel(dims[1]) && !is_channel(dims[3]) {
            (TensorLayout::Nchw, dims[1], dims[2], dims[3])
        } else {
            (TensorLayout::Nhwc, dims[3], dims[1], dims[2])
        };
        Ok(Self {
            width: width as u32,
            height: height as u32,
            channels: channels as u32,
            layout,
        })
    }
}

/// One model input, owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    shape: InputShape,
    data: Vec<f32>,
}

impl InputTensor {
    pub fn new(shape: InputShape, data: Vec<f32>) -> Result<Self> {
        anyhow::ensure!(
            data.len() == shape.len(),
            "tensor has {} values, shape {:?} needs {}",
            data.len(),
            shape.dims(),
            shape.len()
        );
        Ok(Self { shape, data })
    }

    /// Every element set to `value`.
    pub fn filled(shape: InputShape, value: f32) -> Self {
        Self {
            shape,
            data: vec![value; shape.len()],
        }
    }

    pub fn shape(&self) -> InputShape {
        self.shape
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Resizes crops and writes normalized values for a fixed [`InputShape`].
#[derive(Debug, Clone, Copy)]
pub struct TensorPreprocessor {
    shape: InputShape,
    filter: FilterType,
}

impl TensorPreprocessor {
    pub fn new(shape: InputShape, quality: ResizeQuality) -> Self {
        let filter = match quality {
            ResizeQuality::Bilinear => FilterType::Triangle,
            ResizeQuality::Bicubic => FilterType::CatmullRom,
        };
        Self { shape, filter }
    }

    pub fn shape(&self) -> InputShape {
        self.shape
    }

    /// Build a fresh tensor from `image`.
    pub fn prepare(&self, image: &IntensityImage) -> Result<InputTensor> {
        let mut data = vec![0.0; self.shape.len()];
        self.write_into(image, &mut data)?;
        Ok(InputTensor {
            shape: self.shape,
            data,
        })
    }

    /// Overwrite `buffer` with the normalized, resized `image`.
    ///
    /// The whole buffer is cleared first, so nothing from an earlier call survives.
    pub fn write_into(&self, image: &IntensityImage, buffer: &mut [f32]) -> Result<()> {
        let _guard = timing_guard("emotion_core::preprocess", Level::Trace);
        anyhow::ensure!(
            buffer.len() == self.shape.len(),
            "input buffer holds {} values, shape {:?} needs {}",
            buffer.len(),
            self.shape.dims(),
            self.shape.len()
        );
        anyhow::ensure!(
            image.width() > 0 && image.height() > 0,
            "cannot preprocess an empty image"
        );
        buffer.fill(0.0);

        let (width, height) = (self.shape.width, self.shape.height);
        let resized;
        let pixels = if image.dimensions() == (width, height) {
            image.as_raw()
        } else {
            resized = imageops::resize(image.as_gray(), width, height, self.filter);
            resized.as_raw()
        };

        let channels = self.shape.channels as usize;
        match self.shape.layout {
            TensorLayout::Nhwc => {
                for (slot, &value) in buffer.chunks_exact_mut(channels).zip(pixels) {
                    slot.fill(f32::from(value) / MAX_INTENSITY);
                }
            }
            TensorLayout::Nchw => {
                let plane = pixels.len();
                for channel in buffer.chunks_exact_mut(plane) {
                    for (dst, &value) in channel.iter_mut().zip(pixels) {
                        *dst = f32::from(value) / MAX_INTENSITY;
                    }
                }
            }
        }
        Ok(())
    }
}
