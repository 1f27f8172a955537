//! Webcam capture producing luma frames for the emotion pipeline.

use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, GrayImage, RgbImage};
use log::{debug, info, warn};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution},
};

/// An open camera stream.
pub struct WebcamCapture {
    camera: Camera,
    device_index: u32,
    resolution: (u32, u32),
}

impl WebcamCapture {
    /// Open `device_index` and request `width`x`height` at `fps`.
    ///
    /// Drivers may ignore the requested mode; [`WebcamCapture::resolution`] reports what was
    /// actually negotiated.
    pub fn open(device_index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        debug!(
            "Opening webcam device {} with requested mode {}x{} @ {} fps",
            device_index, width, height, fps
        );

        let mut camera = Camera::new(CameraIndex::Index(device_index), requested)
            .with_context(|| format!("failed to open webcam device {device_index}"))?;
        camera
            .open_stream()
            .context("failed to open webcam stream")?;

        if let Err(e) = camera.set_resolution(Resolution::new(width, height)) {
            warn!("Could not set resolution {width}x{height}: {e}; using camera default");
        }
        if let Err(e) = camera.set_frame_rate(fps) {
            warn!("Could not set frame rate {fps}: {e}; using camera default");
        }

        let actual = camera.resolution();
        info!(
            "Webcam device {} streaming at {}x{} @ {} fps",
            device_index,
            actual.width(),
            actual.height(),
            camera.frame_rate()
        );

        Ok(Self {
            camera,
            device_index,
            resolution: (actual.width(), actual.height()),
        })
    }

    /// Grab the next frame and reduce it to its luma plane.
    pub fn capture_luma(&mut self) -> Result<GrayImage> {
        let frame = self
            .camera
            .frame()
            .context("failed to capture webcam frame")?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("failed to decode webcam frame")?;

        let (width, height) = self.resolution;
        let rgb = RgbImage::from_raw(width, height, decoded.to_vec())
            .ok_or_else(|| anyhow!("webcam frame does not match {width}x{height}"))?;
        Ok(DynamicImage::ImageRgb8(rgb).into_luma8())
    }

    /// Negotiated resolution.
    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    /// Device index this capture was opened on.
    pub fn device_index(&self) -> u32 {
        self.device_index
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            warn!("Failed to stop webcam stream: {e}");
        }
    }
}

/// Enumerate camera devices as `(index, human name)`.
pub fn list_webcam_devices() -> Result<Vec<(u32, String)>> {
    let devices = query(ApiBackend::Auto).context("failed to query webcam devices")?;
    Ok(devices
        .iter()
        .enumerate()
        .map(|(idx, info)| (idx as u32, info.human_name().to_string()))
        .collect())
}
