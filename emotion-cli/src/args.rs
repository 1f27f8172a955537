//! Command-line argument definitions for emotion-cli.

use clap::{ArgAction, Parser};
use emotion_core::DisplaySize;
use emotion_utils::ResizeQuality;
use std::path::PathBuf;

/// Classify the emotion of the most prominent face in images or a live webcam feed.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct EmotionArgs {
    /// Path to an image file or a directory of images, replayed as camera frames.
    #[arg(short, long, required_unless_present = "webcam")]
    pub input: Option<PathBuf>,

    /// Stream frames from a webcam instead of replaying images (needs the `webcam` feature).
    #[arg(long, conflicts_with = "input")]
    pub webcam: bool,

    /// Webcam device index (defaults to the settings file).
    #[arg(long, requires = "webcam")]
    pub device: Option<u32>,

    /// Number of webcam frames to capture (0 = continuous, Ctrl+C to stop).
    #[arg(long, default_value_t = 0, requires = "webcam")]
    pub frames: u64,

    /// Path to the emotion classifier ONNX model.
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Comma-separated emotion labels in model output order.
    #[arg(long, value_delimiter = ',')]
    pub labels: Option<Vec<String>>,

    /// Path to the SeetaFace detector model used to locate faces.
    #[arg(long)]
    pub detector_model: Option<PathBuf>,

    /// Optional settings JSON. Defaults to `config/emotion.json` when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overlay surface size as WIDTHxHEIGHT, used to report display-space face boxes.
    #[arg(long, value_name = "WxH", value_parser = parse_display_size)]
    pub display: Option<DisplaySize>,

    /// Clockwise rotation (0, 90, 180, 270) that brings frames upright.
    #[arg(long)]
    pub rotation: Option<u32>,

    /// Faces must be larger than this many pixels on both axes to be classified.
    #[arg(long)]
    pub min_face_size: Option<u32>,

    /// Analyse every n-th frame.
    #[arg(long)]
    pub frame_skip: Option<u32>,

    /// Resize filter for the face crop: `bilinear` or `bicubic`.
    #[arg(long, value_name = "MODE")]
    pub resize_quality: Option<ResizeQuality>,

    /// Skip the accelerated backend and run the baseline plan directly.
    #[arg(long = "no-accel", action = ArgAction::SetTrue)]
    pub no_accel: bool,

    /// Write per-frame results to a JSON file instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,
}

fn parse_display_size(value: &str) -> Result<DisplaySize, String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid display size '{value}'; expected WIDTHxHEIGHT"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| format!("invalid display dimension '{s}'"))
    };
    Ok(DisplaySize::new(parse(w)?, parse(h)?))
}
