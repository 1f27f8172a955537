//! Shared configuration consumed by the core pipeline and the CLI.
//!
//! Everything is serializable so a single JSON file can drive a run; every section uses
//! `#[serde(default)]` so partial files only override what they mention.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Label set used when neither the settings nor the CLI provide one.
pub const DEFAULT_LABELS: [&str; 4] = ["Angry", "Happy", "Sad", "Surprise"];

/// Interpolation used when resizing the face crop to the model input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeQuality {
    /// Bilinear (`Triangle`) filtering.
    #[default]
    Bilinear,
    /// Bicubic (`CatmullRom`) filtering, slower but sharper.
    Bicubic,
}

impl fmt::Display for ResizeQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResizeQuality::Bilinear => "bilinear",
            ResizeQuality::Bicubic => "bicubic",
        })
    }
}

impl FromStr for ResizeQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bilinear" | "linear" => Ok(ResizeQuality::Bilinear),
            "bicubic" | "cubic" => Ok(ResizeQuality::Bicubic),
            other => Err(format!(
                "invalid resize quality '{other}'; expected 'bilinear' or 'bicubic'"
            )),
        }
    }
}

/// Classifier model settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    /// Path to the emotion classifier ONNX graph.
    pub path: String,
    /// Ordered labels, one per model output.
    pub labels: Vec<String>,
    /// Try the accelerated (optimized) execution plan before the baseline one.
    pub accelerate: bool,
    /// Explicit `[1, a, b, c]` input shape for graphs without a concrete input fact.
    pub input_shape: Option<[usize; 4]>,
    /// Filter used when resizing crops to the model input.
    pub resize_quality: ResizeQuality,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: "models/emotion_detector.onnx".to_string(),
            labels: DEFAULT_LABELS.iter().map(|label| label.to_string()).collect(),
            accelerate: true,
            input_shape: None,
            resize_quality: ResizeQuality::default(),
        }
    }
}

/// Capture-side settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CaptureSettings {
    /// Camera device index.
    pub device: u32,
    /// Requested capture width.
    pub width: u32,
    /// Requested capture height.
    pub height: u32,
    /// Requested frame rate.
    pub fps: u32,
    /// Clockwise rotation (0, 90, 180, 270) needed to bring frames upright.
    pub rotation: u32,
    /// Width of the intensity image handed to the face locator.
    pub analysis_width: u32,
    /// Height of the intensity image handed to the face locator.
    pub analysis_height: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: 0,
            width: 640,
            height: 480,
            fps: 30,
            rotation: 0,
            analysis_width: 480,
            analysis_height: 480,
        }
    }
}

/// Orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Crops must be strictly larger than this on both axes.
    pub min_face_size: u32,
    /// Analyse every n-th frame (1 = every frame).
    pub frame_skip: u32,
    /// Ingestion threads pulling from the keep-latest slot.
    pub analyzer_slots: usize,
    /// Worker threads running detect -> crop -> infer.
    pub chain_workers: usize,
    /// Width of the display the overlay is drawn on.
    pub display_width: f32,
    /// Height of the display the overlay is drawn on.
    pub display_height: f32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_face_size: 10,
            frame_skip: 1,
            analyzer_slots: 1,
            chain_workers: 2,
            display_width: 640.0,
            display_height: 480.0,
        }
    }
}

/// Parameters for the SeetaFace locator used by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorSettings {
    /// Path to the `seeta_fd_frontal_v1.0.bin` model.
    pub model_path: String,
    /// Smallest face (pixels) the locator searches for.
    pub min_face_size: u32,
    /// Score threshold for accepting a window.
    pub score_threshold: f64,
    /// Image pyramid scale factor.
    pub pyramid_scale_factor: f32,
    /// Sliding window step (both axes).
    pub slide_window_step: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_path: "models/seeta_fd_frontal_v1.0.bin".to_string(),
            min_face_size: 40,
            score_threshold: 2.0,
            pyramid_scale_factor: 0.8,
            slide_window_step: 4,
        }
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether timing logs are emitted.
    pub enabled: bool,
    /// Most verbose telemetry level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        self.level.trim().parse().unwrap_or(LevelFilter::Debug)
    }
}

/// Everything a run needs, loadable from one JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppSettings {
    pub model: ModelSettings,
    pub capture: CaptureSettings,
    pub pipeline: PipelineSettings,
    pub detector: DetectorSettings,
    pub telemetry: TelemetrySettings,
}

impl AppSettings {
    /// Load settings from a JSON file; missing fields take their defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;
        settings.sanitize();
        Ok(settings)
    }

    /// Write settings as pretty-printed JSON, replacing any existing file.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }

    /// Clamp values that would stall or break the pipeline.
    pub fn sanitize(&mut self) {
        if self.model.labels.is_empty() {
            self.model.labels = ModelSettings::default().labels;
        }
        self.pipeline.frame_skip = self.pipeline.frame_skip.max(1);
        self.pipeline.analyzer_slots = self.pipeline.analyzer_slots.max(1);
        self.pipeline.chain_workers = self.pipeline.chain_workers.max(1);
        self.capture.rotation %= 360;
    }
}

/// Default location of the settings file (`config/emotion.json`).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/emotion.json"))
        .unwrap_or_else(|_| PathBuf::from("config/emotion.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_settings_round_trip() {
        let file = NamedTempFile::new().expect("tempfile");
        let settings = AppSettings::default();
        settings.save_to_path(file.path()).expect("save");

        let loaded = AppSettings::load_from_path(file.path()).expect("load");
        assert_eq!(loaded.model, settings.model);
        assert_eq!(loaded.capture, settings.capture);
        assert_eq!(loaded.pipeline, settings.pipeline);
        assert_eq!(loaded.detector, settings.detector);
        assert_eq!(loaded.telemetry.level, settings.telemetry.level);
    }

    #[test]
    fn partial_file_keeps_defaults_and_sanitizes() {
        let file = NamedTempFile::new().expect("tempfile");
        let json = r#"{
            "model": { "path": "custom.onnx", "labels": [] },
            "pipeline": { "frame_skip": 0, "min_face_size": 24 },
            "capture": { "rotation": 450 }
        }"#;
        fs::write(file.path(), json).expect("write custom settings");

        let loaded = AppSettings::load_from_path(file.path()).expect("load");
        assert_eq!(loaded.model.path, "custom.onnx");
        assert_eq!(loaded.model.labels, ModelSettings::default().labels);
        assert!(loaded.model.accelerate);
        assert_eq!(loaded.pipeline.frame_skip, 1);
        assert_eq!(loaded.pipeline.min_face_size, 24);
        assert_eq!(loaded.capture.rotation, 90);
        assert_eq!(loaded.capture.analysis_width, 480);
    }

    #[test]
    fn malformed_json_reports_path() {
        let file = NamedTempFile::new().expect("tempfile");
        fs::write(file.path(), "{ not json").expect("write");
        let err = AppSettings::load_from_path(file.path()).expect_err("should fail");
        assert!(format!("{err}").contains("failed to parse settings JSON"));
    }

    #[test]
    fn resize_quality_and_telemetry_parse() {
        assert_eq!("Bicubic".parse::<ResizeQuality>(), Ok(ResizeQuality::Bicubic));
        assert!("nearest".parse::<ResizeQuality>().is_err());

        let telemetry = TelemetrySettings {
            level: "TRACE".into(),
            ..TelemetrySettings::default()
        };
        assert_eq!(telemetry.level_filter(), LevelFilter::Trace);
        let telemetry = TelemetrySettings {
            level: "loud".into(),
            ..TelemetrySettings::default()
        };
        assert_eq!(telemetry.level_filter(), LevelFilter::Debug);
    }
}
