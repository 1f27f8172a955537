//! Configuration loading and CLI override logic.

use std::path::PathBuf;

use anyhow::{Context, Result};
use emotion_utils::{
    config::{AppSettings, default_settings_path},
    normalize_path,
};
use log::info;

use crate::args::EmotionArgs;

/// Load application settings from a file or use defaults.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)?;
        let settings = AppSettings::load_from_path(&resolved)?;
        info!("Loaded settings from {}", resolved.display());
        Ok(settings)
    } else {
        let default_path = default_settings_path();
        if default_path.exists() {
            let settings = AppSettings::load_from_path(&default_path).with_context(|| {
                format!(
                    "failed to load default settings from {}",
                    default_path.display()
                )
            })?;
            info!("Loaded settings from {}", default_path.display());
            Ok(settings)
        } else {
            Ok(AppSettings::default())
        }
    }
}

/// Apply command-line arguments on top of loaded or default settings.
pub fn apply_cli_overrides(settings: &mut AppSettings, args: &EmotionArgs) {
    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim();
        if !normalized.is_empty() {
            let lower = normalized.to_ascii_lowercase();
            settings.telemetry.level = lower.clone();
            if lower == "off" {
                settings.telemetry.enabled = false;
            }
        }
    }

    if let Some(model) = args.model.as_ref() {
        settings.model.path = model.display().to_string();
    }
    if let Some(labels) = args.labels.as_ref() {
        let labels: Vec<String> = labels
            .iter()
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect();
        if !labels.is_empty() {
            settings.model.labels = labels;
        }
    }
    if args.no_accel {
        settings.model.accelerate = false;
    }
    if let Some(quality) = args.resize_quality {
        settings.model.resize_quality = quality;
    }

    if let Some(path) = args.detector_model.as_ref() {
        settings.detector.model_path = path.display().to_string();
    }

    if let Some(device) = args.device {
        settings.capture.device = device;
    }
    if let Some(rotation) = args.rotation {
        settings.capture.rotation = rotation;
    }

    if let Some(min) = args.min_face_size {
        settings.pipeline.min_face_size = min;
    }
    if let Some(skip) = args.frame_skip {
        settings.pipeline.frame_skip = skip;
    }
    if let Some(display) = args.display {
        settings.pipeline.display_width = display.width;
        settings.pipeline.display_height = display.height;
    }

    settings.sanitize();
}
