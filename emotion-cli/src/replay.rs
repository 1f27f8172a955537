//! Replay still images through the pipeline as if they were camera frames.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use emotion_core::{
    DisplayRect, EmotionPipeline, EmotionReport, FaceLocator, FrameOutcome, OverlayUpdate,
    OwnedFrame, PipelineSink, Rotation,
};
use emotion_utils::{is_supported_image, load_luma};
use log::{debug, info, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::sink::ConsoleSink;

/// What happened to one replayed image.
#[derive(Debug, Serialize)]
pub struct FrameRecord {
    pub image: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<EmotionReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub overlay: Vec<DisplayRect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A file, or every supported image below a directory, sorted.
pub fn collect_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        anyhow::bail!(
            "input path is neither file nor directory: {}",
            path.display()
        );
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        if is_supported_image(entry.path()) {
            images.push(entry.path().to_path_buf());
        } else {
            debug!("Skipping non-image file {}", entry.path().display());
        }
    }
    images.sort();
    Ok(images)
}

/// Feed each image through `pipeline` in order.
pub fn run_replay<L: FaceLocator>(
    pipeline: &EmotionPipeline<L, Arc<ConsoleSink>>,
    images: &[PathBuf],
    rotation: Rotation,
) -> Vec<FrameRecord> {
    let mut records = Vec::with_capacity(images.len());
    for path in images {
        let image = path.display().to_string();
        let gray = match load_luma(path) {
            Ok(gray) => gray,
            Err(err) => {
                warn!("Failed to load {image}: {err:#}");
                records.push(FrameRecord {
                    image,
                    outcome: "unreadable",
                    report: None,
                    overlay: Vec::new(),
                    error: Some(format!("{err:#}")),
                });
                continue;
            }
        };

        // Every image starts from an empty overlay.
        pipeline.sink().publish_overlay(OverlayUpdate::Clear);
        let outcome = pollster::block_on(pipeline.process(OwnedFrame::from_gray(gray, rotation)));
        let overlay = pipeline.sink().overlay();
        let (name, report, error) = match outcome {
            FrameOutcome::Classified(report) => ("classified", Some(report), None),
            FrameOutcome::NoFace => ("no_face", None, None),
            FrameOutcome::Undersized { width, height } => (
                "undersized",
                None,
                Some(format!("face {width}x{height} is too small")),
            ),
            FrameOutcome::Skipped => ("skipped", None, None),
            FrameOutcome::Disabled => ("disabled", None, None),
            FrameOutcome::Abandoned(err) => ("abandoned", None, Some(err.to_string())),
        };
        match report.as_ref() {
            Some(report) => info!(
                "{image} -> {} ({:.1}%)",
                report.label,
                report.confidence * 100.0
            ),
            None => info!("{image} -> {name}"),
        }
        records.push(FrameRecord {
            image,
            outcome: name,
            report,
            overlay,
            error,
        });
    }
    records
}
