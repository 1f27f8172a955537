//! Live webcam mode.

use std::{fs::File, sync::Arc};

use anyhow::{Context, Result};
use emotion_core::{
    DispatcherConfig, EmotionPipeline, FrameDispatcher, InferenceEngine, OwnedFrame,
    PipelineConfig, Rotation,
};
use emotion_utils::{WebcamCapture, config::AppSettings, list_webcam_devices};
use log::{info, warn};

use crate::{args::EmotionArgs, locator::SeetaLocator, sink::ConsoleSink};

/// Give up after this many capture failures in a row.
const MAX_CONSECUTIVE_FAILURES: u32 = 30;

/// Stream camera frames through the dispatcher until `--frames` is reached or capture fails.
pub fn run_webcam_mode(
    args: &EmotionArgs,
    settings: &AppSettings,
    engine: Arc<InferenceEngine>,
    locator: SeetaLocator,
    rotation: Rotation,
) -> Result<()> {
    match list_webcam_devices() {
        Ok(devices) => {
            info!("Available webcam devices:");
            for (idx, name) in devices {
                info!("  [{idx}] {name}");
            }
        }
        Err(e) => warn!("Could not enumerate webcam devices: {e}"),
    }

    let capture = &settings.capture;
    let mut webcam = WebcamCapture::open(capture.device, capture.width, capture.height, capture.fps)
        .context("failed to open webcam")?;
    let (width, height) = webcam.resolution();
    info!(
        "Webcam {} ready at {width}x{height}, rotation {}",
        webcam.device_index(),
        rotation.degrees()
    );

    let sink = Arc::new(ConsoleSink::new(true));
    let pipeline = Arc::new(EmotionPipeline::new(
        engine,
        locator,
        Arc::clone(&sink),
        PipelineConfig::from(settings),
    ));
    let dispatcher = FrameDispatcher::new(pipeline, DispatcherConfig::from(settings))?;

    let max_frames = args.frames;
    if max_frames == 0 {
        info!("Streaming continuously (press Ctrl+C to stop)");
    } else {
        info!("Streaming {max_frames} frame(s)");
    }

    let mut captured = 0u64;
    let mut failures = 0u32;
    while max_frames == 0 || captured < max_frames {
        let gray = match webcam.capture_luma() {
            Ok(gray) => gray,
            Err(e) => {
                failures += 1;
                warn!("Failed to capture frame: {e:#}");
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    warn!("Stopping after {failures} consecutive capture failures");
                    break;
                }
                continue;
            }
        };
        failures = 0;
        captured += 1;
        dispatcher.submit(OwnedFrame::from_gray(gray, rotation));
    }

    let summary = dispatcher.shutdown();
    info!(
        "Captured {} frame(s): {} analysed, {} replaced, {} short-circuited, {} report(s)",
        summary.submitted,
        summary.completed,
        summary.replaced,
        summary.short_circuited,
        sink.reports_published()
    );

    if let Some(json_path) = args.json.as_ref() {
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, &summary)
            .with_context(|| format!("failed to write summary to {}", json_path.display()))?;
        info!("Wrote webcam summary to {}", json_path.display());
    }

    Ok(())
}
