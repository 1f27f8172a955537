mod args;
mod config;
mod locator;
mod replay;
mod sink;
#[cfg(feature = "webcam")]
mod webcam;

use std::{
    fs::{self, File},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use emotion_core::{EmotionPipeline, InferenceEngine, PipelineConfig, Rotation};
use emotion_utils::{SUPPORTED_EXTENSIONS, configure_telemetry, init_logging, normalize_path};
use log::info;

use crate::{
    args::EmotionArgs,
    config::{apply_cli_overrides, load_settings},
    locator::SeetaLocator,
    replay::{collect_images, run_replay},
    sink::ConsoleSink,
};

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = EmotionArgs::parse();

    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args);
    configure_telemetry(settings.telemetry.enabled, settings.telemetry.level_filter());

    let rotation = Rotation::from_degrees(settings.capture.rotation)?;

    info!(
        "Loading emotion classifier from {} ({} labels)",
        settings.model.path,
        settings.model.labels.len()
    );
    let engine =
        Arc::new(InferenceEngine::from_settings(&settings.model).context("model not ready")?);
    let locator = SeetaLocator::spawn(&settings.detector)?;

    if args.webcam {
        #[cfg(feature = "webcam")]
        {
            return webcam::run_webcam_mode(&args, &settings, engine, locator, rotation);
        }
        #[cfg(not(feature = "webcam"))]
        {
            anyhow::bail!("this build has no webcam support; rebuild with `--features webcam`");
        }
    }

    let input = args
        .input
        .as_ref()
        .context("--input is required unless --webcam is given")?;
    let input_path = normalize_path(input)?;
    let images = collect_images(&input_path)?;
    if images.is_empty() {
        anyhow::bail!(
            "no images found at {} (supported extensions: {})",
            input_path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        );
    }

    let sink = Arc::new(ConsoleSink::new(false));
    let pipeline = EmotionPipeline::new(
        engine,
        locator,
        Arc::clone(&sink),
        PipelineConfig::from(&settings),
    );

    info!("Replaying {} image(s)...", images.len());
    let records = run_replay(&pipeline, &images, rotation);
    info!(
        "{} of {} image(s) classified",
        sink.reports_published(),
        records.len()
    );

    if let Some(json_path) = args.json.as_ref() {
        if let Some(dir) = json_path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, &records).with_context(|| {
            format!("failed to write emotion JSON to {}", json_path.display())
        })?;
        info!("Wrote results to {}", json_path.display());
    } else {
        for record in &records {
            match record.report.as_ref() {
                Some(report) => println!("{}\n{report}\n", record.image),
                None => println!("{}\n{}\n", record.image, record.outcome),
            }
        }
    }

    Ok(())
}
