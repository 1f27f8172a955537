//! Per-frame orchestration: luminance, face search, overlay, crop, classify, publish.
//!
//! A pass is split in two so a scheduler can keep the cheap part on the ingestion thread:
//! [`EmotionPipeline::ingest`] handles the enable toggle, the skip counter and luminance
//! extraction; [`EmotionPipeline::complete`] runs the face locator and everything after it.
//! The frame travels inside the [`FrameJob`] and is dropped, and therefore released, when the
//! pass ends on any path.

use std::{
    future::Future,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use anyhow::Result;
use log::{Level, debug, trace, warn};
use thiserror::Error;

use crate::{
    engine::InferenceEngine,
    frame::{CapturedFrame, IntensityImage},
    luminance::extract_luminance,
    mapping::{DisplayRect, DisplaySize, FaceRegion, map_to_display},
    normalize::{EmotionReport, normalize},
};
use emotion_utils::{AppSettings, timing_guard};

/// Asynchronous face detector.
///
/// Regions are in the coordinates of the image passed in. Only the first region is used.
pub trait FaceLocator: Send + Sync {
    fn locate(
        &self,
        image: &IntensityImage,
    ) -> impl Future<Output = Result<Vec<FaceRegion>>> + Send;
}

impl<T: FaceLocator> FaceLocator for Arc<T> {
    fn locate(
        &self,
        image: &IntensityImage,
    ) -> impl Future<Output = Result<Vec<FaceRegion>>> + Send {
        (**self).locate(image)
    }
}

/// What the overlay should show after a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayUpdate {
    Clear,
    Faces {
        regions: Vec<DisplayRect>,
        display: DisplaySize,
    },
}

/// Receives everything the pipeline publishes.
pub trait PipelineSink: Send + Sync {
    fn publish_overlay(&self, update: OverlayUpdate);
    fn publish_emotion(&self, report: &EmotionReport);
}

impl<T: PipelineSink + ?Sized> PipelineSink for Arc<T> {
    fn publish_overlay(&self, update: OverlayUpdate) {
        (**self).publish_overlay(update);
    }

    fn publish_emotion(&self, report: &EmotionReport) {
        (**self).publish_emotion(report);
    }
}

/// Static pipeline parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Size of the upright intensity image handed to the locator.
    pub analysis_width: u32,
    pub analysis_height: u32,
    /// Crops must be strictly larger than this on both axes.
    pub min_face_size: u32,
    /// Analyse every n-th frame.
    pub frame_skip: u32,
    /// Initial overlay surface size.
    pub display: DisplaySize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for PipelineConfig {
    fn from(settings: &AppSettings) -> Self {
        Self {
            analysis_width: settings.capture.analysis_width,
            analysis_height: settings.capture.analysis_height,
            min_face_size: settings.pipeline.min_face_size,
            frame_skip: settings.pipeline.frame_skip.max(1),
            display: DisplaySize::new(
                settings.pipeline.display_width,
                settings.pipeline.display_height,
            ),
        }
    }
}

/// Transient per-frame failure. The frame is dropped and the pipeline moves on.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("luminance extraction failed: {0:#}")]
    Luminance(anyhow::Error),
    #[error("face location failed: {0:#}")]
    Detection(anyhow::Error),
    #[error("face crop failed: {0:#}")]
    Crop(anyhow::Error),
    #[error("classification failed: {0:#}")]
    Inference(anyhow::Error),
}

/// How a pass ended.
#[derive(Debug)]
pub enum FrameOutcome {
    /// Analysis is switched off.
    Disabled,
    /// Not this frame's turn.
    Skipped,
    /// The locator found nothing; the overlay was cleared.
    NoFace,
    /// The clamped face was too small to classify.
    Undersized { width: u32, height: u32 },
    Classified(EmotionReport),
    Abandoned(FrameError),
}

impl FrameOutcome {
    pub fn report(&self) -> Option<&EmotionReport> {
        match self {
            Self::Classified(report) => Some(report),
            _ => None,
        }
    }
}

/// A frame that passed ingestion, with its intensity image.
#[derive(Debug)]
pub struct FrameJob<F> {
    frame: F,
    image: IntensityImage,
    sequence: u64,
}

impl<F> FrameJob<F> {
    pub fn image(&self) -> &IntensityImage {
        &self.image
    }

    /// 1-based position of the frame among all frames the pipeline has seen.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Result of [`EmotionPipeline::ingest`].
#[derive(Debug)]
pub enum Ingested<F> {
    Ready(FrameJob<F>),
    Finished(FrameOutcome),
}

/// Wires an engine, a locator and a sink into a per-frame state machine.
pub struct EmotionPipeline<L, S> {
    engine: Arc<InferenceEngine>,
    locator: L,
    sink: S,
    config: PipelineConfig,
    display: RwLock<DisplaySize>,
    enabled: AtomicBool,
    frames_seen: AtomicU64,
}

impl<L: FaceLocator, S: PipelineSink> EmotionPipeline<L, S> {
    /// The pipeline can only exist once the engine has been built, so it is ready on creation.
    pub fn new(engine: Arc<InferenceEngine>, locator: L, sink: S, config: PipelineConfig) -> Self {
        let display = RwLock::new(config.display);
        Self {
            engine,
            locator,
            sink,
            config,
            display,
            enabled: AtomicBool::new(true),
            frames_seen: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<InferenceEngine> {
        &self.engine
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Switch analysis on or off. Switching off clears the overlay.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::AcqRel);
        if was && !enabled {
            self.sink.publish_overlay(OverlayUpdate::Clear);
        }
    }

    pub fn display_size(&self) -> DisplaySize {
        *self.display.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track a resized overlay surface. Applies from the next mapped face.
    pub fn set_display_size(&self, display: DisplaySize) {
        *self.display.write().unwrap_or_else(PoisonError::into_inner) = display;
    }

    /// Number of frames offered to [`ingest`](Self::ingest) while enabled.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen.load(Ordering::Relaxed)
    }

    /// Run a whole pass on the current task.
    pub async fn process<F: CapturedFrame>(&self, frame: F) -> FrameOutcome {
        match self.ingest(frame) {
            Ingested::Ready(job) => self.complete(job).await,
            Ingested::Finished(outcome) => outcome,
        }
    }

    /// Cheap first half of a pass.
    pub fn ingest<F: CapturedFrame>(&self, frame: F) -> Ingested<F> {
        if !self.is_enabled() {
            return Ingested::Finished(FrameOutcome::Disabled);
        }

        let sequence = self.frames_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if sequence % u64::from(self.config.frame_skip.max(1)) != 0 {
            trace!("Skipping frame {sequence}");
            return Ingested::Finished(FrameOutcome::Skipped);
        }

        match extract_luminance(
            &frame.raw(),
            self.config.analysis_width,
            self.config.analysis_height,
        ) {
            Ok(image) => Ingested::Ready(FrameJob {
                frame,
                image,
                sequence,
            }),
            Err(err) => {
                warn!("Dropping frame {sequence}: {err:#}");
                Ingested::Finished(FrameOutcome::Abandoned(FrameError::Luminance(err)))
            }
        }
    }

    /// Heavy second half of a pass: locate, publish overlay, crop, classify, publish report.
    pub async fn complete<F: CapturedFrame>(&self, job: FrameJob<F>) -> FrameOutcome {
        let FrameJob {
            frame,
            image,
            sequence,
        } = job;
        let _guard = timing_guard("emotion_core::frame", Level::Debug);
        let outcome = self.analyze(&image, sequence).await;
        drop(frame);
        outcome
    }

    async fn analyze(&self, image: &IntensityImage, sequence: u64) -> FrameOutcome {
        let faces = match self.locator.locate(image).await {
            Ok(faces) => faces,
            Err(err) => {
                warn!("Face locator failed on frame {sequence}: {err:#}");
                return FrameOutcome::Abandoned(FrameError::Detection(err));
            }
        };

        let Some(&face) = faces.first() else {
            trace!("No face in frame {sequence}");
            self.sink.publish_overlay(OverlayUpdate::Clear);
            return FrameOutcome::NoFace;
        };

        let display = self.display_size();
        let regions = map_to_display(&[face], image.dimensions(), display);
        self.sink.publish_overlay(if regions.is_empty() {
            OverlayUpdate::Clear
        } else {
            OverlayUpdate::Faces { regions, display }
        });

        let (width, height) = image.dimensions();
        let min = self.config.min_face_size;
        let rect = match face.clamp_to(width, height) {
            Some(rect) if rect.width > min && rect.height > min => rect,
            other => {
                let (w, h) = other.map_or((0, 0), |r| (r.width, r.height));
                debug!("Face {w}x{h} in frame {sequence} is too small to classify");
                return FrameOutcome::Undersized {
                    width: w,
                    height: h,
                };
            }
        };

        let crop = match image.crop(rect) {
            Ok(crop) => crop,
            Err(err) => {
                warn!("Could not crop face in frame {sequence}: {err:#}");
                return FrameOutcome::Abandoned(FrameError::Crop(err));
            }
        };

        let scores = match self.engine.classify_image(&crop) {
            Ok(scores) => scores,
            Err(err) => {
                warn!("Classification failed on frame {sequence}: {err:#}");
                return FrameOutcome::Abandoned(FrameError::Inference(err));
            }
        };

        let confidences = normalize(&scores);
        let Some(report) = EmotionReport::new(self.engine.labels(), &confidences, face) else {
            let err = anyhow::anyhow!("classifier returned no scores");
            warn!("Frame {sequence}: {err}");
            return FrameOutcome::Abandoned(FrameError::Inference(err));
        };

        debug!(
            "Frame {sequence}: {} ({:.1}%)",
            report.label,
            report.confidence * 100.0
        );
        self.sink.publish_emotion(&report);
        FrameOutcome::Classified(report)
    }
}
