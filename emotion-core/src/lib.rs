//! Core emotion classification pipeline.
//!
//! Turns raw luma frames into upright intensity images, hands them to a face locator, maps the
//! found face onto the display, and classifies the face crop with an ONNX model run through
//! `tract-onnx`.

/// Classifier execution backends.
pub mod backend;
/// Keep-latest frame scheduling for live sources.
pub mod dispatch;
/// Thread-safe inference engine with backend fallback.
pub mod engine;
/// Frame and intensity image types.
pub mod frame;
/// Luma extraction, rotation and fill-crop.
pub mod luminance;
/// Face regions and display-space projection.
pub mod mapping;
/// Score normalization and emotion reports.
pub mod normalize;
/// Per-frame orchestration.
pub mod pipeline;
/// Face crop to model tensor conversion.
pub mod preprocess;

#[cfg(test)]
mod testing;

pub use backend::{BackendKind, BackendProvider, ClassifierBackend, OnnxModelProvider};
pub use dispatch::{DispatchSummary, DispatcherConfig, FrameDispatcher};
pub use engine::{EngineError, EngineOptions, InferenceEngine};
pub use frame::{CapturedFrame, CropRect, IntensityImage, OwnedFrame, RawFrame, Rotation};
pub use luminance::extract_luminance;
pub use mapping::{DisplayRect, DisplaySize, FaceRegion, FitTransform, map_to_display};
pub use normalize::{ConfidenceVector, EmotionReport, LabelConfidence, ScoreVector, normalize};
pub use pipeline::{
    EmotionPipeline, FaceLocator, FrameError, FrameJob, FrameOutcome, Ingested, OverlayUpdate,
    PipelineConfig, PipelineSink,
};
pub use preprocess::{InputShape, InputTensor, TensorLayout, TensorPreprocessor};
