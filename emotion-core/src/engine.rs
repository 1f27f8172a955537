//! The inference engine: one loaded classifier shared by every frame.
//!
//! The backend and its input/output buffers sit behind a single mutex, so passes never overlap
//! and every pass sees freshly written buffers. Construction tries the accelerated backend
//! first; if it cannot be built or fails its first pass it is dropped and the baseline backend
//! takes over for the engine's whole lifetime.

use std::{
    fmt::Write,
    path::Path,
    sync::{Mutex, PoisonError},
};

use anyhow::{Context, Result};
use log::{Level, debug, info, warn};
use thiserror::Error;

use crate::{
    backend::{BackendKind, BackendProvider, ClassifierBackend, OnnxModelProvider},
    frame::IntensityImage,
    normalize::ScoreVector,
    preprocess::{InputShape, InputTensor, TensorPreprocessor},
};
use emotion_utils::{ResizeQuality, config::ModelSettings, timing_guard};

/// Intensity of the synthetic frame used to prove a backend works.
const WARM_UP_VALUE: f32 = 0.5;

/// Fatal construction failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no classifier backend is usable (accelerated: {accelerated}; baseline: {baseline})")]
    BackendUnavailable { accelerated: String, baseline: String },
    #[error("model produces {outputs} scores but {labels} labels are configured")]
    LabelMismatch { outputs: usize, labels: usize },
    #[error("at least one emotion label is required")]
    EmptyLabels,
}

/// Knobs for [`InferenceEngine`] construction.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Try the accelerated backend before the baseline one.
    pub prefer_accelerated: bool,
    pub resize_quality: ResizeQuality,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            prefer_accelerated: true,
            resize_quality: ResizeQuality::default(),
        }
    }
}

struct EngineState {
    backend: Box<dyn ClassifierBackend>,
    input: Vec<f32>,
    output: Vec<f32>,
}

/// Thread-safe classifier.
pub struct InferenceEngine {
    state: Mutex<EngineState>,
    preprocessor: TensorPreprocessor,
    labels: Vec<String>,
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("input_shape", &self.input_shape())
            .field("labels", &self.labels)
            .finish()
    }
}

impl InferenceEngine {
    /// Load an ONNX classifier from disk.
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        labels: Vec<String>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        Self::with_provider(&OnnxModelProvider::new(model_path, None), labels, options)
    }

    /// Build from the `model` section of the application settings.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self, EngineError> {
        let provider = OnnxModelProvider::new(&settings.path, settings.input_shape);
        let options = EngineOptions {
            prefer_accelerated: settings.accelerate,
            resize_quality: settings.resize_quality,
        };
        Self::with_provider(&provider, settings.labels.clone(), options)
    }

    /// Build with backends from `provider`.
    ///
    /// The accelerated backend is tried first when `options.prefer_accelerated` is set and must
    /// survive one mid-gray pass. If it is skipped or fails, the baseline backend is used for
    /// the engine's whole lifetime.
    ///
    /// # Arguments
    ///
    /// * `provider` - Source of accelerated and baseline backends.
    /// * `labels` - Emotion labels in model output order.
    /// * `options` - Backend preference and face resize filter.
    ///
    /// # Errors
    ///
    /// [`EngineError::BackendUnavailable`] when neither backend can be built and run,
    /// [`EngineError::LabelMismatch`] when the label count differs from the model output, and
    /// [`EngineError::EmptyLabels`] for an empty label list.
    pub fn with_provider<P: BackendProvider + ?Sized>(
        provider: &P,
        labels: Vec<String>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        if labels.is_empty() {
            return Err(EngineError::EmptyLabels);
        }

        let backend = select_backend(provider, options.prefer_accelerated)?;
        let shape = backend.input_shape();
        let outputs = backend.output_len();
        if outputs != labels.len() {
            return Err(EngineError::LabelMismatch {
                outputs,
                labels: labels.len(),
            });
        }

        Ok(Self {
            state: Mutex::new(EngineState {
                backend,
                input: vec![0.0; shape.len()],
                output: vec![0.0; outputs],
            }),
            preprocessor: TensorPreprocessor::new(shape, options.resize_quality),
            labels,
        })
    }

    pub fn input_shape(&self) -> InputShape {
        self.preprocessor.shape()
    }

    /// Labels in model output order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Run one pass on an already prepared tensor.
    pub fn classify(&self, tensor: &InputTensor) -> Result<ScoreVector> {
        anyhow::ensure!(
            tensor.shape() == self.input_shape(),
            "tensor shape {:?} does not match classifier input {:?}",
            tensor.shape().dims(),
            self.input_shape().dims()
        );
        self.run_locked(|input| {
            input.copy_from_slice(tensor.as_slice());
            Ok(())
        })
    }

    /// Preprocess `face` straight into the engine's input buffer and run one pass.
    pub fn classify_image(&self, face: &IntensityImage) -> Result<ScoreVector> {
        self.run_locked(|input| self.preprocessor.write_into(face, input))
    }

    /// Run a mid-gray frame through the engine.
    pub fn warm_up(&self) -> Result<ScoreVector> {
        self.classify(&InputTensor::filled(self.input_shape(), WARM_UP_VALUE))
    }

    fn run_locked(&self, fill: impl FnOnce(&mut [f32]) -> Result<()>) -> Result<ScoreVector> {
        let _guard = timing_guard("emotion_core::inference", Level::Debug);
        // Both buffers are rewritten before every pass, so a poisoned lock holds nothing stale.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let EngineState {
            backend,
            input,
            output,
        } = &mut *state;

        input.fill(0.0);
        fill(input).context("failed to prepare classifier input")?;
        output.fill(0.0);
        backend.run(input, output)?;
        Ok(ScoreVector::new(output.clone()))
    }
}

fn select_backend<P: BackendProvider + ?Sized>(
    provider: &P,
    prefer_accelerated: bool,
) -> Result<Box<dyn ClassifierBackend>, EngineError> {
    let accelerated_failure = if prefer_accelerated {
        match build_and_probe(provider, BackendKind::Accelerated) {
            Ok(backend) => {
                info!("Emotion classifier running on the accelerated backend");
                return Ok(backend);
            }
            Err(err) => {
                let mut chain_msg = String::new();
                for cause in err.chain() {
                    let _ = writeln!(&mut chain_msg, "  - {cause}");
                }
                warn!(
                    "Accelerated classifier backend unavailable ({err}); falling back to baseline.\nError chain:\n{}",
                    chain_msg.trim_end()
                );
                format!("{err:#}")
            }
        }
    } else {
        "not requested".to_string()
    };

    match build_and_probe(provider, BackendKind::Baseline) {
        Ok(backend) => {
            info!("Emotion classifier running on the baseline backend");
            Ok(backend)
        }
        Err(err) => Err(EngineError::BackendUnavailable {
            accelerated: accelerated_failure,
            baseline: format!("{err:#}"),
        }),
    }
}

/// Build a backend and push one mid-gray frame through it.
fn build_and_probe<P: BackendProvider + ?Sized>(
    provider: &P,
    kind: BackendKind,
) -> Result<Box<dyn ClassifierBackend>> {
    let mut backend = provider
        .build(kind)
        .with_context(|| format!("failed to build {kind:?} backend"))?;
    let shape = backend.input_shape();
    anyhow::ensure!(!shape.is_empty(), "{kind:?} backend reports an empty input");
    anyhow::ensure!(backend.output_len() > 0, "{kind:?} backend produces no scores");

    let input = vec![WARM_UP_VALUE; shape.len()];
    let mut output = vec![0.0; backend.output_len()];
    backend
        .run(&input, &mut output)
        .with_context(|| format!("{kind:?} backend failed its warm-up pass"))?;
    debug!("{kind:?} backend warm-up scores: {output:?}");
    Ok(backend)
}
