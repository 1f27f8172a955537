//! Execution backends for the emotion classifier.
//!
//! A backend is the opaque tensor transform behind the engine: a fixed-size `f32` input in,
//! one score per label out. [`BackendProvider`] builds one on request so the engine can try an
//! accelerated variant first and fall back to the baseline variant.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use tract_onnx::prelude::{
    DatumExt, Framework, Graph, InferenceModelExt, SimplePlan, Tensor, TypedFact, TypedOp, tvec,
};

use crate::preprocess::InputShape;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Which execution path to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Fastest available path; allowed to fail.
    Accelerated,
    /// Always-available path producing equivalent results.
    Baseline,
}

/// A loaded model ready to execute.
pub trait ClassifierBackend: Send {
    /// Geometry of the single input tensor.
    fn input_shape(&self) -> InputShape;

    /// Number of scores one pass produces.
    fn output_len(&self) -> usize;

    /// Execute one forward pass.
    ///
    /// `input` holds exactly `input_shape().len()` values and `output` exactly `output_len()`
    /// zeros. A backend may fill fewer outputs than that; the remainder stays zero.
    fn run(&mut self, input: &[f32], output: &mut [f32]) -> Result<()>;
}

/// Builds backends of a requested [`BackendKind`].
pub trait BackendProvider {
    fn build(&self, kind: BackendKind) -> Result<Box<dyn ClassifierBackend>>;
}

/// Loads an ONNX classifier with `tract-onnx`.
///
/// The accelerated variant is tract's fully optimized plan (fused, SIMD kernels); the baseline
/// variant is the decluttered graph, which skips the optimizer passes.
#[derive(Debug, Clone)]
pub struct OnnxModelProvider {
    path: PathBuf,
    input_override: Option<[usize; 4]>,
}

impl OnnxModelProvider {
    /// `input_override` pins the input shape for graphs whose input fact is symbolic.
    pub fn new<P: AsRef<Path>>(path: P, input_override: Option<[usize; 4]>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            input_override,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackendProvider for OnnxModelProvider {
    fn build(&self, kind: BackendKind) -> Result<Box<dyn ClassifierBackend>> {
        let backend = TractBackend::load(&self.path, self.input_override, kind)?;
        Ok(Box::new(backend))
    }
}

struct TractBackend {
    plan: RunnableModel,
    shape: InputShape,
    dims: [usize; 4],
    output_len: usize,
}

impl TractBackend {
    fn load(path: &Path, input_override: Option<[usize; 4]>, kind: BackendKind) -> Result<Self> {
        anyhow::ensure!(path.exists(), "model file not found: {}", path.display());

        let mut model = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?;
        if let Some(dims) = input_override {
            model = model
                .with_input_fact(0, f32::fact(dims).into())
                .map_err(|e| anyhow::anyhow!("unable to pin classifier input to {dims:?}: {e}"))?;
        }

        let typed = model
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check classifier graph: {e}"))?;

        let input_dims = typed
            .input_fact(0)
            .map_err(|e| anyhow::anyhow!("classifier graph has no input: {e}"))?
            .shape
            .as_concrete()
            .map(|dims| dims.to_vec())
            .ok_or_else(|| {
                anyhow::anyhow!("classifier input shape is symbolic; set model.input_shape")
            })?;
        let shape = InputShape::from_dims(&input_dims)?;
        let output_len = typed
            .output_fact(0)
            .map_err(|e| anyhow::anyhow!("classifier graph has no output: {e}"))?
            .shape
            .as_concrete()
            .map(|dims| dims.iter().product::<usize>())
            .ok_or_else(|| anyhow::anyhow!("classifier output shape is symbolic"))?;

        let plan = match kind {
            BackendKind::Accelerated => typed
                .into_optimized()
                .map_err(|e| anyhow::anyhow!("unable to optimize classifier graph: {e}"))?
                .into_runnable(),
            BackendKind::Baseline => typed
                .into_decluttered()
                .map_err(|e| anyhow::anyhow!("unable to declutter classifier graph: {e}"))?
                .into_runnable(),
        }
        .map_err(|e| anyhow::anyhow!("unable to make classifier graph runnable: {e}"))?;

        debug!(
            "Loaded {:?} classifier plan from {} (input {:?}, {} outputs)",
            kind,
            path.display(),
            shape.dims(),
            output_len
        );

        Ok(Self {
            plan,
            shape,
            dims: shape.dims(),
            output_len,
        })
    }
}

impl ClassifierBackend for TractBackend {
    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn output_len(&self) -> usize {
        self.output_len
    }

    fn run(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        let tensor = Tensor::from_shape(&self.dims, input)
            .map_err(|e| anyhow::anyhow!("failed to build classifier input tensor: {e}"))?;
        let outputs = self
            .plan
            .run(tvec![tensor.into()])
            .map_err(|e| anyhow::anyhow!("classifier execution failed: {e}"))?;
        let scores = outputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("classifier produced no outputs"))?
            .as_slice::<f32>()
            .map_err(|e| anyhow::anyhow!("classifier output is not f32: {e}"))?;

        if scores.len() != output.len() {
            warn!(
                "Classifier produced {} scores, expected {}",
                scores.len(),
                output.len()
            );
        }
        let n = scores.len().min(output.len());
        output[..n].copy_from_slice(&scores[..n]);
        Ok(())
    }
}
