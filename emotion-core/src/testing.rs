//! Fakes shared by the unit tests.

use anyhow::Result;

use crate::{
    backend::{BackendKind, BackendProvider, ClassifierBackend},
    engine::{EngineOptions, InferenceEngine},
    preprocess::InputShape,
};

/// Always answers with the same scores.
pub(crate) struct ConstantBackend {
    pub scores: Vec<f32>,
}

impl ClassifierBackend for ConstantBackend {
    fn input_shape(&self) -> InputShape {
        InputShape::square(8)
    }

    fn output_len(&self) -> usize {
        self.scores.len()
    }

    fn run(&mut self, _input: &[f32], output: &mut [f32]) -> Result<()> {
        output.copy_from_slice(&self.scores);
        Ok(())
    }
}

pub(crate) struct ConstantProvider(pub Vec<f32>);

impl BackendProvider for ConstantProvider {
    fn build(&self, _kind: BackendKind) -> Result<Box<dyn ClassifierBackend>> {
        Ok(Box::new(ConstantBackend {
            scores: self.0.clone(),
        }))
    }
}

/// Engine over a [`ConstantBackend`] with the default four labels.
pub(crate) fn constant_engine(scores: Vec<f32>) -> InferenceEngine {
    let labels = emotion_utils::DEFAULT_LABELS
        .iter()
        .map(|s| s.to_string())
        .collect();
    InferenceEngine::with_provider(&ConstantProvider(scores), labels, EngineOptions::default())
        .expect("constant engine")
}
