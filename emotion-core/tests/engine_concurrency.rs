use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::Result;
use emotion_core::{
    BackendKind, BackendProvider, ClassifierBackend, EngineOptions, InferenceEngine, InputShape,
    InputTensor,
};

/// Copies the first input value to every output and notices overlapping passes.
struct EchoBackend {
    busy: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
}

impl ClassifierBackend for EchoBackend {
    fn input_shape(&self) -> InputShape {
        InputShape::square(16)
    }

    fn output_len(&self) -> usize {
        4
    }

    fn run(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_micros(200));
        output.fill(input[0]);
        self.busy.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct EchoProvider {
    busy: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
}

impl BackendProvider for EchoProvider {
    fn build(&self, _kind: BackendKind) -> Result<Box<dyn ClassifierBackend>> {
        Ok(Box::new(EchoBackend {
            busy: Arc::clone(&self.busy),
            overlaps: Arc::clone(&self.overlaps),
        }))
    }
}

fn labels() -> Vec<String> {
    emotion_utils::DEFAULT_LABELS
        .iter()
        .map(|label| label.to_string())
        .collect()
}

#[test]
fn concurrent_classify_calls_never_overlap_and_stay_paired() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 20;

    let provider = EchoProvider::default();
    let engine = InferenceEngine::with_provider(&provider, labels(), EngineOptions::default())
        .expect("engine");

    thread::scope(|scope| {
        for worker in 0..THREADS {
            let engine = &engine;
            scope.spawn(move || {
                let value = (worker + 1) as f32 / 10.0;
                let tensor = InputTensor::filled(engine.input_shape(), value);
                for _ in 0..ROUNDS {
                    let scores = engine.classify(&tensor).expect("classify");
                    assert_eq!(scores.as_slice(), &[value; 4], "worker {worker}");
                }
            });
        }
    });

    assert_eq!(provider.overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn concurrent_image_classification_uses_fresh_buffers() {
    let provider = EchoProvider::default();
    let engine = InferenceEngine::with_provider(&provider, labels(), EngineOptions::default())
        .expect("engine");

    thread::scope(|scope| {
        for level in [0u8, 51, 102, 255] {
            let engine = &engine;
            scope.spawn(move || {
                let face = emotion_core::IntensityImage::filled(40, 40, level);
                let expected = f32::from(level) / 255.0;
                for _ in 0..10 {
                    let scores = engine.classify_image(&face).expect("classify");
                    for &score in scores.as_slice() {
                        assert!((score - expected).abs() < 1e-6, "{score} != {expected}");
                    }
                }
            });
        }
    });

    assert_eq!(provider.overlaps.load(Ordering::SeqCst), 0);
}
