#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use anyhow::Result;
use async_channel::{Receiver, Sender};
use emotion_core::{
    BackendKind, BackendProvider, CapturedFrame, ClassifierBackend, EmotionReport, EngineOptions,
    FaceLocator, FaceRegion, InferenceEngine, InputShape, IntensityImage, OverlayUpdate,
    OwnedFrame, PipelineSink, RawFrame,
};

pub fn labels() -> Vec<String> {
    emotion_utils::DEFAULT_LABELS
        .iter()
        .map(|label| label.to_string())
        .collect()
}

/// Frame that counts how often it has been released.
pub struct TrackedFrame {
    inner: OwnedFrame,
    releases: Arc<AtomicUsize>,
}

impl TrackedFrame {
    pub fn new(inner: OwnedFrame, releases: &Arc<AtomicUsize>) -> Self {
        Self {
            inner,
            releases: Arc::clone(releases),
        }
    }

    pub fn black(width: u32, height: u32, releases: &Arc<AtomicUsize>) -> Self {
        Self::new(OwnedFrame::filled(width, height, 0), releases)
    }
}

impl CapturedFrame for TrackedFrame {
    fn raw(&self) -> RawFrame<'_> {
        self.inner.raw()
    }
}

impl Drop for TrackedFrame {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Locator that always reports the same regions.
#[derive(Default)]
pub struct FixedLocator {
    regions: Vec<FaceRegion>,
    calls: AtomicUsize,
}

impl FixedLocator {
    pub fn new(regions: Vec<FaceRegion>) -> Self {
        Self {
            regions,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceLocator for FixedLocator {
    async fn locate(&self, _image: &IntensityImage) -> Result<Vec<FaceRegion>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.regions.clone())
    }
}

pub struct FailingLocator;

impl FaceLocator for FailingLocator {
    async fn locate(&self, _image: &IntensityImage) -> Result<Vec<FaceRegion>> {
        anyhow::bail!("detector crashed")
    }
}

/// Locator that records the intensity of each image and holds every call until opened.
pub struct GatedLocator {
    seen: Mutex<Vec<u8>>,
    entered_tx: Sender<()>,
    entered_rx: Receiver<()>,
    gate_tx: Sender<()>,
    gate_rx: Receiver<()>,
}

impl Default for GatedLocator {
    fn default() -> Self {
        let (entered_tx, entered_rx) = async_channel::unbounded();
        let (gate_tx, gate_rx) = async_channel::bounded(1);
        Self {
            seen: Mutex::new(Vec::new()),
            entered_tx,
            entered_rx,
            gate_tx,
            gate_rx,
        }
    }
}

impl GatedLocator {
    /// Block until some call has reached the gate.
    pub fn wait_entered(&self) {
        self.entered_rx.recv_blocking().expect("locator entered");
    }

    /// Release every waiting and future call.
    pub fn open(&self) {
        self.gate_tx.close();
    }

    pub fn seen(&self) -> Vec<u8> {
        self.seen.lock().unwrap().clone()
    }
}

impl FaceLocator for GatedLocator {
    async fn locate(&self, image: &IntensityImage) -> Result<Vec<FaceRegion>> {
        self.seen.lock().unwrap().push(image.as_raw()[0]);
        let _ = self.entered_tx.send(()).await;
        // Closed gate: recv fails immediately.
        let _ = self.gate_rx.recv().await;
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    overlays: Mutex<Vec<OverlayUpdate>>,
    reports: Mutex<Vec<EmotionReport>>,
}

impl RecordingSink {
    pub fn overlays(&self) -> Vec<OverlayUpdate> {
        self.overlays.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<EmotionReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl PipelineSink for RecordingSink {
    fn publish_overlay(&self, update: OverlayUpdate) {
        self.overlays.lock().unwrap().push(update);
    }

    fn publish_emotion(&self, report: &EmotionReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Works,
    FailsToBuild,
    FailsToRun,
}

/// Backend returning fixed scores and counting passes.
pub struct ScriptedBackend {
    scores: Vec<f32>,
    fails: bool,
    runs: Arc<AtomicUsize>,
}

impl ClassifierBackend for ScriptedBackend {
    fn input_shape(&self) -> InputShape {
        InputShape::square(48)
    }

    fn output_len(&self) -> usize {
        self.scores.len()
    }

    fn run(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        anyhow::ensure!(input.len() == 48 * 48, "unexpected input length");
        self.runs.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(!self.fails, "accelerator rejected the graph");
        output.copy_from_slice(&self.scores);
        Ok(())
    }
}

pub struct ScriptedProvider {
    pub accelerated: Mode,
    pub baseline: Mode,
    pub scores: Vec<f32>,
    pub built: Mutex<Vec<BackendKind>>,
    pub runs: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            accelerated: Mode::Works,
            baseline: Mode::Works,
            scores,
            built: Mutex::new(Vec::new()),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn built(&self) -> Vec<BackendKind> {
        self.built.lock().unwrap().clone()
    }
}

impl BackendProvider for ScriptedProvider {
    fn build(&self, kind: BackendKind) -> Result<Box<dyn ClassifierBackend>> {
        let mode = match kind {
            BackendKind::Accelerated => self.accelerated,
            BackendKind::Baseline => self.baseline,
        };
        anyhow::ensure!(mode != Mode::FailsToBuild, "{kind:?} backend unavailable");
        self.built.lock().unwrap().push(kind);
        Ok(Box::new(ScriptedBackend {
            scores: self.scores.clone(),
            fails: mode == Mode::FailsToRun,
            runs: Arc::clone(&self.runs),
        }))
    }
}

/// Engine answering `scores` for every face, plus its pass counter.
pub fn scripted_engine(scores: Vec<f32>) -> (Arc<InferenceEngine>, Arc<AtomicUsize>) {
    let provider = ScriptedProvider::new(scores);
    let runs = Arc::clone(&provider.runs);
    let engine = InferenceEngine::with_provider(&provider, labels(), EngineOptions::default())
        .expect("scripted engine");
    (Arc::new(engine), runs)
}
