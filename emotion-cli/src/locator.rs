//! Face locator backed by the `rustface` crate (SeetaFace engine).
//!
//! The SeetaFace detector lives on its own thread and answers requests over a channel, so
//! callers on any worker can await a result without sharing the detector itself.

use std::{
    fs,
    future::Future,
    io::Cursor,
    path::Path,
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use emotion_core::{FaceLocator, FaceRegion, IntensityImage};
use emotion_utils::config::DetectorSettings;
use log::{debug, info, warn};

struct DetectRequest {
    image: IntensityImage,
    reply: Sender<Vec<FaceRegion>>,
}

/// Finds faces with SeetaFace, largest face first.
pub struct SeetaLocator {
    requests: Sender<DetectRequest>,
    worker: Option<JoinHandle<()>>,
}

impl SeetaLocator {
    /// Load the model named by `settings.model_path` and start the detector thread.
    pub fn spawn(settings: &DetectorSettings) -> Result<Self> {
        let path = Path::new(&settings.model_path);
        anyhow::ensure!(
            path.exists(),
            "face detector model not found: {}",
            path.display()
        );
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read face detector model {}", path.display()))?;

        let (requests, inbox) = async_channel::unbounded::<DetectRequest>();
        let (ready_tx, ready_rx) = async_channel::bounded::<Result<(), String>>(1);
        let settings = settings.clone();
        let worker = thread::Builder::new()
            .name("emotion-face-locator".to_string())
            .spawn(move || run_detector(bytes, &settings, &inbox, &ready_tx))
            .context("failed to spawn face detector thread")?;

        match ready_rx.recv_blocking() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => anyhow::bail!("failed to load face detector model: {err}"),
            Err(_) => anyhow::bail!("face detector thread exited during start-up"),
        }
        info!("Loaded SeetaFace detector from {}", path.display());

        Ok(Self {
            requests,
            worker: Some(worker),
        })
    }
}

impl FaceLocator for SeetaLocator {
    fn locate(
        &self,
        image: &IntensityImage,
    ) -> impl Future<Output = Result<Vec<FaceRegion>>> + Send {
        let requests = self.requests.clone();
        let image = image.clone();
        async move {
            let (reply, response) = async_channel::bounded(1);
            requests
                .send(DetectRequest { image, reply })
                .await
                .map_err(|_| anyhow::anyhow!("face detector thread has stopped"))?;
            response
                .recv()
                .await
                .context("face detector dropped the request")
        }
    }
}

impl Drop for SeetaLocator {
    fn drop(&mut self) {
        self.requests.close();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("Face detector thread panicked");
        }
    }
}

fn run_detector(
    model_bytes: Vec<u8>,
    settings: &DetectorSettings,
    inbox: &Receiver<DetectRequest>,
    ready: &Sender<Result<(), String>>,
) {
    let model = match rustface::read_model(Cursor::new(model_bytes)) {
        Ok(model) => model,
        Err(err) => {
            let _ = ready.send_blocking(Err(err.to_string()));
            return;
        }
    };
    let mut detector = rustface::create_detector_with_model(model);
    detector.set_min_face_size(settings.min_face_size);
    detector.set_score_thresh(settings.score_threshold);
    detector.set_pyramid_scale_factor(settings.pyramid_scale_factor);
    detector.set_slide_window_step(settings.slide_window_step, settings.slide_window_step);
    let _ = ready.send_blocking(Ok(()));

    while let Ok(request) = inbox.recv_blocking() {
        let (width, height) = request.image.dimensions();
        let mut image = rustface::ImageData::new(request.image.as_raw(), width, height);
        let mut regions: Vec<FaceRegion> = detector
            .detect(&mut image)
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceRegion::new(
                    bbox.x(),
                    bbox.y(),
                    bbox.width() as i32,
                    bbox.height() as i32,
                )
            })
            .collect();
        regions.sort_by_key(|r| std::cmp::Reverse(i64::from(r.width) * i64::from(r.height)));
        debug!("SeetaFace found {} face(s)", regions.len());
        // The requester may have given up; nothing to do then.
        let _ = request.reply.send_blocking(regions);
    }
}
