//! Pipeline sink for the terminal.

use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use emotion_core::{DisplayRect, EmotionReport, OverlayUpdate, PipelineSink};
use log::{debug, info};

/// Logs overlay changes and reports; optionally echoes reports to stdout as they arrive.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    echo: bool,
    overlay: Mutex<Vec<DisplayRect>>,
    reports: AtomicU64,
}

impl ConsoleSink {
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            ..Self::default()
        }
    }

    /// Face boxes currently on the overlay, in display coordinates.
    pub fn overlay(&self) -> Vec<DisplayRect> {
        self.overlay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reports_published(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }
}

impl PipelineSink for ConsoleSink {
    fn publish_overlay(&self, update: OverlayUpdate) {
        let rects = match update {
            OverlayUpdate::Clear => Vec::new(),
            OverlayUpdate::Faces { regions, display } => {
                debug!(
                    "Overlay: {} face(s) on {}x{} display",
                    regions.len(),
                    display.width,
                    display.height
                );
                regions
            }
        };
        *self.overlay.lock().unwrap_or_else(PoisonError::into_inner) = rects;
    }

    fn publish_emotion(&self, report: &EmotionReport) {
        let count = self.reports.fetch_add(1, Ordering::Relaxed) + 1;
        if self.echo {
            println!("[{count}] {report}\n");
        } else {
            info!("{} ({:.1}%)", report.label, report.confidence * 100.0);
        }
    }
}
