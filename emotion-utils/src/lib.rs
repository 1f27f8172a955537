//! Common helpers shared across the emotion crates.

/// Settings shared by the pipeline and the CLI.
pub mod config;
/// Image loading helpers.
pub mod image_utils;
/// Scoped timing logs for the hot path.
pub mod telemetry;
/// Camera capture (requires the `webcam` feature).
#[cfg(feature = "webcam")]
pub mod webcam;

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::LevelFilter;

pub use config::{AppSettings, DEFAULT_LABELS, ResizeQuality};
pub use image_utils::{SUPPORTED_EXTENSIONS, is_supported_image, load_image, load_luma};
pub use telemetry::{
    TELEMETRY_TARGET, TimingGuard, configure as configure_telemetry, telemetry_allows,
    telemetry_enabled, telemetry_level, timing_guard, timing_guard_if,
};
#[cfg(feature = "webcam")]
pub use webcam::{WebcamCapture, list_webcam_devices};

/// Initialize logging once.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies. Telemetry records are always
/// let through the logger so [`configure_telemetry`] alone decides whether they appear.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(TELEMETRY_TARGET, LevelFilter::Trace);

    // A second call (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
    Ok(())
}

/// Check that `path` exists and return its canonical form.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
