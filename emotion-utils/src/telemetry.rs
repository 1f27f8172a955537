//! Scoped timing guards for the hot path.
//!
//! A guard records when it was created and, if telemetry was switched on through
//! [`configure`] and the logger accepts the level on the `emotion::telemetry` target, logs the
//! elapsed time when it goes out of scope. Disabled guards cost one `Instant::now()`.

use std::{
    borrow::Cow,
    sync::atomic::{AtomicU8, Ordering},
    time::{Duration, Instant},
};

use log::{Level, LevelFilter, log, log_enabled};

/// Log target used for every timing record.
pub const TELEMETRY_TARGET: &str = "emotion::telemetry";

// 0 = off, otherwise the highest enabled `Level` as 1 (error) ..= 5 (trace).
static THRESHOLD: AtomicU8 = AtomicU8::new(0);

/// RAII timer returned by [`timing_guard`].
#[must_use = "the guard measures the scope it lives in"]
pub struct TimingGuard {
    label: Cow<'static, str>,
    level: Level,
    start: Instant,
    active: bool,
}

impl TimingGuard {
    /// Whether this guard will log on drop.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Time elapsed since the guard was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer without logging and hand back the elapsed time.
    pub fn finish(mut self) -> Duration {
        self.active = false;
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if self.active {
            log!(
                target: TELEMETRY_TARGET,
                self.level,
                "{} took {:.2?}",
                self.label,
                self.start.elapsed()
            );
        }
    }
}

/// Start timing `label`, logging at `level` when telemetry allows it.
pub fn timing_guard(label: impl Into<Cow<'static, str>>, level: Level) -> TimingGuard {
    timing_guard_if(label, level, true)
}

/// Like [`timing_guard`], with an extra caller-side switch.
pub fn timing_guard_if(
    label: impl Into<Cow<'static, str>>,
    level: Level,
    enabled: bool,
) -> TimingGuard {
    let active =
        enabled && telemetry_allows(level) && log_enabled!(target: TELEMETRY_TARGET, level);
    TimingGuard {
        label: label.into(),
        level,
        start: Instant::now(),
        active,
    }
}

/// Turn telemetry on or off and set the most verbose level it may emit.
pub fn configure(enabled: bool, level: LevelFilter) {
    let threshold = if enabled { level as usize as u8 } else { 0 };
    THRESHOLD.store(threshold, Ordering::Relaxed);
}

/// Whether any telemetry is currently emitted.
pub fn telemetry_enabled() -> bool {
    THRESHOLD.load(Ordering::Relaxed) > 0
}

/// Most verbose level telemetry currently emits.
pub fn telemetry_level() -> LevelFilter {
    match THRESHOLD.load(Ordering::Relaxed) {
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        5 => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

/// Whether a guard at `level` would be allowed to log.
pub fn telemetry_allows(level: Level) -> bool {
    level <= telemetry_level()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Telemetry state is process-wide, so everything touching it lives in one test.
    #[test]
    fn configure_controls_threshold() {
        configure(false, LevelFilter::Trace);
        assert!(!telemetry_enabled());
        assert!(!telemetry_allows(Level::Error));
        assert!(!timing_guard("disabled", Level::Error).is_active());

        configure(true, LevelFilter::Info);
        assert!(telemetry_enabled());
        assert_eq!(telemetry_level(), LevelFilter::Info);
        assert!(telemetry_allows(Level::Warn));
        assert!(telemetry_allows(Level::Info));
        assert!(!telemetry_allows(Level::Debug));

        configure(false, LevelFilter::Off);
        assert_eq!(telemetry_level(), LevelFilter::Off);
    }

    #[test]
    fn finish_reports_elapsed_without_logging() {
        let guard = timing_guard_if("manual", Level::Debug, false);
        assert!(!guard.is_active());
        std::thread::sleep(Duration::from_millis(2));
        assert!(guard.finish() >= Duration::from_millis(2));
    }
}
