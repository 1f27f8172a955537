//! Scheduling frames from a live source onto the pipeline.
//!
//! Capture never waits on analysis. Frames land in a single keep-latest slot; whatever frame
//! was still waiting there is displaced and released. Analyzer threads take frames from the
//! slot and run ingestion, then put the job into a second keep-latest slot feeding the heavy
//! detect/crop/classify chain on a rayon pool. A job still waiting for a chain worker is
//! displaced by a newer one, so workers always pick up the freshest frame.

use std::{
    sync::{
        Arc, Condvar, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use log::{debug, trace, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;

use crate::{
    frame::CapturedFrame,
    pipeline::{EmotionPipeline, FaceLocator, FrameJob, FrameOutcome, Ingested, PipelineSink},
};
use emotion_utils::AppSettings;

/// Thread counts for a [`FrameDispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Threads pulling frames out of the keep-latest slot.
    pub analyzer_slots: usize,
    /// Rayon workers running the heavy chain.
    pub chain_workers: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for DispatcherConfig {
    fn from(settings: &AppSettings) -> Self {
        Self {
            analyzer_slots: settings.pipeline.analyzer_slots.max(1),
            chain_workers: settings.pipeline.chain_workers.max(1),
        }
    }
}

/// Frame counts collected over a dispatcher's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Frames handed to [`FrameDispatcher::submit`].
    pub submitted: u64,
    /// Frames displaced by a newer one, from either slot.
    pub replaced: u64,
    /// Frames that finished ingestion without a heavy chain (disabled, skipped, bad input).
    pub short_circuited: u64,
    /// Heavy chains that ran to completion.
    pub completed: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    replaced: AtomicU64,
    short_circuited: AtomicU64,
    completed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchSummary {
        DispatchSummary {
            submitted: self.submitted.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            short_circuited: self.short_circuited.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
        }
    }
}

/// Chain tasks spawned on the pool and not yet finished.
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn acquire(self: &Arc<Self>) -> PendingTicket {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        PendingTicket(Arc::clone(self))
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct PendingTicket(Arc<Pending>);

impl Drop for PendingTicket {
    fn drop(&mut self) {
        let mut count = self.0.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// Feeds frames from a live source into an [`EmotionPipeline`].
pub struct FrameDispatcher<F: CapturedFrame> {
    sender: Sender<F>,
    analyzers: Vec<JoinHandle<()>>,
    pending: Arc<Pending>,
    counters: Arc<Counters>,
}

impl<F: CapturedFrame> FrameDispatcher<F> {
    pub fn new<L, S>(pipeline: Arc<EmotionPipeline<L, S>>, config: DispatcherConfig) -> Result<Self>
    where
        L: FaceLocator + 'static,
        S: PipelineSink + 'static,
    {
        let pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(config.chain_workers.max(1))
                .thread_name(|i| format!("emotion-chain-{i}"))
                .build()
                .context("failed to build the analysis thread pool")?,
        );
        let (sender, receiver) = async_channel::bounded(1);
        let (chain_tx, chain_rx) = async_channel::bounded(1);
        let pending = Arc::new(Pending::default());
        let counters = Arc::new(Counters::default());

        let mut analyzers = Vec::with_capacity(config.analyzer_slots.max(1));
        for index in 0..config.analyzer_slots.max(1) {
            let worker = Analyzer {
                receiver: receiver.clone(),
                chain_tx: chain_tx.clone(),
                chain_rx: chain_rx.clone(),
                pipeline: Arc::clone(&pipeline),
                pool: Arc::clone(&pool),
                pending: Arc::clone(&pending),
                counters: Arc::clone(&counters),
            };
            let handle = thread::Builder::new()
                .name(format!("emotion-analyzer-{index}"))
                .spawn(move || worker.run())
                .context("failed to spawn analyzer thread")?;
            analyzers.push(handle);
        }

        debug!(
            "Frame dispatcher started ({} analyzers, {} chain workers)",
            analyzers.len(),
            config.chain_workers
        );

        Ok(Self {
            sender,
            analyzers,
            pending,
            counters,
        })
    }

    /// Offer a frame. Never blocks; a frame still waiting in the slot is released.
    pub fn submit(&self, frame: F) {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        match self.sender.force_send(frame) {
            Ok(Some(displaced)) => {
                self.counters.replaced.fetch_add(1, Ordering::Relaxed);
                drop(displaced);
            }
            Ok(None) => {}
            Err(closed) => {
                warn!("Frame submitted after dispatcher shutdown");
                drop(closed.into_inner());
            }
        }
    }

    /// Counts so far.
    pub fn summary(&self) -> DispatchSummary {
        self.counters.snapshot()
    }

    /// Stop accepting frames, drain both slots and wait for every running chain.
    pub fn shutdown(mut self) -> DispatchSummary {
        self.sender.close();
        for handle in self.analyzers.drain(..) {
            if handle.join().is_err() {
                warn!("Analyzer thread panicked");
            }
        }
        self.pending.wait_idle();
        self.counters.snapshot()
    }
}

impl<F: CapturedFrame> Drop for FrameDispatcher<F> {
    fn drop(&mut self) {
        self.sender.close();
    }
}

struct Analyzer<F, L, S> {
    receiver: Receiver<F>,
    chain_tx: Sender<FrameJob<F>>,
    chain_rx: Receiver<FrameJob<F>>,
    pipeline: Arc<EmotionPipeline<L, S>>,
    pool: Arc<ThreadPool>,
    pending: Arc<Pending>,
    counters: Arc<Counters>,
}

impl<F, L, S> Analyzer<F, L, S>
where
    F: CapturedFrame,
    L: FaceLocator + 'static,
    S: PipelineSink + 'static,
{
    fn run(self) {
        while let Ok(frame) = self.receiver.recv_blocking() {
            let job = match self.pipeline.ingest(frame) {
                Ingested::Ready(job) => job,
                Ingested::Finished(outcome) => {
                    self.counters.short_circuited.fetch_add(1, Ordering::Relaxed);
                    trace!("Frame finished during ingestion: {outcome:?}");
                    continue;
                }
            };

            // A task is spawned each time the chain slot goes from empty to full, so a queued
            // job always has a task that will pick it up. Displacing a job needs no new task.
            match self.chain_tx.force_send(job) {
                Ok(Some(stale)) => {
                    self.counters.replaced.fetch_add(1, Ordering::Relaxed);
                    trace!("Frame {} replaced by a newer frame", stale.sequence());
                }
                Ok(None) => self.spawn_chain(),
                Err(closed) => drop(closed.into_inner()),
            }
        }
    }

    fn spawn_chain(&self) {
        let ticket = self.pending.acquire();
        let chain_rx = self.chain_rx.clone();
        let pipeline = Arc::clone(&self.pipeline);
        let counters = Arc::clone(&self.counters);
        self.pool.spawn(move || {
            if let Ok(job) = chain_rx.try_recv() {
                let outcome = pollster::block_on(pipeline.complete(job));
                log_outcome(&outcome);
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            drop(ticket);
        });
    }
}

fn log_outcome(outcome: &FrameOutcome) {
    match outcome {
        FrameOutcome::Classified(report) => trace!("{} ({:.3})", report.label, report.confidence),
        FrameOutcome::Abandoned(err) => trace!("Frame abandoned: {err}"),
        other => trace!("Frame outcome: {other:?}"),
    }
}
