//! # Sample Source Module
//!
//! The boundary between a capture session and whatever produces audio.
//! A [`SampleSource`] runs on the session's capture worker and pushes mono
//! blocks into a [`SampleSink`] until it is exhausted or the session raises
//! the [`StopFlag`].

use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Cooperative cancellation flag shared between a session and its worker.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Destination for captured samples.
///
/// Cheap to clone; all clones append to the same session buffer.
#[derive(Debug, Clone)]
pub struct SampleSink {
    buffer: Arc<Mutex<Vec<f32>>>,
    sample_rate: Arc<AtomicU32>,
    preview: Option<Sender<Vec<f32>>>,
}

impl SampleSink {
    pub(crate) fn new(
        buffer: Arc<Mutex<Vec<f32>>>,
        sample_rate: Arc<AtomicU32>,
        preview: Option<Sender<Vec<f32>>>,
    ) -> Self {
        Self { buffer, sample_rate, preview }
    }

    /// Appends a block of mono samples.
    pub fn push(&self, block: &[f32]) {
        if block.is_empty() {
            return;
        }
        {
            let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
            buffer.extend_from_slice(block);
        }
        if let Some(preview) = &self.preview {
            // Preview is best effort; drop the block if the analyser lags.
            let _ = preview.try_send(block.to_vec());
        }
    }

    /// Records the rate the source actually delivers at.
    pub fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::SeqCst);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::SeqCst)
    }
}

/// Produces audio for one capture session.
pub trait SampleSource: Send {
    /// Delivers samples into `sink` until `stop` is set or the source runs
    /// dry. Errors are reported to the session, which logs them.
    fn run(&mut self, sink: &SampleSink, stop: &StopFlag) -> anyhow::Result<()>;
}

/// Creates a fresh [`SampleSource`] for every session start.
pub trait SourceFactory: Send {
    fn create(&mut self) -> anyhow::Result<Box<dyn SampleSource>>;
}

impl<F> SourceFactory for F
where
    F: FnMut() -> anyhow::Result<Box<dyn SampleSource>> + Send,
{
    fn create(&mut self) -> anyhow::Result<Box<dyn SampleSource>> {
        self()
    }
}

/// Replays an in-memory buffer in fixed-size blocks.
#[derive(Debug, Clone)]
pub struct VecSource {
    samples: Vec<f32>,
    block_size: usize,
    sample_rate: u32,
    block_delay: Option<Duration>,
}

impl VecSource {
    pub fn new(samples: Vec<f32>, block_size: usize, sample_rate: u32) -> Self {
        Self {
            samples,
            block_size: block_size.max(1),
            sample_rate,
            block_delay: None,
        }
    }

    /// Sleeps between blocks to mimic a real-time device.
    pub fn with_block_delay(mut self, delay: Duration) -> Self {
        self.block_delay = Some(delay);
        self
    }
}

impl SampleSource for VecSource {
    fn run(&mut self, sink: &SampleSink, stop: &StopFlag) -> anyhow::Result<()> {
        sink.set_sample_rate(self.sample_rate);
        for block in self.samples.chunks(self.block_size) {
            if stop.is_set() {
                break;
            }
            sink.push(block);
            if let Some(delay) = self.block_delay {
                std::thread::sleep(delay);
            }
        }
        Ok(())
    }
}
