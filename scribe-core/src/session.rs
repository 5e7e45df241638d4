//! # Capture Session Module
//!
//! Drives one transcription at a time through `Idle → Capturing →
//! Finalizing → Idle`.
//!
//! ## Threads
//! - **Capture worker**: runs the [`SampleSource`], appending to the
//!   session's raw sample buffer until the stop flag is raised
//! - **Preview worker** (optional): analyses each delivered block and emits
//!   display-only [`SessionEvent::LivePitch`] events
//!
//! Stopping raises the flag and joins both workers before the buffer is read,
//! so the batch flush always sees a buffer nobody is writing to. The flush is
//! the only path that appends to the [`NoteSequence`].

use crate::accumulator::{dominant_candidate, NoteAccumulator, NoteSequence};
use crate::analysis::PitchAnalyzer;
use crate::config::CaptureConfig;
use crate::events::{Listeners, SessionEvent, SessionListener};
use crate::notes::{NoteEvent, NoteName};
use crate::source::{SampleSink, SourceFactory, StopFlag};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Queue depth between the capture callback and the preview worker.
const PREVIEW_QUEUE_DEPTH: usize = 64;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Finalizing,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a capture is already running")]
    AlreadyCapturing,

    #[error("no capture is running")]
    NotCapturing,

    #[error("failed to open sample source: {0:#}")]
    Source(anyhow::Error),

    #[error("failed to spawn capture worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Everything owned by the capture that is currently running.
struct ActiveCapture {
    buffer: Arc<Mutex<Vec<f32>>>,
    sample_rate: Arc<AtomicU32>,
    stop: StopFlag,
    worker: JoinHandle<anyhow::Result<()>>,
    preview: Option<JoinHandle<()>>,
}

impl ActiveCapture {
    /// Stops both workers, waits for them to exit and hands back the
    /// recorded samples with the rate the source reported.
    fn shutdown(self) -> (Vec<f32>, u32) {
        let ActiveCapture { buffer, sample_rate, stop, worker, preview } = self;
        stop.set();

        // The worker owns the last sink, so joining it also closes the
        // preview channel and lets the preview worker drain and exit.
        match worker.join() {
            Ok(Ok(())) => debug!("[SESSION] Capture worker finished"),
            Ok(Err(e)) => warn!("[SESSION] Capture worker failed: {:#}", e),
            Err(_) => error!("[SESSION] Capture worker panicked"),
        }
        if let Some(preview) = preview {
            if preview.join().is_err() {
                error!("[SESSION] Preview worker panicked");
            }
        }

        let samples = {
            let mut buffer = buffer.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *buffer)
        };
        (samples, sample_rate.load(Ordering::SeqCst))
    }
}

/// A reusable capture-and-transcribe session.
pub struct Session {
    config: CaptureConfig,
    factory: Box<dyn SourceFactory>,
    analyzer: Arc<dyn PitchAnalyzer>,
    listeners: Listeners,
    state: SessionState,
    active: Option<ActiveCapture>,
    last_sequence: Option<NoteSequence>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates an idle session.
    ///
    /// # Arguments
    /// * `config` - Capture settings; the sample rate is the fallback when a
    ///   source never reports its own
    /// * `factory` - Opens a fresh [`SampleSource`](crate::source::SampleSource)
    ///   on every [`start`](Self::start)
    /// * `analyzer` - Shared by the batch flush and the live preview
    pub fn new(
        config: CaptureConfig,
        factory: impl SourceFactory + 'static,
        analyzer: Arc<dyn PitchAnalyzer>,
    ) -> Self {
        Self {
            config,
            factory: Box::new(factory),
            analyzer,
            listeners: Listeners::new(),
            state: SessionState::Idle,
            active: None,
            last_sequence: None,
        }
    }

    /// Registers a listener for all future events.
    pub fn subscribe(&self, listener: Arc<dyn SessionListener>) {
        self.listeners.subscribe(listener);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// The finalised sequence of the most recently stopped capture.
    pub fn last_sequence(&self) -> Option<&NoteSequence> {
        self.last_sequence.as_ref()
    }

    /// Number of raw samples captured so far in the running capture.
    pub fn captured_samples(&self) -> usize {
        self.active
            .as_ref()
            .map(|a| a.buffer.lock().map(|b| b.len()).unwrap_or_else(|e| e.into_inner().len()))
            .unwrap_or(0)
    }

    fn transition(&mut self, next: SessionState) {
        debug!("[SESSION] {:?} -> {:?}", self.state, next);
        self.state = next;
        self.listeners.emit(&SessionEvent::StateChanged(next));
    }

    /// Begins a new capture with a fresh buffer.
    ///
    /// # Returns
    /// * `Ok(())` - The capture worker is running and the state is `Capturing`
    /// * `Err(SessionError)` - A capture is already running, the factory could
    ///   not open a source, or a worker thread could not be spawned. The
    ///   session stays `Idle` in the latter cases.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyCapturing);
        }

        let mut source = self.factory.create().map_err(SessionError::Source)?;

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sample_rate = Arc::new(AtomicU32::new(self.config.sample_rate));
        let stop = StopFlag::new();

        let (preview_tx, preview) = if self.config.live_preview {
            let (tx, rx) = crossbeam_channel::bounded(PREVIEW_QUEUE_DEPTH);
            let analyzer = Arc::clone(&self.analyzer);
            let listeners = self.listeners.clone();
            let rate = Arc::clone(&sample_rate);
            let block_size = self.config.block_size.max(1);
            let handle = thread::Builder::new()
                .name("preview".into())
                .spawn(move || run_preview(rx, analyzer, rate, block_size, listeners))?;
            (Some(tx), Some(handle))
        } else {
            (None, None)
        };

        let sink = SampleSink::new(Arc::clone(&buffer), Arc::clone(&sample_rate), preview_tx);
        let worker_stop = stop.clone();
        let worker = thread::Builder::new()
            .name("capture".into())
            .spawn(move || {
                info!("[AUDIO-THREAD] Starting capture worker...");
                let result = source.run(&sink, &worker_stop);
                info!("[AUDIO-THREAD] Capture worker exiting");
                result
            });
        let worker = match worker {
            Ok(handle) => handle,
            Err(e) => {
                // The sink (and its preview sender) was dropped with the
                // closure, so the preview worker exits on its own.
                if let Some(handle) = preview {
                    let _ = handle.join();
                }
                return Err(SessionError::Spawn(e));
            }
        };

        self.active = Some(ActiveCapture {
            buffer,
            sample_rate,
            stop,
            worker,
            preview,
        });
        self.transition(SessionState::Capturing);
        info!("[SESSION] Capture started");
        Ok(())
    }

    /// Ends the running capture and transcribes everything it recorded.
    ///
    /// # Returns
    /// * `Ok(NoteSequence)` - The finalised sequence, also delivered to
    ///   listeners as [`SessionEvent::CaptureFinished`]. A source that failed
    ///   mid-capture still yields whatever it recorded.
    /// * `Err(SessionError::NotCapturing)` - Nothing was running
    pub fn stop(&mut self) -> Result<NoteSequence, SessionError> {
        let active = self.active.take().ok_or(SessionError::NotCapturing)?;
        self.transition(SessionState::Finalizing);

        let (samples, reported_rate) = active.shutdown();
        let sample_rate = match reported_rate {
            0 => self.config.sample_rate,
            rate => rate,
        };
        info!(
            "[SESSION] Processing {} samples ({:.2}s at {} Hz)",
            samples.len(),
            samples.len() as f32 / sample_rate as f32,
            sample_rate
        );

        let track = self.analyzer.analyze(&samples, sample_rate);
        let mut accumulator = NoteAccumulator::new(self.listeners.clone());
        accumulator.process_track(&track);
        let sequence = accumulator.finish();
        info!(
            "[SESSION] Transcribed {} notes from {} frames",
            sequence.len(),
            track.frames()
        );

        self.last_sequence = Some(sequence.clone());
        self.listeners.emit(&SessionEvent::CaptureFinished(sequence.clone()));
        self.transition(SessionState::Idle);
        Ok(sequence)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            info!("[SESSION] Dropping running capture without transcription");
            active.shutdown();
        }
    }
}

/// Analyses incoming blocks for the live display until the channel closes.
fn run_preview(
    blocks: Receiver<Vec<f32>>,
    analyzer: Arc<dyn PitchAnalyzer>,
    sample_rate: Arc<AtomicU32>,
    block_size: usize,
    listeners: Listeners,
) {
    let mut pending: Vec<f32> = Vec::with_capacity(block_size * 2);
    let mut index = 0;
    for block in blocks.iter() {
        pending.extend_from_slice(&block);
        while pending.len() >= block_size {
            let window: Vec<f32> = pending.drain(..block_size).collect();
            let rate = sample_rate.load(Ordering::SeqCst);
            if let Some(event) = preview_pitch(analyzer.as_ref(), &window, rate, index) {
                listeners.emit(&SessionEvent::LivePitch(event));
            }
            index += 1;
        }
    }
    debug!("[SESSION] Preview worker finished after {} blocks", index);
}

/// Dominant pitch of the centre frame of one block, if any.
fn preview_pitch(
    analyzer: &dyn PitchAnalyzer,
    samples: &[f32],
    sample_rate: u32,
    index: usize,
) -> Option<NoteEvent> {
    let track = analyzer.analyze(samples, sample_rate);
    if track.is_empty() {
        return None;
    }
    let (frequency, _) = dominant_candidate(&track.frame(track.frames() / 2))?;
    (frequency > 0.0 && frequency.is_finite()).then(|| NoteEvent {
        name: NoteName::from_frequency(frequency),
        frequency,
        frame: index,
    })
}
