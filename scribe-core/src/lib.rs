// scribe-core/src/lib.rs

//! The core logic for the note transcriber.
//! This crate captures audio, tracks the dominant pitch of every analysis
//! frame, names the notes and typesets the result with LilyPond. It is
//! completely headless and contains no GUI code.

pub mod accumulator;
pub mod analysis;
pub mod audio;
pub mod config;
pub mod events;
pub mod notes;
pub mod score;
pub mod session;
pub mod source;

pub use accumulator::{NoteAccumulator, NoteSequence};
pub use analysis::{AnalysisConfig, PitchAnalyzer, PitchTrack, SpectralPeakAnalyzer};
pub use config::{AppConfig, CaptureConfig};
pub use events::{SessionEvent, SessionListener};
pub use notes::{note_name_for_frequency, NoteEvent, NoteName, PitchClass};
pub use score::{ExportError, ExportReport, LilypondConfig, ScoreExporter};
pub use session::{Session, SessionError, SessionState};
pub use source::{SampleSink, SampleSource, SourceFactory, StopFlag, VecSource};
