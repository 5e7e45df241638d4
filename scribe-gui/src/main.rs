//! # Notescribe - Note Transcription GUI
//!
//! Captures audio, shows the notes being played and saves the transcription
//! as a LilyPond-typeset PDF when capture stops.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme
//! - **Capture Session**: `scribe-core` session with its own worker threads
//! - **Communication**: session events arrive on a crossbeam channel
//! - **Updates**: 50 ms tick drains events and animates the kaleidoscope
//! - **Export**: save dialog and LilyPond run as tasks, off the GUI thread

mod ui;
mod widgets;

use crossbeam_channel::{Receiver, Sender};
use iced::widget::image;
use iced::{Element, Subscription, Task, Theme};
use scribe_core::{
    audio, AppConfig, CaptureConfig, NoteSequence, PitchAnalyzer, ScoreExporter, Session,
    SessionEvent, SessionState, SpectralPeakAnalyzer,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use ui::main_display::create_main_view;
use widgets::kaleidoscope::KaleidoscopeState;

/// Config file read at startup unless `NOTESCRIBE_CONFIG` points elsewhere.
const DEFAULT_CONFIG_PATH: &str = "notescribe.json";

/// Redraw and event polling interval.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Device picker entry standing for the host's default input.
pub const DEFAULT_DEVICE_LABEL: &str = "Default input";

/// Main entry point for the Notescribe application.
pub fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("[MAIN] Starting Notescribe...");
    let result = iced::application("Notescribe", ScribeApp::update, ScribeApp::view)
        .subscription(ScribeApp::subscription)
        .theme(ScribeApp::theme)
        .run();
    info!("[MAIN] Application finished with result: {:?}", result);
    result
}

/// Application message types for the Iced GUI framework.
#[derive(Debug, Clone)]
pub enum Message {
    Start,
    Stop,
    /// The save dialog closed; `None` when it was cancelled.
    OutputChosen(Option<PathBuf>),
    ExportFinished(Result<ExportOutcome, String>),
    DeviceSelected(String),
    Tick,
}

/// A rendered score and, if LilyPond managed it, its preview image.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pdf_path: PathBuf,
    preview: Result<image::Handle, String>,
}

/// UI-specific data needed for rendering the interface.
#[derive(Debug, Clone)]
pub struct AppDisplayData {
    pub status: String,
    pub session_state: SessionState,
    /// Save dialog or LilyPond still running for the last capture.
    pub exporting: bool,
    /// Most recent note, live or transcribed.
    pub current_note: Option<String>,
    /// Notes of the current (or last finished) transcription.
    pub notes: Vec<String>,
    pub captured_seconds: f32,
    pub devices: Vec<String>,
    pub selected_device: String,
    /// Image of the last exported score.
    pub score_preview: Option<image::Handle>,
    pub kaleidoscope: KaleidoscopeState,
}

struct ScribeApp {
    session: Session,
    analyzer: Arc<dyn PitchAnalyzer>,
    exporter: ScoreExporter,
    events_tx: Sender<SessionEvent>,
    events: Receiver<SessionEvent>,
    /// Suggested location for the next save dialog.
    output_path: PathBuf,
    display_data: AppDisplayData,
}

fn load_config() -> AppConfig {
    let path = std::env::var_os("NOTESCRIBE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    match AppConfig::load_or_default(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("[MAIN] Ignoring unreadable config {}: {:#}", path.display(), e);
            AppConfig::default()
        }
    }
}

/// Builds a session on `capture` whose events go to `events_tx`.
fn build_session(
    capture: CaptureConfig,
    analyzer: Arc<dyn PitchAnalyzer>,
    events_tx: &Sender<SessionEvent>,
) -> Session {
    let session = Session::new(capture.clone(), audio::cpal_factory(capture), analyzer);
    session.subscribe(Arc::new(events_tx.clone()));
    session
}

/// Maps a device picker entry to the `CaptureConfig::device` filter.
fn device_filter(label: &str) -> Option<String> {
    (label != DEFAULT_DEVICE_LABEL).then(|| label.to_string())
}

fn device_choices(mut names: Vec<String>) -> Vec<String> {
    names.retain(|name| name != DEFAULT_DEVICE_LABEL);
    names.insert(0, DEFAULT_DEVICE_LABEL.to_string());
    names
}

impl Default for ScribeApp {
    fn default() -> Self {
        let mut config = load_config();
        if !config.analysis.is_valid() {
            warn!("[MAIN] Invalid analysis settings {:?}, using defaults", config.analysis);
            config.analysis = Default::default();
        }

        let devices = match audio::input_device_names() {
            Ok(names) => device_choices(names),
            Err(e) => {
                warn!("[MAIN] Could not list input devices: {:#}", e);
                device_choices(Vec::new())
            }
        };
        let selected_device = config
            .capture
            .device
            .clone()
            .unwrap_or_else(|| DEFAULT_DEVICE_LABEL.to_string());

        let analyzer: Arc<dyn PitchAnalyzer> =
            Arc::new(SpectralPeakAnalyzer::new(config.analysis.clone()));
        let (events_tx, events) = crossbeam_channel::unbounded();
        let session = build_session(config.capture.clone(), Arc::clone(&analyzer), &events_tx);

        Self {
            session,
            analyzer,
            exporter: ScoreExporter::new(config.lilypond.clone()),
            events_tx,
            events,
            output_path: config.output_path.clone(),
            display_data: AppDisplayData {
                status: "Press 'Start' to capture audio".to_string(),
                session_state: SessionState::Idle,
                exporting: false,
                current_note: None,
                notes: Vec::new(),
                captured_seconds: 0.0,
                devices,
                selected_device,
                score_preview: None,
                kaleidoscope: KaleidoscopeState::new(),
            },
        }
    }
}

impl ScribeApp {
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Start => {
                if self.display_data.exporting {
                    return Task::none();
                }
                match self.session.start() {
                    Ok(()) => {
                        self.display_data.status = "Capturing audio...".to_string();
                        self.display_data.notes.clear();
                        self.display_data.current_note = None;
                        self.display_data.kaleidoscope.restart();
                    }
                    Err(e) => {
                        error!("[MAIN] Could not start capture: {}", e);
                        self.display_data.status = format!("Could not start capture: {e}");
                    }
                }
                Task::none()
            }
            Message::Stop => match self.session.stop() {
                Ok(sequence) => {
                    self.drain_events();
                    self.display_data.exporting = true;
                    self.display_data.status = format!(
                        "Transcribed {} notes. Choose where to save the score",
                        sequence.len()
                    );
                    Task::perform(
                        choose_output_path(self.output_path.clone()),
                        Message::OutputChosen,
                    )
                }
                Err(e) => {
                    error!("[MAIN] Could not stop capture: {}", e);
                    self.display_data.status = format!("Could not stop capture: {e}");
                    Task::none()
                }
            },
            Message::OutputChosen(None) => {
                info!("[MAIN] Save dialog cancelled");
                self.display_data.exporting = false;
                self.display_data.status = "Score not saved".to_string();
                Task::none()
            }
            Message::OutputChosen(Some(path)) => {
                let Some(sequence) = self.session.last_sequence().cloned() else {
                    self.display_data.exporting = false;
                    return Task::none();
                };
                self.display_data.status = format!("Rendering score to {}...", path.display());
                self.output_path = path.clone();
                Task::perform(
                    export_score(self.exporter.clone(), sequence, path),
                    Message::ExportFinished,
                )
            }
            Message::ExportFinished(result) => {
                self.display_data.exporting = false;
                self.display_data.status = match result {
                    Ok(outcome) => {
                        let saved = format!("Score saved to: {}", outcome.pdf_path.display());
                        match outcome.preview {
                            Ok(handle) => {
                                self.display_data.score_preview = Some(handle);
                                saved
                            }
                            Err(e) => {
                                self.display_data.score_preview = None;
                                format!("{saved} (preview failed: {e})")
                            }
                        }
                    }
                    Err(e) => {
                        error!("[MAIN] Export failed: {}", e);
                        format!("Failed to save the score: {e}")
                    }
                };
                Task::none()
            }
            Message::DeviceSelected(label) => {
                if self.session.state() != SessionState::Idle || self.display_data.exporting {
                    return Task::none();
                }
                let mut capture = self.session.config().clone();
                capture.device = device_filter(&label);
                info!("[MAIN] Input device set to {:?}", capture.device);
                self.session = build_session(capture, Arc::clone(&self.analyzer), &self.events_tx);
                self.display_data.selected_device = label;
                Task::none()
            }
            Message::Tick => {
                self.drain_events();
                let rate = self.session.config().sample_rate.max(1);
                self.display_data.captured_seconds =
                    self.session.captured_samples() as f32 / rate as f32;
                self.display_data.kaleidoscope.advance();
                Task::none()
            }
        }
    }

    /// Applies every pending session event to the display data.
    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                SessionEvent::NoteDetected(note) => {
                    let name = note.name.to_string();
                    self.display_data.current_note = Some(name.clone());
                    self.display_data.notes.push(name);
                }
                SessionEvent::LivePitch(note) => {
                    self.display_data.status = format!("Detected note: {}", note.name);
                    self.display_data.current_note = Some(note.name.to_string());
                }
                SessionEvent::CaptureFinished(sequence) => {
                    self.display_data.notes =
                        sequence.iter().map(|n| n.name.to_string()).collect();
                }
                SessionEvent::StateChanged(state) => {
                    self.display_data.session_state = state;
                }
            }
        }
    }

    fn view(&self) -> Element<'_, Message> {
        create_main_view(&self.display_data)
    }

    fn subscription(&self) -> Subscription<Message> {
        iced::time::every(TICK_INTERVAL).map(|_| Message::Tick)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

/// Asks where to save the score, starting from `suggested`.
async fn choose_output_path(suggested: PathBuf) -> Option<PathBuf> {
    let mut dialog = rfd::AsyncFileDialog::new()
        .set_title("Save score")
        .add_filter("PDF Files", &["pdf"]);
    if let Some(name) = suggested.file_name() {
        dialog = dialog.set_file_name(name.to_string_lossy());
    }
    if let Some(dir) = suggested.parent().filter(|dir| dir.is_dir()) {
        dialog = dialog.set_directory(dir);
    }
    dialog
        .save_file()
        .await
        .map(|handle| handle.path().to_path_buf())
}

/// Writes and renders the score on a blocking thread.
async fn export_score(
    exporter: ScoreExporter,
    sequence: NoteSequence,
    path: PathBuf,
) -> Result<ExportOutcome, String> {
    tokio::task::spawn_blocking(move || render_score(&exporter, &sequence, &path))
        .await
        .map_err(|e| format!("export task failed: {e}"))?
}

/// Exports the PDF, then renders its preview image. A failed preview does
/// not fail the export.
fn render_score(
    exporter: &ScoreExporter,
    sequence: &NoteSequence,
    path: &Path,
) -> Result<ExportOutcome, String> {
    let report = exporter.export(sequence, path).map_err(|e| e.to_string())?;
    let preview = exporter
        .render_preview(&report.ly_path)
        .map_err(|e| e.to_string())
        .and_then(|png| {
            std::fs::read(&png).map_err(|e| format!("reading {}: {e}", png.display()))
        })
        .map(image::Handle::from_bytes);
    if let Err(e) = &preview {
        warn!("[MAIN] Score preview unavailable: {}", e);
    }
    Ok(ExportOutcome {
        pdf_path: report.pdf_path,
        preview,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_device_label_means_no_filter() {
        assert_eq!(device_filter(DEFAULT_DEVICE_LABEL), None);
        assert_eq!(device_filter("Loopback"), Some("Loopback".to_string()));
    }

    #[test]
    fn test_device_choices_start_with_default() {
        let choices = device_choices(vec!["Mic".to_string(), "Loopback".to_string()]);
        assert_eq!(choices, vec![DEFAULT_DEVICE_LABEL, "Mic", "Loopback"]);
        assert_eq!(device_choices(Vec::new()), vec![DEFAULT_DEVICE_LABEL]);
    }

    #[test]
    fn test_missing_renderer_fails_the_export() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ScoreExporter::new(scribe_core::LilypondConfig {
            executable: dir.path().join("no-such-lilypond"),
            ..Default::default()
        });

        let result = render_score(&exporter, &NoteSequence::new(), &dir.path().join("score.pdf"));
        assert!(result.unwrap_err().starts_with("failed to run"));
    }
}
