//! # Score Export Module
//!
//! Writes a note sequence as LilyPond source and runs the `lilypond`
//! executable on it to produce a PDF.
//!
//! The renderer location is part of [`LilypondConfig`] and is passed in at
//! call time; there is no process-wide setting.

use crate::accumulator::NoteSequence;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;
use tracing::{info, warn};

/// LilyPond language version written into every score.
pub const LILYPOND_VERSION: &str = "2.24.0";

/// How to invoke the external typesetter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LilypondConfig {
    /// Path to (or name of) the `lilypond` executable.
    pub executable: PathBuf,
    /// Extra arguments placed before the output options.
    pub extra_args: Vec<String>,
    /// Title printed in the score header.
    pub title: String,
}

impl Default for LilypondConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("lilypond"),
            extra_args: Vec::new(),
            title: "Transcription".to_string(),
        }
    }
}

/// Export failures. None of them leave the session unusable.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write score source {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lilypond exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("lilypond finished but did not produce {}", path.display())]
    MissingOutput { path: PathBuf },
}

/// Files produced by a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub ly_path: PathBuf,
    pub pdf_path: PathBuf,
}

/// Escapes a string for use inside a LilyPond string literal.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Renders `sequence` as a single-staff LilyPond score of quarter notes.
pub fn write_lilypond(sequence: &NoteSequence, title: &str) -> String {
    let body = if sequence.is_empty() {
        // A staff needs at least one event for LilyPond to engrave it.
        "s4".to_string()
    } else {
        sequence
            .iter()
            .map(|note| format!("{}4", note.name.lilypond()))
            .collect::<Vec<_>>()
            .join(" ")
    };

    format!(
        r#"\version "{version}"

\header {{
  title = "{title}"
  tagline = ##f
}}

\score {{
  \new Staff {{
    \absolute {{
      {body}
    }}
  }}
  \layout {{ }}
}}
"#,
        version = LILYPOND_VERSION,
        title = escape(title),
        body = body,
    )
}

/// Output stem for a requested PDF path: the same path without `.pdf`.
fn output_stem(pdf_path: &Path) -> PathBuf {
    let is_pdf = pdf_path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        pdf_path.with_extension("")
    } else {
        pdf_path.to_path_buf()
    }
}

/// Appends `suffix` to the file name of `stem` (which may contain dots).
fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Writes scores to disk and typesets them.
#[derive(Debug, Clone, Default)]
pub struct ScoreExporter {
    config: LilypondConfig,
}

impl ScoreExporter {
    /// Creates an exporter that invokes the typesetter described by `config`.
    pub fn new(config: LilypondConfig) -> Self {
        Self { config }
    }

    /// Writes `<stem>.ly` next to `pdf_path` and renders it to `<stem>.pdf`.
    ///
    /// # Arguments
    /// * `sequence` - The transcription to typeset
    /// * `pdf_path` - Requested PDF location; a `.pdf` extension is optional
    ///
    /// # Returns
    /// * `Ok(ExportReport)` - Paths of the written source and the rendered PDF
    /// * `Err(ExportError)` - The source could not be written, or LilyPond could
    ///   not be started or failed. The `.ly` file is kept in the latter cases.
    pub fn export(
        &self,
        sequence: &NoteSequence,
        pdf_path: impl AsRef<Path>,
    ) -> Result<ExportReport, ExportError> {
        let stem = output_stem(pdf_path.as_ref());
        let ly_path = with_suffix(&stem, ".ly");
        let pdf_path = with_suffix(&stem, ".pdf");

        let source = write_lilypond(sequence, &self.config.title);
        std::fs::write(&ly_path, source).map_err(|source| ExportError::Write {
            path: ly_path.clone(),
            source,
        })?;
        info!("[EXPORT] Wrote {} notes to {}", sequence.len(), ly_path.display());

        self.run_lilypond(&[], &stem, &ly_path)?;

        info!("[EXPORT] Score rendered to {}", pdf_path.display());
        Ok(ExportReport { ly_path, pdf_path })
    }

    /// Renders a PNG image of the first system of an already written score.
    ///
    /// # Arguments
    /// * `ly_path` - LilyPond source, usually [`ExportReport::ly_path`]
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - The `<stem>.preview.png` written next to the source
    /// * `Err(ExportError)` - LilyPond could not be started, failed, or wrote
    ///   no image
    pub fn render_preview(&self, ly_path: impl AsRef<Path>) -> Result<PathBuf, ExportError> {
        let ly_path = ly_path.as_ref();
        let stem = ly_path.with_extension("");
        let png_path = with_suffix(&stem, ".preview.png");
        // An image left by an earlier render must not pass for this one.
        let _ = std::fs::remove_file(&png_path);

        self.run_lilypond(&["--png", "-dpreview", "-dno-print-pages"], &stem, ly_path)?;

        if !png_path.exists() {
            warn!("[EXPORT] Preview {} was not produced", png_path.display());
            return Err(ExportError::MissingOutput { path: png_path });
        }
        info!("[EXPORT] Preview rendered to {}", png_path.display());
        Ok(png_path)
    }

    /// Runs `<executable> [extra_args] [options] -o <stem> <ly_path>`.
    fn run_lilypond(&self, options: &[&str], stem: &Path, ly_path: &Path) -> Result<(), ExportError> {
        let output = Command::new(&self.config.executable)
            .args(&self.config.extra_args)
            .args(options)
            .arg("-o")
            .arg(stem)
            .arg(ly_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| ExportError::Spawn {
                program: self.config.executable.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("[EXPORT] LilyPond failed with {}: {}", output.status, stderr);
            return Err(ExportError::Failed {
                status: output.status,
                stderr,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PitchTrack;
    use crate::accumulator::NoteAccumulator;

    fn sequence_of(freqs: &[f32]) -> NoteSequence {
        let track = PitchTrack::from_columns(freqs.iter().map(|&f| vec![(f, 1.0)]).collect());
        let mut acc = NoteAccumulator::default();
        acc.process_track(&track);
        acc.finish()
    }

    #[test]
    fn test_lilypond_source_lists_quarter_notes() {
        let source = write_lilypond(&sequence_of(&[440.0, 261.63, 277.18]), "Demo");
        assert!(source.contains(r#"\version "2.24.0""#));
        assert!(source.contains(r#"title = "Demo""#));
        assert!(source.contains("a'4 c'4 cis'4"));
    }

    #[test]
    fn test_empty_sequence_still_renders_a_staff() {
        let source = write_lilypond(&NoteSequence::new(), "Empty");
        assert!(source.contains(r#"\new Staff"#));
        assert!(source.contains("s4"));
    }

    #[test]
    fn test_title_is_escaped() {
        let source = write_lilypond(&NoteSequence::new(), r#"My "best" take"#);
        assert!(source.contains(r#"title = "My \"best\" take""#));
    }

    #[test]
    fn test_output_stem_strips_pdf_extension() {
        assert_eq!(output_stem(Path::new("out/score.pdf")), PathBuf::from("out/score"));
        assert_eq!(output_stem(Path::new("out/score.PDF")), PathBuf::from("out/score"));
        assert_eq!(output_stem(Path::new("out/score")), PathBuf::from("out/score"));
        assert_eq!(
            with_suffix(&output_stem(Path::new("out/take.2.pdf")), ".ly"),
            PathBuf::from("out/take.2.ly")
        );
    }

    #[test]
    fn test_missing_executable_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ScoreExporter::new(LilypondConfig {
            executable: dir.path().join("no-such-lilypond"),
            ..LilypondConfig::default()
        });

        let err = exporter
            .export(&sequence_of(&[440.0]), dir.path().join("score.pdf"))
            .unwrap_err();
        assert!(matches!(err, ExportError::Spawn { .. }));
        // The source is written before the renderer runs.
        assert!(dir.path().join("score.ly").exists());
    }

    #[test]
    fn test_unwritable_source_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ScoreExporter::default();
        let err = exporter
            .export(&NoteSequence::new(), dir.path().join("missing/dir/score.pdf"))
            .unwrap_err();
        assert!(matches!(err, ExportError::Write { .. }));
    }

    /// Runs a shell script in place of lilypond, with the real arguments.
    #[cfg(unix)]
    fn fake_renderer(dir: &Path, script: &str) -> LilypondConfig {
        let path = dir.join("fake-lilypond.sh");
        std::fs::write(&path, script).unwrap();
        LilypondConfig {
            executable: PathBuf::from("/bin/sh"),
            extra_args: vec![path.to_string_lossy().into_owned()],
            ..LilypondConfig::default()
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_render_reports_paths() {
        let dir = tempfile::tempdir().unwrap();
        // Mimics lilypond: `-o <stem> <file.ly>` produces `<stem>.pdf`.
        let exporter = ScoreExporter::new(fake_renderer(dir.path(), "touch \"$2.pdf\"\n"));

        let report = exporter
            .export(&sequence_of(&[440.0, 493.88]), dir.path().join("take.pdf"))
            .unwrap();

        assert_eq!(report.ly_path, dir.path().join("take.ly"));
        assert_eq!(report.pdf_path, dir.path().join("take.pdf"));
        assert!(report.pdf_path.exists());
        let source = std::fs::read_to_string(&report.ly_path).unwrap();
        assert!(source.contains("a'4 b'4"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_renderer_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let exporter =
            ScoreExporter::new(fake_renderer(dir.path(), "echo 'syntax error' >&2\nexit 1\n"));

        match exporter.export(&sequence_of(&[440.0]), dir.path().join("bad.pdf")) {
            Err(ExportError::Failed { status, stderr }) => {
                assert!(!status.success());
                assert_eq!(stderr, "syntax error");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_preview_is_rendered_next_to_the_source() {
        let dir = tempfile::tempdir().unwrap();
        // Skips to `-o <stem>` and writes the preview image LilyPond would.
        let script = "while [ \"$1\" != \"-o\" ]; do shift; done\ntouch \"$2.preview.png\"\n";
        let exporter = ScoreExporter::new(fake_renderer(dir.path(), script));

        let ly_path = dir.path().join("take.2.ly");
        std::fs::write(&ly_path, write_lilypond(&sequence_of(&[440.0]), "Take")).unwrap();

        let png = exporter.render_preview(&ly_path).unwrap();
        assert_eq!(png, dir.path().join("take.2.preview.png"));
        assert!(png.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_preview_without_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ScoreExporter::new(fake_renderer(dir.path(), "exit 0\n"));

        let ly_path = dir.path().join("take.ly");
        std::fs::write(&ly_path, write_lilypond(&NoteSequence::new(), "Take")).unwrap();
        // A stale image from an earlier run does not count.
        std::fs::write(dir.path().join("take.preview.png"), b"old").unwrap();

        match exporter.render_preview(&ly_path) {
            Err(ExportError::MissingOutput { path }) => {
                assert_eq!(path, dir.path().join("take.preview.png"));
            }
            other => panic!("expected MissingOutput, got {other:?}"),
        }
    }
}
