//! # Note Accumulation Module
//!
//! Reduces each analysis frame to its dominant frequency and appends the
//! matching note to an ordered sequence.
//!
//! Selection happens before validation: the candidate with the highest
//! magnitude wins, and only then is its frequency checked. A frame whose
//! strongest candidate has no positive frequency contributes nothing, even if
//! a weaker candidate would have been a valid pitch.

use crate::analysis::{Frame, PitchTrack};
use crate::events::{Listeners, SessionEvent};
use crate::notes::{NoteEvent, NoteName};
use serde::{Deserialize, Serialize};

/// Ordered, append-only transcription of one capture session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteSequence {
    notes: Vec<NoteEvent>,
}

impl NoteSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, event: NoteEvent) {
        self.notes.push(event);
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NoteEvent> {
        self.notes.iter()
    }

    pub fn as_slice(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn names(&self) -> Vec<NoteName> {
        self.notes.iter().map(|n| n.name).collect()
    }
}

impl<'a> IntoIterator for &'a NoteSequence {
    type Item = &'a NoteEvent;
    type IntoIter = std::slice::Iter<'a, NoteEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.notes.iter()
    }
}

/// Picks the candidate with the largest magnitude.
///
/// The first maximum wins on ties; NaN magnitudes never win.
pub fn dominant_candidate(frame: &Frame<'_>) -> Option<(f32, f32)> {
    frame.candidates().fold(None, |best, (freq, mag)| match best {
        _ if mag.is_nan() => best,
        Some((_, best_mag)) if mag <= best_mag => best,
        _ => Some((freq, mag)),
    })
}

/// Turns frames into notes for a single session.
#[derive(Debug, Default)]
pub struct NoteAccumulator {
    sequence: NoteSequence,
    listeners: Listeners,
}

impl NoteAccumulator {
    pub fn new(listeners: Listeners) -> Self {
        Self {
            sequence: NoteSequence::new(),
            listeners,
        }
    }

    /// Processes one frame. Returns the appended note, or `None` when the
    /// frame's dominant frequency is not a valid pitch.
    pub fn process_frame(&mut self, index: usize, frame: &Frame<'_>) -> Option<NoteEvent> {
        let (frequency, _) = dominant_candidate(frame)?;
        if !(frequency > 0.0 && frequency.is_finite()) {
            return None;
        }

        let event = NoteEvent {
            name: NoteName::from_frequency(frequency),
            frequency,
            frame: index,
        };
        self.sequence.push(event.clone());
        self.listeners.emit(&SessionEvent::NoteDetected(event.clone()));
        Some(event)
    }

    /// Processes every frame of `track` in time order.
    pub fn process_track(&mut self, track: &PitchTrack) {
        for (index, frame) in track.iter_frames().enumerate() {
            self.process_frame(index, &frame);
        }
    }

    pub fn sequence(&self) -> &NoteSequence {
        &self.sequence
    }

    pub fn finish(self) -> NoteSequence {
        self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_listeners() -> (Listeners, Arc<Mutex<Vec<SessionEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listeners = Listeners::new();
        let sink = Arc::clone(&seen);
        listeners.subscribe(Arc::new(move |e: &SessionEvent| sink.lock().unwrap().push(e.clone())));
        (listeners, seen)
    }

    #[test]
    fn test_non_positive_frames_produce_nothing() {
        let (listeners, seen) = recording_listeners();
        let mut acc = NoteAccumulator::new(listeners);
        let track = PitchTrack::from_columns(vec![
            vec![(0.0, 0.0), (0.0, 0.0)],
            vec![(-3.0, 1.0), (0.0, 0.5)],
            vec![(0.0, 0.2)],
        ]);

        acc.process_track(&track);

        assert!(acc.finish().is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_selection_happens_before_validation() {
        let (listeners, seen) = recording_listeners();
        let mut acc = NoteAccumulator::new(listeners);
        let track = PitchTrack::from_columns(vec![vec![(0.0, 0.9), (440.0, 0.3)]]);

        assert!(acc.process_frame(0, &track.frame(0)).is_none());
        assert!(acc.sequence().is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dominant_frequency_is_appended_and_notified() {
        let (listeners, seen) = recording_listeners();
        let mut acc = NoteAccumulator::new(listeners);
        let track = PitchTrack::from_columns(vec![
            vec![(0.0, 0.0), (440.0, 0.8), (880.0, 0.2)],
            vec![(0.0, 0.0), (0.0, 0.0), (0.0, 0.0)],
            vec![(261.63, 0.5), (0.0, 0.0), (523.25, 0.1)],
        ]);

        acc.process_track(&track);
        let sequence = acc.finish();

        let names: Vec<String> = sequence.names().iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["A4", "C4"]);
        assert_eq!(sequence.as_slice()[0].frame, 0);
        assert_eq!(sequence.as_slice()[1].frame, 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], SessionEvent::NoteDetected(sequence.as_slice()[0].clone()));
        assert_eq!(seen[1], SessionEvent::NoteDetected(sequence.as_slice()[1].clone()));
    }

    #[test]
    fn test_ties_pick_first_candidate() {
        let track = PitchTrack::from_columns(vec![vec![(220.0, 0.5), (440.0, 0.5)]]);
        assert_eq!(dominant_candidate(&track.frame(0)), Some((220.0, 0.5)));
    }

    #[test]
    fn test_nan_magnitude_never_wins() {
        let track = PitchTrack::from_columns(vec![vec![(330.0, f32::NAN), (440.0, 0.1)]]);
        assert_eq!(dominant_candidate(&track.frame(0)), Some((440.0, 0.1)));
    }

    #[test]
    fn test_empty_frame_has_no_dominant_candidate() {
        let track = PitchTrack::from_columns(vec![vec![]]);
        assert_eq!(dominant_candidate(&track.frame(0)), None);
    }
}
