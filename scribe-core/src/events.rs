//! Session notifications and the listeners that receive them.

use crate::accumulator::NoteSequence;
use crate::notes::NoteEvent;
use crate::session::SessionState;
use crossbeam_channel::Sender;
use std::sync::{Arc, RwLock};

/// Notifications emitted by a capture session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A note was appended to the session's sequence.
    NoteDetected(NoteEvent),
    /// Display-only pitch from a block that just arrived during capture.
    /// Never part of the transcription.
    LivePitch(NoteEvent),
    /// The batch flush completed; carries the finalised sequence.
    CaptureFinished(NoteSequence),
    /// The session moved to a new lifecycle state.
    StateChanged(SessionState),
}

/// Receives session events synchronously, on the thread that emits them.
pub trait SessionListener: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

impl<F> SessionListener for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event)
    }
}

impl SessionListener for Sender<SessionEvent> {
    fn on_event(&self, event: &SessionEvent) {
        // A dropped receiver just means nobody is watching any more.
        let _ = self.send(event.clone());
    }
}

/// Shared, ordered registry of listeners.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<RwLock<Vec<Arc<dyn SessionListener>>>>,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("count", &self.len()).finish()
    }
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn SessionListener>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.push(listener);
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.len()).unwrap_or_else(|e| e.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every listener in registration order.
    pub fn emit(&self, event: &SessionEvent) {
        // Snapshot so a listener may subscribe others without deadlocking.
        let snapshot: Vec<Arc<dyn SessionListener>> = {
            let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        for listener in snapshot {
            listener.on_event(event);
        }
    }
}
