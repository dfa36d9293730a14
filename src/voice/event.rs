//! Events that drive the voice coordinator

use crate::session::Role;
use std::fmt;

/// Timers the coordinator schedules for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceTimer {
    RestartCapture,
    BeginPlayback,
    CooldownOver,
    ResumeListening,
}

/// Why the platform's recognizer gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureErrorKind {
    /// Silence timeout; the end-of-stream event that follows handles restart
    NoSpeech,
    /// We stopped it ourselves
    Aborted,
    /// Microphone permission denied
    NotAllowed,
    Other(String),
}

impl CaptureErrorKind {
    /// Benign errors are followed by a normal end-of-stream
    pub fn is_benign(&self) -> bool {
        matches!(self, CaptureErrorKind::NoSpeech | CaptureErrorKind::Aborted)
    }
}

impl fmt::Display for CaptureErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureErrorKind::NoSpeech => f.write_str("no speech detected"),
            CaptureErrorKind::Aborted => f.write_str("aborted"),
            CaptureErrorKind::NotAllowed => f.write_str("microphone permission denied"),
            CaptureErrorKind::Other(message) => f.write_str(message),
        }
    }
}

/// Events that trigger voice transitions
#[derive(Debug, Clone)]
pub enum Event {
    /// User pressed the mic button
    ToggleListening,

    // Capture events
    CaptureResult { text: String, is_final: bool },
    CaptureEnded,
    CaptureFailed { error: CaptureErrorKind },

    // Playback events
    PlaybackFinished { utterance: u64 },
    PlaybackFailed { utterance: u64, message: String },

    // Session events
    TranscriptAppended { index: usize, role: Role, text: String },
    CompletionChanged { complete: bool },
    Close,

    TimerFired { timer: VoiceTimer, generation: u64 },
}
