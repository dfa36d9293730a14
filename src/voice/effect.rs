//! Effects produced by voice transitions

use super::VoiceTimer;

/// Effects to be executed after a voice transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartCapture,
    StopCapture,
    StartPlayback { utterance: u64, text: String },
    CancelPlayback,
    /// Fire `timer` after its configured delay, tagged with `generation`
    Schedule { timer: VoiceTimer, generation: u64 },
    /// A finalized transcription to forward as a user utterance
    SubmitUtterance { text: String },
    /// Capability fault to show the user
    Notice { message: String },
    PublishSnapshot,
}
