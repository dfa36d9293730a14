//! Voice coordinator state types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Externally visible audio mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceMode {
    Idle,
    Listening,
    Speaking,
}

/// Where a playback is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakStage {
    /// Capture was just stopped; waiting before starting playback
    Settling,
    Playing,
    /// Playback ended; waiting for the echo tail to die down
    Cooldown,
}

/// Audio channel ownership, with the data each mode needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceActivity {
    Idle {
        /// Capture resumes when the resume timer fires
        resume_pending: bool,
    },
    Listening {
        /// Platform stopped capture; waiting out the restart guard
        restart_pending: bool,
    },
    Speaking {
        utterance: u64,
        text: String,
        stage: SpeakStage,
    },
}

impl Default for VoiceActivity {
    fn default() -> Self {
        VoiceActivity::Idle {
            resume_pending: false,
        }
    }
}

impl VoiceActivity {
    pub fn mode(&self) -> VoiceMode {
        match self {
            VoiceActivity::Idle { .. } => VoiceMode::Idle,
            VoiceActivity::Listening { .. } => VoiceMode::Listening,
            VoiceActivity::Speaking { .. } => VoiceMode::Speaking,
        }
    }
}

/// Which platform speech features exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub capture: bool,
    pub playback: bool,
}

/// Coordinator state. The spoken high-water mark and the speaking flag live
/// here rather than in shared cells, so every decision is re-derivable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceState {
    pub activity: VoiceActivity,
    /// Live preview of interim capture text
    pub preview: String,
    /// Highest transcript index already spoken
    pub last_spoken_index: Option<usize>,
    pub conversation_complete: bool,
    /// Capture resumes on its own after each playback. Cleared when the
    /// user turns the mic off or capture fails.
    pub hands_free: bool,
    pub capabilities: Capabilities,
    /// Bumped on every activity change; timers from older generations are stale
    pub generation: u64,
    /// Id of the most recent playback
    pub utterance: u64,
    /// The missing-playback notice has been shown
    pub playback_notice_shown: bool,
    pub closed: bool,
}

impl VoiceState {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            hands_free: true,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> VoiceMode {
        self.activity.mode()
    }
}

/// Guard delays around audio switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceTimings {
    /// Wait before restarting capture the platform stopped on its own
    pub restart_guard: Duration,
    /// Wait between stopping capture and starting playback
    pub speak_delay: Duration,
    /// Wait after playback ends before releasing the channel
    pub cooldown: Duration,
    /// Wait after the cooldown before listening again
    pub resume_delay: Duration,
}

impl Default for VoiceTimings {
    fn default() -> Self {
        Self {
            restart_guard: Duration::from_millis(100),
            speak_delay: Duration::from_millis(300),
            cooldown: Duration::from_millis(1000),
            resume_delay: Duration::from_millis(500),
        }
    }
}
