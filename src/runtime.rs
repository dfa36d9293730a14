//! Session runtime
//!
//! Owns the session and voice state machines and drives both from one
//! sequential event queue. Presentation sends [`Intent`]s through a
//! [`SessionHandle`] and receives [`SessionUpdate`]s; it never touches the
//! transport or the audio devices directly.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{RuntimeConfig, SessionRuntime};
pub use traits::*;

use crate::pricing::PriceSummary;
use crate::protocol::{CollectedInfo, OptionId, OptionSet, PlanningResult};
use crate::session::{self, ResultChoice, SessionPhase, TranscriptEntry};
use crate::voice::{self, VoiceMode};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};

/// What the presentation layer may ask for
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    SubmitText { text: String },
    PickOption { id: OptionId },
    ActivitiesDone,
    RequestFinalize,
    ToggleListening,
    ChooseFromResult { choice: ResultChoice },
    ConfirmBooking,
    RequestClose,
}

/// Events accepted by the runtime queue
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    Intent(Intent),
    /// Capture results, playback completions and voice timers
    Voice(voice::Event),
    /// Session timers
    Session(session::Event),
}

impl From<Intent> for RuntimeEvent {
    fn from(intent: Intent) -> Self {
        RuntimeEvent::Intent(intent)
    }
}

impl From<voice::Event> for RuntimeEvent {
    fn from(event: voice::Event) -> Self {
        RuntimeEvent::Voice(event)
    }
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub collected: CollectedInfo,
    pub transcript: Vec<TranscriptEntry>,
    pub options: Option<OptionSet>,
    /// Identities selected within the active option set
    pub selected: Vec<OptionId>,
    pub done_enabled: bool,
    pub finalize_enabled: bool,
    pub planning: bool,
    pub result: Option<PlanningResult>,
    pub price: PriceSummary,
    pub connected: bool,
    pub voice_mode: VoiceMode,
    /// Interim capture text
    pub preview: String,
}

/// Updates pushed to the presentation layer
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Snapshot(Box<SessionSnapshot>),
    /// Blocking notice: service errors, capability faults, rejected intents
    Alert { message: String },
    ConnectivityChanged { connected: bool },
    BookingConfirmed { total: f64 },
    Closed,
}

#[derive(Debug, Error)]
#[error("The session has ended")]
pub struct SessionEnded;

/// Presentation-side handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    event_tx: mpsc::Sender<RuntimeEvent>,
    updates: broadcast::Sender<SessionUpdate>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub async fn send(&self, intent: Intent) -> Result<(), SessionEnded> {
        self.event_tx
            .send(RuntimeEvent::Intent(intent))
            .await
            .map_err(|_| SessionEnded)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }
}
