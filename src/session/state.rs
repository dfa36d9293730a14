//! Session state types

use crate::protocol::{CollectedInfo, OptionSet, PlanningResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who said a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One line of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
}

impl TranscriptEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Coarse session phase, derived from `SessionState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Gathering trip parameters
    Collecting,
    /// An option set is waiting for picks
    OptionPending,
    /// All parameters collected, finalize is available
    ReadyToFinalize,
    /// Finalize sent, waiting for the planning result
    Planning,
    /// A planning result has been received
    Resulted,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Collecting => "collecting",
            SessionPhase::OptionPending => "option_pending",
            SessionPhase::ReadyToFinalize => "ready_to_finalize",
            SessionPhase::Planning => "planning",
            SessionPhase::Resulted => "resulted",
        };
        f.write_str(name)
    }
}

/// Everything the session knows. Only `transition` produces new values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Trip parameters and selections; replaced wholesale by each `bot_response`
    pub collected: CollectedInfo,
    /// Append-only conversation log
    pub transcript: Vec<TranscriptEntry>,
    /// Set only by the service
    pub is_complete: bool,
    /// Active option set, at most one
    pub options: Option<OptionSet>,
    /// Finalize sent, result or error not yet received
    pub planning: bool,
    /// Incremented on every finalize; stale planning timeouts are ignored
    pub planning_attempt: u32,
    pub result: Option<PlanningResult>,
    /// Mirrors the channel's connectivity flag
    pub connected: bool,
    pub closed: bool,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        if self.planning {
            SessionPhase::Planning
        } else if self.options.is_some() {
            SessionPhase::OptionPending
        } else if self.result.is_some() {
            SessionPhase::Resulted
        } else if self.is_complete {
            SessionPhase::ReadyToFinalize
        } else {
            SessionPhase::Collecting
        }
    }

    /// Whether a finalize intent would currently be accepted
    pub fn can_finalize(&self) -> bool {
        !self.closed && self.connected && self.is_complete && self.options.is_none() && !self.planning
    }
}
