//! Session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! every intent and inbound frame is an `Event`, `transition` returns the
//! next `SessionState` plus the `Effect`s the runtime must perform.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::{Event, ResultChoice};
pub use state::{Role, SessionPhase, SessionState, TranscriptEntry};
pub use transition::{transition, TransitionError, TransitionResult};
