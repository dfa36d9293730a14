//! Voice I/O coordinator
//!
//! Speech capture and playback share one physical audio channel. This state
//! machine arbitrates it: it is never listening and speaking at once, it
//! drops capture events while speaking, and it waits out short cooldowns
//! around every switch so the assistant never hears its own voice.
//!
//! Like the session machine, transitions are pure and the runtime executes
//! the resulting effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::{CaptureErrorKind, Event, VoiceTimer};
pub use state::{Capabilities, SpeakStage, VoiceActivity, VoiceMode, VoiceState, VoiceTimings};
pub use transition::{transition, TransitionResult, VoiceError};
