//! Pure voice transition function

use super::event::{CaptureErrorKind, VoiceTimer};
use super::state::SpeakStage;
use super::{Effect, Event, VoiceActivity, VoiceState};
use crate::session::Role;
use thiserror::Error;

const PLAYBACK_MISSING_NOTICE: &str =
    "Speech playback is not available, assistant replies will be shown as text only";

/// Result of a voice transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: VoiceState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: VoiceState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Refused mic toggles
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VoiceError {
    #[error("Speech recognition is not available here, type your message instead")]
    CaptureUnavailable,
    #[error("Wait for the assistant to finish speaking")]
    Speaking,
    #[error("Voice is shut down")]
    Closed,
}

/// Move to `activity`, invalidating every outstanding timer. Returns the
/// generation new timers should carry.
fn enter(state: &mut VoiceState, activity: VoiceActivity) -> u64 {
    state.activity = activity;
    state.generation += 1;
    state.generation
}

fn unchanged(state: &VoiceState) -> Result<TransitionResult, VoiceError> {
    Ok(TransitionResult::new(state.clone()))
}

/// Pure transition function
#[allow(clippy::too_many_lines)]
pub fn transition(state: &VoiceState, event: Event) -> Result<TransitionResult, VoiceError> {
    if state.closed {
        return match event {
            Event::ToggleListening => Err(VoiceError::Closed),
            _ => unchanged(state),
        };
    }

    match event {
        Event::ToggleListening => toggle(state),

        // ============================================================
        // Capture
        // ============================================================
        Event::CaptureResult { text, is_final } => {
            // Anything heard outside Listening is the assistant's own echo
            if !matches!(state.activity, VoiceActivity::Listening { .. }) {
                return unchanged(state);
            }
            let mut next = state.clone();
            if is_final {
                next.preview.clear();
                let text = text.trim();
                let mut result = TransitionResult::new(next);
                if !text.is_empty() {
                    result = result.with_effect(Effect::SubmitUtterance {
                        text: text.to_string(),
                    });
                }
                return Ok(result.with_effect(Effect::PublishSnapshot));
            }
            if text.is_empty() || next.preview == text {
                return unchanged(state);
            }
            next.preview = text;
            Ok(TransitionResult::new(next).with_effect(Effect::PublishSnapshot))
        }

        Event::CaptureEnded => {
            let VoiceActivity::Listening { restart_pending } = state.activity else {
                return unchanged(state);
            };
            if restart_pending {
                return unchanged(state);
            }
            let mut next = state.clone();
            if next.conversation_complete {
                next.preview.clear();
                enter(&mut next, VoiceActivity::default());
                return Ok(TransitionResult::new(next).with_effect(Effect::PublishSnapshot));
            }
            let generation = enter(
                &mut next,
                VoiceActivity::Listening {
                    restart_pending: true,
                },
            );
            Ok(TransitionResult::new(next).with_effect(Effect::Schedule {
                timer: VoiceTimer::RestartCapture,
                generation,
            }))
        }

        Event::CaptureFailed { error } => {
            // Benign errors are followed by CaptureEnded, which restarts
            if error.is_benign() || !matches!(state.activity, VoiceActivity::Listening { .. }) {
                return unchanged(state);
            }
            let mut next = state.clone();
            next.preview.clear();
            next.hands_free = false;
            enter(&mut next, VoiceActivity::default());
            let message = match error {
                CaptureErrorKind::NotAllowed => {
                    "Microphone access was denied, voice input is off".to_string()
                }
                other => format!("Speech recognition stopped: {other}"),
            };
            Ok(TransitionResult::new(next).with_effects([
                Effect::StopCapture,
                Effect::Notice { message },
                Effect::PublishSnapshot,
            ]))
        }

        // ============================================================
        // Playback
        // ============================================================
        Event::TranscriptAppended { index, role, text } => {
            if role != Role::Assistant || state.last_spoken_index.is_some_and(|i| index <= i) {
                return unchanged(state);
            }
            let mut next = state.clone();
            next.last_spoken_index = Some(index);

            let text = text.trim();
            if text.is_empty() {
                return Ok(TransitionResult::new(next));
            }
            if !next.capabilities.playback {
                if next.playback_notice_shown {
                    return Ok(TransitionResult::new(next));
                }
                next.playback_notice_shown = true;
                return Ok(TransitionResult::new(next).with_effect(Effect::Notice {
                    message: PLAYBACK_MISSING_NOTICE.to_string(),
                }));
            }
            Ok(speak(next, text))
        }

        Event::PlaybackFinished { utterance } => {
            if !is_playing(state, utterance) {
                return unchanged(state);
            }
            let mut next = state.clone();
            let VoiceActivity::Speaking { utterance, text, .. } = next.activity.clone() else {
                return unchanged(state);
            };
            let generation = enter(
                &mut next,
                VoiceActivity::Speaking {
                    utterance,
                    text,
                    stage: SpeakStage::Cooldown,
                },
            );
            Ok(TransitionResult::new(next).with_effect(Effect::Schedule {
                timer: VoiceTimer::CooldownOver,
                generation,
            }))
        }

        Event::PlaybackFailed { utterance, message } => {
            if !is_playing(state, utterance) {
                return unchanged(state);
            }
            let mut next = state.clone();
            enter(&mut next, VoiceActivity::default());
            Ok(TransitionResult::new(next).with_effects([
                Effect::Notice {
                    message: format!("Speech playback failed: {message}"),
                },
                Effect::PublishSnapshot,
            ]))
        }

        // ============================================================
        // Session
        // ============================================================
        Event::CompletionChanged { complete } => {
            if state.conversation_complete == complete {
                return unchanged(state);
            }
            // A running capture is left alone; it just won't be restarted
            let mut next = state.clone();
            next.conversation_complete = complete;
            Ok(TransitionResult::new(next))
        }

        Event::Close => {
            let mut next = state.clone();
            next.closed = true;
            next.hands_free = false;
            next.preview.clear();
            enter(&mut next, VoiceActivity::default());
            Ok(TransitionResult::new(next).with_effects([
                Effect::CancelPlayback,
                Effect::StopCapture,
                Effect::PublishSnapshot,
            ]))
        }

        Event::TimerFired { timer, generation } => {
            if generation != state.generation {
                return unchanged(state);
            }
            timer_fired(state, timer)
        }
    }
}

fn toggle(state: &VoiceState) -> Result<TransitionResult, VoiceError> {
    match state.activity {
        VoiceActivity::Listening { .. } => {
            let mut next = state.clone();
            next.preview.clear();
            next.hands_free = false;
            enter(&mut next, VoiceActivity::default());
            Ok(TransitionResult::new(next)
                .with_effects([Effect::StopCapture, Effect::PublishSnapshot]))
        }
        VoiceActivity::Speaking { .. } => Err(VoiceError::Speaking),
        VoiceActivity::Idle { .. } => {
            if !state.capabilities.capture {
                return Err(VoiceError::CaptureUnavailable);
            }
            let mut next = state.clone();
            next.hands_free = true;
            enter(
                &mut next,
                VoiceActivity::Listening {
                    restart_pending: false,
                },
            );
            Ok(TransitionResult::new(next)
                .with_effects([Effect::StartCapture, Effect::PublishSnapshot]))
        }
    }
}

/// Take the channel for a new assistant message. Any capture or playback
/// in progress is stopped first.
fn speak(mut next: VoiceState, text: &str) -> TransitionResult {
    let mut effects = Vec::new();
    match &next.activity {
        VoiceActivity::Listening { restart_pending } => {
            if !restart_pending {
                effects.push(Effect::StopCapture);
            }
        }
        VoiceActivity::Speaking {
            stage: SpeakStage::Playing,
            ..
        } => effects.push(Effect::CancelPlayback),
        VoiceActivity::Speaking { .. } | VoiceActivity::Idle { .. } => {}
    }
    next.preview.clear();
    next.utterance += 1;
    let utterance = next.utterance;
    let generation = enter(
        &mut next,
        VoiceActivity::Speaking {
            utterance,
            text: text.to_string(),
            stage: SpeakStage::Settling,
        },
    );
    effects.push(Effect::Schedule {
        timer: VoiceTimer::BeginPlayback,
        generation,
    });
    effects.push(Effect::PublishSnapshot);
    TransitionResult::new(next).with_effects(effects)
}

fn is_playing(state: &VoiceState, id: u64) -> bool {
    matches!(
        state.activity,
        VoiceActivity::Speaking { utterance, stage: SpeakStage::Playing, .. } if utterance == id
    )
}

fn timer_fired(state: &VoiceState, timer: VoiceTimer) -> Result<TransitionResult, VoiceError> {
    let mut next = state.clone();
    match (timer, &state.activity) {
        (
            VoiceTimer::RestartCapture,
            VoiceActivity::Listening {
                restart_pending: true,
            },
        ) => {
            if next.conversation_complete {
                enter(&mut next, VoiceActivity::default());
                return Ok(TransitionResult::new(next).with_effect(Effect::PublishSnapshot));
            }
            enter(
                &mut next,
                VoiceActivity::Listening {
                    restart_pending: false,
                },
            );
            Ok(TransitionResult::new(next).with_effect(Effect::StartCapture))
        }

        (
            VoiceTimer::BeginPlayback,
            VoiceActivity::Speaking {
                utterance,
                text,
                stage: SpeakStage::Settling,
            },
        ) => {
            let (utterance, text) = (*utterance, text.clone());
            enter(
                &mut next,
                VoiceActivity::Speaking {
                    utterance,
                    text: text.clone(),
                    stage: SpeakStage::Playing,
                },
            );
            Ok(TransitionResult::new(next).with_effect(Effect::StartPlayback { utterance, text }))
        }

        (
            VoiceTimer::CooldownOver,
            VoiceActivity::Speaking {
                stage: SpeakStage::Cooldown,
                ..
            },
        ) => {
            let resume = next.hands_free && next.capabilities.capture && !next.conversation_complete;
            let generation = enter(
                &mut next,
                VoiceActivity::Idle {
                    resume_pending: resume,
                },
            );
            let mut result = TransitionResult::new(next);
            if resume {
                result = result.with_effect(Effect::Schedule {
                    timer: VoiceTimer::ResumeListening,
                    generation,
                });
            }
            Ok(result.with_effect(Effect::PublishSnapshot))
        }

        (
            VoiceTimer::ResumeListening,
            VoiceActivity::Idle {
                resume_pending: true,
            },
        ) => {
            if next.conversation_complete || !next.capabilities.capture {
                enter(&mut next, VoiceActivity::default());
                return Ok(TransitionResult::new(next));
            }
            enter(
                &mut next,
                VoiceActivity::Listening {
                    restart_pending: false,
                },
            );
            Ok(TransitionResult::new(next)
                .with_effects([Effect::StartCapture, Effect::PublishSnapshot]))
        }

        // Stage moved on without bumping the generation; nothing to do
        _ => unchanged(state),
    }
}
