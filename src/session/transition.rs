//! Pure session transition function

use super::state::TranscriptEntry;
use super::{Effect, Event, ResultChoice, SessionState};
use crate::pricing;
use crate::protocol::{InboundMessage, OptionsKind, OutboundMessage};
use crate::selection::{self, SelectionError};
use thiserror::Error;

const PLANNING_TIMEOUT_MESSAGE: &str = "Planning timed out, please try finalizing again";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
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

/// Rejected intents. These are user-facing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Not connected to the planning service")]
    Disconnected,
    #[error("Session is closed")]
    Closed,
    #[error("Message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("Trip details are not complete yet")]
    NotComplete,
    #[error("Finish choosing {0} first")]
    OptionsPending(OptionsKind),
    #[error("Planning is already in progress")]
    PlanningInProgress,
    #[error("There is no plan yet")]
    NoResult,
}

/// Pure transition function
///
/// Given the same state and event this always produces the same result and
/// performs no I/O.
#[allow(clippy::too_many_lines)]
pub fn transition(state: &SessionState, event: Event) -> Result<TransitionResult, TransitionError> {
    if state.closed {
        // Late frames and timers after close are dropped; intents are refused.
        return match event {
            Event::Inbound(_)
            | Event::Connectivity { .. }
            | Event::PlanningTimeout { .. }
            | Event::Close => Ok(TransitionResult::new(state.clone())),
            _ => Err(TransitionError::Closed),
        };
    }

    match event {
        // ============================================================
        // Presentation intents
        // ============================================================
        Event::UserText { text } => {
            let text = text.trim();
            if text.is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            require_connected(state)?;

            let mut next = state.clone();
            next.transcript.push(TranscriptEntry::user(text));
            Ok(TransitionResult::new(next)
                .with_effect(Effect::send(OutboundMessage::UserUtterance {
                    message: text.to_string(),
                }))
                .with_effect(Effect::PublishSnapshot))
        }

        Event::PickOption { option_id } => {
            let set = state
                .options
                .as_ref()
                .ok_or(SelectionError::NoActiveOptions)?;
            require_connected(state)?;

            let mut next = state.clone();
            let Some(pick) = selection::pick(set, &option_id, &mut next.collected)? else {
                // Already selected; deselection is not part of the protocol
                return Ok(TransitionResult::new(next));
            };
            if pick.closes_set {
                next.options = None;
            }
            Ok(TransitionResult::new(next)
                .with_effect(Effect::send(pick.message))
                .with_effect(Effect::PublishSnapshot))
        }

        Event::ActivitiesDone => {
            selection::finish(state.options.as_ref(), &state.collected)?;
            let mut next = state.clone();
            next.options = None;
            Ok(TransitionResult::new(next).with_effect(Effect::PublishSnapshot))
        }

        Event::RequestFinalize => {
            if state.planning {
                return Err(TransitionError::PlanningInProgress);
            }
            if let Some(set) = &state.options {
                return Err(TransitionError::OptionsPending(set.kind));
            }
            if !state.is_complete {
                return Err(TransitionError::NotComplete);
            }
            require_connected(state)?;

            let mut next = state.clone();
            next.planning = true;
            next.planning_attempt += 1;
            let attempt = next.planning_attempt;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::send(OutboundMessage::Finalize))
                .with_effect(Effect::ArmPlanningTimeout { attempt })
                .with_effect(Effect::PublishSnapshot))
        }

        Event::ChooseFromResult { choice } => {
            let result = state.result.as_ref().ok_or(TransitionError::NoResult)?;
            let decision = &result.final_decision;
            let mut next = state.clone();

            match choice {
                ResultChoice::Flight(id) => {
                    let flight = decision
                        .flight
                        .as_ref()
                        .filter(|f| f.id == id)
                        .ok_or(SelectionError::UnknownOption(id))?;
                    next.collected.selected_flight = Some(flight.clone());
                }
                ResultChoice::Hotel(id) => {
                    let hotel = decision
                        .hotel
                        .as_ref()
                        .filter(|h| h.id == id)
                        .ok_or(SelectionError::UnknownOption(id))?;
                    next.collected.selected_hotel = Some(hotel.clone());
                }
                ResultChoice::Activity(id) => {
                    let activity = decision
                        .activities
                        .iter()
                        .find(|a| a.id == id)
                        .ok_or(SelectionError::UnknownOption(id))?;
                    if !next.collected.add_activity(activity.clone()) {
                        return Ok(TransitionResult::new(next));
                    }
                }
            }
            Ok(TransitionResult::new(next).with_effect(Effect::PublishSnapshot))
        }

        Event::ConfirmBooking => {
            if state.result.is_none() {
                return Err(TransitionError::NoResult);
            }
            let total = pricing::total(&state.collected);
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::BookingConfirmed { total }))
        }

        Event::Close => {
            let mut next = state.clone();
            next.closed = true;
            next.planning = false;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::CloseChannel)
                .with_effect(Effect::PublishSnapshot))
        }

        // ============================================================
        // Channel events
        // ============================================================
        Event::Inbound(message) => Ok(handle_inbound(state, message)),

        Event::Connectivity { connected } => {
            if state.connected == connected {
                return Ok(TransitionResult::new(state.clone()));
            }
            let mut next = state.clone();
            next.connected = connected;
            Ok(TransitionResult::new(next).with_effects([
                Effect::ConnectivityChanged { connected },
                Effect::PublishSnapshot,
            ]))
        }

        // ============================================================
        // Timers
        // ============================================================
        Event::PlanningTimeout { attempt } => {
            if !state.planning || attempt != state.planning_attempt {
                return Ok(TransitionResult::new(state.clone()));
            }
            let mut next = state.clone();
            next.planning = false;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::alert(PLANNING_TIMEOUT_MESSAGE))
                .with_effect(Effect::PublishSnapshot))
        }
    }
}

fn handle_inbound(state: &SessionState, message: InboundMessage) -> TransitionResult {
    let mut next = state.clone();
    match message {
        InboundMessage::BotResponse {
            text,
            collected_info,
            is_complete,
        } => {
            next.transcript.push(TranscriptEntry::assistant(text));
            // The service is the source of truth: overwrite, never merge
            next.collected = collected_info;
            next.is_complete = is_complete;
            TransitionResult::new(next).with_effect(Effect::PublishSnapshot)
        }

        InboundMessage::ShowOptions(set) => {
            // Text goes in first so the set never renders without its prompt
            next.transcript.push(TranscriptEntry::assistant(set.text.clone()));
            next.options = Some(set);
            TransitionResult::new(next).with_effect(Effect::PublishSnapshot)
        }

        InboundMessage::PlanningResult(result) => {
            next.result = Some(result);
            next.planning = false;
            next.options = None;
            TransitionResult::new(next).with_effect(Effect::PublishSnapshot)
        }

        InboundMessage::Error { text } => {
            next.planning = false;
            TransitionResult::new(next)
                .with_effect(Effect::alert(text))
                .with_effect(Effect::PublishSnapshot)
        }
    }
}

fn require_connected(state: &SessionState) -> Result<(), TransitionError> {
    if state.connected {
        Ok(())
    } else {
        Err(TransitionError::Disconnected)
    }
}
