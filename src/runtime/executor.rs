//! Session runtime executor

use super::traits::{SpeechCapture, SpeechPlayback};
use super::{Intent, RuntimeEvent, SessionHandle, SessionSnapshot, SessionUpdate};

use crate::pricing::PriceSummary;
use crate::selection;
use crate::session::{self, SessionState};
use crate::transport::{ChannelEvent, ChannelTransport};
use crate::voice::{self, Capabilities, VoiceState, VoiceTimer, VoiceTimings};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

const EVENT_QUEUE_CAPACITY: usize = 64;
const UPDATE_CAPACITY: usize = 128;

/// Runtime knobs
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    pub timings: VoiceTimings,
    /// Give up waiting for a planning result after this long. `None` waits
    /// indefinitely.
    pub planning_timeout: Option<Duration>,
}

/// One unit of work for a state machine
#[derive(Debug)]
enum Step {
    Session(session::Event),
    Voice(voice::Event),
}

impl From<RuntimeEvent> for Step {
    fn from(event: RuntimeEvent) -> Self {
        match event {
            RuntimeEvent::Intent(intent) => match intent {
                Intent::SubmitText { text } => Step::Session(session::Event::UserText { text }),
                Intent::PickOption { id } => {
                    Step::Session(session::Event::PickOption { option_id: id })
                }
                Intent::ActivitiesDone => Step::Session(session::Event::ActivitiesDone),
                Intent::RequestFinalize => Step::Session(session::Event::RequestFinalize),
                Intent::ToggleListening => Step::Voice(voice::Event::ToggleListening),
                Intent::ChooseFromResult { choice } => {
                    Step::Session(session::Event::ChooseFromResult { choice })
                }
                Intent::ConfirmBooking => Step::Session(session::Event::ConfirmBooking),
                Intent::RequestClose => Step::Session(session::Event::Close),
            },
            RuntimeEvent::Voice(event) => Step::Voice(event),
            RuntimeEvent::Session(event) => Step::Session(event),
        }
    }
}

impl From<ChannelEvent> for Step {
    fn from(event: ChannelEvent) -> Self {
        Step::Session(match event {
            ChannelEvent::Opened => session::Event::Connectivity { connected: true },
            ChannelEvent::Message(message) => session::Event::Inbound(message),
            ChannelEvent::Closed { .. } => session::Event::Connectivity { connected: false },
        })
    }
}

/// Generic session runtime that can work with any transport and audio devices
pub struct SessionRuntime<T, C, P>
where
    T: ChannelTransport + 'static,
    C: SpeechCapture + 'static,
    P: SpeechPlayback + 'static,
{
    session_id: String,
    config: RuntimeConfig,
    session: SessionState,
    voice: VoiceState,
    transport: Arc<T>,
    capture: Arc<C>,
    playback: Arc<P>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    channel_rx: mpsc::Receiver<ChannelEvent>,
    channel_tx: mpsc::Sender<ChannelEvent>,
    updates: broadcast::Sender<SessionUpdate>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl<T, C, P> SessionRuntime<T, C, P>
where
    T: ChannelTransport + 'static,
    C: SpeechCapture + 'static,
    P: SpeechPlayback + 'static,
{
    pub fn new(
        config: RuntimeConfig,
        transport: T,
        capture: C,
        playback: P,
    ) -> (Self, SessionHandle) {
        let capabilities = Capabilities {
            capture: capture.is_available(),
            playback: playback.is_available(),
        };
        let session = SessionState::default();
        let voice = VoiceState::new(capabilities);

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (channel_tx, channel_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);

        let (snapshot_tx, snapshot_rx) = watch::channel(build_snapshot(&session, &voice));

        let runtime = Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            config,
            session,
            voice,
            transport: Arc::new(transport),
            capture: Arc::new(capture),
            playback: Arc::new(playback),
            event_rx,
            event_tx: event_tx.clone(),
            channel_rx,
            channel_tx,
            updates: updates.clone(),
            snapshot_tx,
        };

        let handle = SessionHandle {
            event_tx,
            updates,
            snapshot: snapshot_rx,
        };
        (runtime, handle)
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.session_id, "Starting session runtime");

        if let Err(e) = self.transport.connect(self.channel_tx.clone()).await {
            tracing::error!(session_id = %self.session_id, error = %e, "Failed to connect");
            self.alert(format!("Could not reach the planning service: {e}"));
        }

        // Process events in a loop - no recursion
        loop {
            // Fixed poll order: frames already received from the service go
            // ahead of local intents and device events
            tokio::select! {
                biased;

                Some(event) = self.channel_rx.recv() => {
                    if let ChannelEvent::Closed { reason } = &event {
                        tracing::warn!(session_id = %self.session_id, reason = %reason, "Channel closed");
                    }
                    self.process(Step::from(event)).await;
                }
                Some(event) = self.event_rx.recv() => {
                    self.process(Step::from(event)).await;
                }
                else => break,
            }
            if self.session.closed {
                break;
            }
        }

        let _ = self.updates.send(SessionUpdate::Closed);
        tracing::info!(session_id = %self.session_id, "Session runtime stopped");
    }

    /// Run one incoming event and everything it chains into, then publish
    /// at most one snapshot
    async fn process(&mut self, first: Step) {
        let mut queue = VecDeque::from([first]);
        let mut publish = false;

        while let Some(step) = queue.pop_front() {
            publish |= match step {
                Step::Session(event) => self.step_session(event, &mut queue).await,
                Step::Voice(event) => self.step_voice(event, &mut queue).await,
            };
        }

        if publish {
            self.publish_snapshot();
        }
    }

    async fn step_session(&mut self, event: session::Event, queue: &mut VecDeque<Step>) -> bool {
        let result = match session::transition(&self.session, event) {
            Ok(r) => r,
            Err(e) => {
                // Transition errors are user-facing (e.g., "not connected")
                tracing::warn!(session_id = %self.session_id, error = %e, "Rejected session event");
                self.alert(e.to_string());
                return false;
            }
        };

        let previous_len = self.session.transcript.len();
        let was_complete = self.session.is_complete;
        let old_phase = self.session.phase();
        self.session = result.new_state;

        if self.session.phase() != old_phase {
            tracing::info!(
                session_id = %self.session_id,
                from = %old_phase,
                to = %self.session.phase(),
                "Session phase changed"
            );
        }

        // New transcript entries are the voice coordinator's cue to speak
        for (index, entry) in self.session.transcript.iter().enumerate().skip(previous_len) {
            queue.push_back(Step::Voice(voice::Event::TranscriptAppended {
                index,
                role: entry.role,
                text: entry.text.clone(),
            }));
        }
        if self.session.is_complete != was_complete {
            queue.push_back(Step::Voice(voice::Event::CompletionChanged {
                complete: self.session.is_complete,
            }));
        }

        let mut publish = false;
        for effect in result.effects {
            publish |= self.execute_session_effect(effect, queue).await;
        }
        publish
    }

    /// Returns whether a snapshot should be published
    async fn execute_session_effect(
        &mut self,
        effect: session::Effect,
        queue: &mut VecDeque<Step>,
    ) -> bool {
        match effect {
            session::Effect::Send(message) => {
                self.transport.send(&message).await;
                false
            }
            session::Effect::PublishSnapshot => true,
            session::Effect::Alert { message } => {
                self.alert(message);
                false
            }
            session::Effect::ArmPlanningTimeout { attempt } => {
                if let Some(delay) = self.config.planning_timeout {
                    let event_tx = self.event_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = event_tx
                            .send(RuntimeEvent::Session(session::Event::PlanningTimeout {
                                attempt,
                            }))
                            .await;
                    });
                }
                false
            }
            session::Effect::ConnectivityChanged { connected } => {
                let _ = self
                    .updates
                    .send(SessionUpdate::ConnectivityChanged { connected });
                false
            }
            session::Effect::BookingConfirmed { total } => {
                tracing::info!(session_id = %self.session_id, total, "Booking confirmed");
                let _ = self.updates.send(SessionUpdate::BookingConfirmed { total });
                false
            }
            session::Effect::CloseChannel => {
                self.transport.close().await;
                queue.push_back(Step::Voice(voice::Event::Close));
                false
            }
        }
    }

    async fn step_voice(&mut self, event: voice::Event, queue: &mut VecDeque<Step>) -> bool {
        let result = match voice::transition(&self.voice, event) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Rejected voice event");
                self.alert(e.to_string());
                return false;
            }
        };

        let old_mode = self.voice.mode();
        self.voice = result.new_state;
        if self.voice.mode() != old_mode {
            tracing::debug!(
                session_id = %self.session_id,
                from = ?old_mode,
                to = ?self.voice.mode(),
                "Voice mode changed"
            );
        }

        let mut publish = false;
        for effect in result.effects {
            publish |= self.execute_voice_effect(effect, queue).await;
        }
        publish
    }

    async fn execute_voice_effect(&mut self, effect: voice::Effect, queue: &mut VecDeque<Step>) -> bool {
        match effect {
            voice::Effect::StartCapture => {
                if let Err(message) = self.capture.start(self.event_tx.clone()).await {
                    tracing::warn!(session_id = %self.session_id, error = %message, "Capture failed to start");
                    queue.push_back(Step::Voice(voice::Event::CaptureFailed {
                        error: voice::CaptureErrorKind::Other(message),
                    }));
                }
                false
            }
            voice::Effect::StopCapture => {
                self.capture.stop().await;
                false
            }
            voice::Effect::StartPlayback { utterance, text } => {
                if let Err(message) = self
                    .playback
                    .speak(utterance, &text, self.event_tx.clone())
                    .await
                {
                    tracing::warn!(session_id = %self.session_id, error = %message, "Playback failed to start");
                    queue.push_back(Step::Voice(voice::Event::PlaybackFailed { utterance, message }));
                }
                false
            }
            voice::Effect::CancelPlayback => {
                self.playback.cancel().await;
                false
            }
            voice::Effect::Schedule { timer, generation } => {
                let delay = self.delay_for(timer);
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = event_tx
                        .send(RuntimeEvent::Voice(voice::Event::TimerFired { timer, generation }))
                        .await;
                });
                false
            }
            voice::Effect::SubmitUtterance { text } => {
                tracing::debug!(session_id = %self.session_id, "Submitting spoken utterance");
                queue.push_back(Step::Session(session::Event::UserText { text }));
                false
            }
            voice::Effect::Notice { message } => {
                self.alert(message);
                false
            }
            voice::Effect::PublishSnapshot => true,
        }
    }

    fn delay_for(&self, timer: VoiceTimer) -> Duration {
        let timings = &self.config.timings;
        match timer {
            VoiceTimer::RestartCapture => timings.restart_guard,
            VoiceTimer::BeginPlayback => timings.speak_delay,
            VoiceTimer::CooldownOver => timings.cooldown,
            VoiceTimer::ResumeListening => timings.resume_delay,
        }
    }

    fn alert(&self, message: String) {
        let _ = self.updates.send(SessionUpdate::Alert { message });
    }

    fn publish_snapshot(&self) {
        let snapshot = build_snapshot(&self.session, &self.voice);
        self.snapshot_tx.send_replace(snapshot.clone());
        let _ = self.updates.send(SessionUpdate::Snapshot(Box::new(snapshot)));
    }
}

fn build_snapshot(state: &SessionState, voice: &VoiceState) -> SessionSnapshot {
    SessionSnapshot {
        phase: state.phase(),
        collected: state.collected.clone(),
        transcript: state.transcript.clone(),
        options: state.options.clone(),
        selected: state
            .options
            .as_ref()
            .map(|set| selection::selected_ids(set.kind, &state.collected))
            .unwrap_or_default(),
        done_enabled: selection::done_enabled(state.options.as_ref(), &state.collected),
        finalize_enabled: state.can_finalize(),
        planning: state.planning,
        result: state.result.clone(),
        price: PriceSummary::from_info(&state.collected),
        connected: state.connected,
        voice_mode: voice.mode(),
        preview: voice.preview.clone(),
    }
}
