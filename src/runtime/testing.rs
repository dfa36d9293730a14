//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O. The capture
//! and playback mocks share one [`AudioDevice`] that records any moment
//! both were active at once.

use super::traits::*;
use super::{Intent, RuntimeConfig, RuntimeEvent, SessionHandle, SessionRuntime, SessionSnapshot, SessionUpdate};
use crate::protocol::{InboundMessage, OutboundMessage};
use crate::transport::{ChannelEvent, ChannelTransport, TransportError};
use crate::voice::{self, VoiceTimings};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// Mock Transport
// ============================================================================

/// Transport that records sent messages and lets tests inject frames
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    events: Mutex<Option<mpsc::Sender<ChannelEvent>>>,
    connected: AtomicBool,
    refuse_connect: bool,
    closes: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose server is unreachable
    pub fn unreachable() -> Self {
        Self {
            refuse_connect: true,
            ..Self::default()
        }
    }

    /// Deliver an inbound message as if it arrived on the wire
    pub async fn deliver(&self, message: InboundMessage) {
        self.post(ChannelEvent::Message(message)).await;
    }

    /// Simulate the server dropping the connection
    pub async fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.post(ChannelEvent::Closed {
            reason: "server went away".to_string(),
        })
        .await;
    }

    /// Simulate the connection coming back
    pub async fn reopen(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.post(ChannelEvent::Opened).await;
    }

    async fn post(&self, event: ChannelEvent) {
        let tx = self.events.lock().unwrap().clone();
        if let Some(tx) = tx {
            tx.send(event).await.expect("runtime stopped");
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_kinds(&self) -> Vec<&'static str> {
        self.sent().iter().map(OutboundMessage::kind).collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelTransport for MockTransport {
    async fn connect(&self, events: mpsc::Sender<ChannelEvent>) -> Result<(), TransportError> {
        if self.refuse_connect {
            return Err(TransportError::AlreadyConnected);
        }
        *self.events.lock().unwrap() = Some(events.clone());
        self.connected.store(true, Ordering::SeqCst);
        let _ = events.send(ChannelEvent::Opened).await;
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) {
        if self.is_connected() {
            self.sent.lock().unwrap().push(message.clone());
        }
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Mock Audio Device
// ============================================================================

/// What the shared audio channel is doing
#[derive(Debug, Default)]
pub struct DeviceLog {
    pub capturing: bool,
    pub playing: Option<u64>,
    /// Times capture and playback were active together
    pub overlaps: usize,
    pub capture_starts: usize,
    pub spoken: Vec<String>,
    pub cancels: usize,
}

/// The one physical audio channel, shared by capture and playback mocks
#[derive(Clone, Default)]
pub struct AudioDevice {
    log: Arc<Mutex<DeviceLog>>,
    events: Arc<Mutex<Option<mpsc::Sender<RuntimeEvent>>>>,
}

impl AudioDevice {
    pub fn with_log<R>(&self, f: impl FnOnce(&DeviceLog) -> R) -> R {
        f(&self.log.lock().unwrap())
    }

    pub fn is_capturing(&self) -> bool {
        self.with_log(|log| log.capturing)
    }

    pub fn spoken(&self) -> Vec<String> {
        self.with_log(|log| log.spoken.clone())
    }

    /// Post a capture result as the recognizer would
    pub async fn hear(&self, text: &str, is_final: bool) {
        self.post(voice::Event::CaptureResult {
            text: text.to_string(),
            is_final,
        })
        .await;
    }

    /// The recognizer stopped on its own
    pub async fn end_capture(&self) {
        self.log.lock().unwrap().capturing = false;
        self.post(voice::Event::CaptureEnded).await;
    }

    pub async fn fail_capture(&self, error: voice::CaptureErrorKind) {
        self.post(voice::Event::CaptureFailed { error }).await;
    }

    /// Finish the current playback, waiting for it to start if needed
    pub async fn finish_playback(&self) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while tokio::time::Instant::now() < deadline {
            let utterance = self.log.lock().unwrap().playing.take();
            if let Some(utterance) = utterance {
                self.post(voice::Event::PlaybackFinished { utterance }).await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("nothing started playing");
    }

    async fn post(&self, event: voice::Event) {
        let tx = self.events.lock().unwrap().clone();
        if let Some(tx) = tx {
            tx.send(RuntimeEvent::Voice(event))
                .await
                .expect("runtime stopped");
        }
    }
}

/// Capture mock backed by an [`AudioDevice`]
pub struct MockCapture {
    device: AudioDevice,
    available: bool,
}

#[async_trait]
impl SpeechCapture for MockCapture {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn start(&self, events: mpsc::Sender<RuntimeEvent>) -> Result<(), String> {
        *self.device.events.lock().unwrap() = Some(events);
        let mut log = self.device.log.lock().unwrap();
        if log.playing.is_some() {
            log.overlaps += 1;
        }
        log.capturing = true;
        log.capture_starts += 1;
        Ok(())
    }

    async fn stop(&self) {
        self.device.log.lock().unwrap().capturing = false;
    }
}

/// Playback mock backed by an [`AudioDevice`]
pub struct MockPlayback {
    device: AudioDevice,
    available: bool,
    /// Report completion immediately instead of waiting for the test
    auto_finish: bool,
}

#[async_trait]
impl SpeechPlayback for MockPlayback {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn speak(
        &self,
        utterance: u64,
        text: &str,
        events: mpsc::Sender<RuntimeEvent>,
    ) -> Result<(), String> {
        *self.device.events.lock().unwrap() = Some(events.clone());
        {
            let mut log = self.device.log.lock().unwrap();
            if log.capturing {
                log.overlaps += 1;
            }
            log.playing = Some(utterance);
            log.spoken.push(text.to_string());
        }
        if self.auto_finish {
            let log = self.device.log.clone();
            // Posted from a task; the runtime is busy processing this effect
            tokio::spawn(async move {
                let finished = {
                    let mut log = log.lock().unwrap();
                    if log.playing == Some(utterance) {
                        log.playing = None;
                        true
                    } else {
                        false
                    }
                };
                if finished {
                    let _ = events
                        .send(RuntimeEvent::Voice(voice::Event::PlaybackFinished { utterance }))
                        .await;
                }
            });
        }
        Ok(())
    }

    async fn cancel(&self) {
        let mut log = self.device.log.lock().unwrap();
        log.playing = None;
        log.cancels += 1;
    }
}

// ============================================================================
// Test Runtime Builder
// ============================================================================

/// Helper for building test runtimes with minimal boilerplate
pub struct TestRuntime {
    pub handle: SessionHandle,
    pub updates: broadcast::Receiver<SessionUpdate>,
    pub transport: Arc<MockTransport>,
    pub device: AudioDevice,
    _runtime_handle: tokio::task::JoinHandle<()>,
}

impl TestRuntime {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> TestRuntimeBuilder {
        TestRuntimeBuilder::default()
    }
}

pub struct TestRuntimeBuilder {
    transport: MockTransport,
    capture: bool,
    playback: bool,
    auto_finish: bool,
    planning_timeout: Option<Duration>,
}

impl Default for TestRuntimeBuilder {
    fn default() -> Self {
        Self {
            transport: MockTransport::new(),
            capture: false,
            playback: false,
            auto_finish: true,
            planning_timeout: None,
        }
    }
}

impl TestRuntimeBuilder {
    pub fn transport(mut self, transport: MockTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Enable both capture and playback
    pub fn voice(mut self) -> Self {
        self.capture = true;
        self.playback = true;
        self
    }

    pub fn capture_only(mut self) -> Self {
        self.capture = true;
        self.playback = false;
        self
    }

    pub fn playback_only(mut self) -> Self {
        self.capture = false;
        self.playback = true;
        self
    }

    /// Leave playback running until the test calls `finish_playback`
    pub fn manual_playback(mut self) -> Self {
        self.auto_finish = false;
        self
    }

    pub fn planning_timeout(mut self, timeout: Duration) -> Self {
        self.planning_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> TestRuntime {
        let transport = Arc::new(self.transport);
        let device = AudioDevice::default();
        let config = RuntimeConfig {
            timings: VoiceTimings {
                restart_guard: Duration::ZERO,
                speak_delay: Duration::ZERO,
                cooldown: Duration::ZERO,
                resume_delay: Duration::ZERO,
            },
            planning_timeout: self.planning_timeout,
        };

        let (runtime, handle) = SessionRuntime::new(
            config,
            transport.clone(),
            MockCapture {
                device: device.clone(),
                available: self.capture,
            },
            MockPlayback {
                device: device.clone(),
                available: self.playback,
                auto_finish: self.auto_finish,
            },
        );
        let updates = handle.subscribe();

        let runtime_handle = tokio::spawn(async move {
            runtime.run().await;
        });

        TestRuntime {
            handle,
            updates,
            transport,
            device,
            _runtime_handle: runtime_handle,
        }
    }
}

const WAIT: Duration = Duration::from_secs(2);

impl TestRuntime {
    pub async fn intent(&self, intent: Intent) {
        self.handle.send(intent).await.expect("runtime stopped");
    }

    pub async fn say(&self, text: &str) {
        self.intent(Intent::SubmitText {
            text: text.to_string(),
        })
        .await;
    }

    /// Wait for the first update matching `pred`
    pub async fn wait_for(
        &mut self,
        mut pred: impl FnMut(&SessionUpdate) -> bool,
    ) -> Option<SessionUpdate> {
        let deadline = tokio::time::Instant::now() + WAIT;
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(50), self.updates.recv()).await {
                Ok(Ok(update)) if pred(&update) => return Some(update),
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                _ => continue,
            }
        }
        None
    }

    /// Wait for a snapshot satisfying `pred`
    pub async fn wait_for_snapshot(
        &mut self,
        mut pred: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Option<SessionSnapshot> {
        match self
            .wait_for(|u| matches!(u, SessionUpdate::Snapshot(s) if pred(s)))
            .await
        {
            Some(SessionUpdate::Snapshot(s)) => Some(*s),
            _ => None,
        }
    }

    pub async fn wait_for_alert(&mut self) -> Option<String> {
        match self
            .wait_for(|u| matches!(u, SessionUpdate::Alert { .. }))
            .await
        {
            Some(SessionUpdate::Alert { message }) => Some(message),
            _ => None,
        }
    }

    pub async fn wait_connected(&mut self) {
        assert!(
            self.wait_for_snapshot(|s| s.connected).await.is_some(),
            "runtime never connected"
        );
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        Activity, CollectedInfo, FinalDecision, Flight, Hotel, OptionSet, OptionsKind,
        PlanningResult, TripOption,
    };
    use crate::session::{ResultChoice, SessionPhase};
    use crate::voice::VoiceMode;

    fn bot(text: &str, collected_info: CollectedInfo, is_complete: bool) -> InboundMessage {
        InboundMessage::BotResponse {
            text: text.to_string(),
            collected_info,
            is_complete,
        }
    }

    fn flights() -> InboundMessage {
        InboundMessage::ShowOptions(OptionSet {
            kind: OptionsKind::Flights,
            options: ["f1", "f2"]
                .iter()
                .map(|id| {
                    TripOption::Flight(Flight {
                        id: (*id).to_string(),
                        price: 12_000.0,
                        ..Flight::default()
                    })
                })
                .collect(),
            text: "Here are some flights".to_string(),
        })
    }

    fn activities() -> InboundMessage {
        InboundMessage::ShowOptions(OptionSet {
            kind: OptionsKind::Activities,
            options: ["A", "B", "C"]
                .iter()
                .map(|id| {
                    TripOption::Activity(Activity {
                        id: (*id).to_string(),
                        price: 500.0,
                        ..Activity::default()
                    })
                })
                .collect(),
            text: "Pick some activities".to_string(),
        })
    }

    fn result() -> PlanningResult {
        PlanningResult {
            final_decision: FinalDecision {
                flight: Some(Flight {
                    id: "f9".into(),
                    price: 9_000.0,
                    ..Flight::default()
                }),
                hotel: Some(Hotel {
                    id: "h9".into(),
                    price_per_night: 2_000.0,
                    ..Hotel::default()
                }),
                ..FinalDecision::default()
            },
            ..PlanningResult::default()
        }
    }

    #[tokio::test]
    async fn test_user_text_is_sent_and_recorded() {
        let mut rt = TestRuntime::new().build();
        rt.wait_connected().await;

        rt.say("  I want to go to Goa ").await;
        let snap = rt
            .wait_for_snapshot(|s| !s.transcript.is_empty())
            .await
            .unwrap();
        assert_eq!(snap.transcript[0].text, "I want to go to Goa");
        assert_eq!(
            rt.transport.sent(),
            vec![OutboundMessage::UserUtterance {
                message: "I want to go to Goa".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_queued_frames_are_handled_before_queued_intents() {
        let mut rt = TestRuntime::new().build();
        rt.wait_connected().await;

        // Single-threaded test runtime: both sends land before the loop wakes
        for round in 0..8 {
            rt.say(&format!("user {round}")).await;
            rt.transport
                .deliver(bot(&format!("bot {round}"), CollectedInfo::default(), false))
                .await;
            let snap = rt
                .wait_for_snapshot(|s| s.transcript.len() == 2 * (round + 1))
                .await
                .unwrap();
            let texts: Vec<&str> = snap.transcript[2 * round..]
                .iter()
                .map(|e| e.text.as_str())
                .collect();
            assert_eq!(texts, vec![format!("bot {round}"), format!("user {round}")]);
        }
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let mut rt = TestRuntime::new().build();
        rt.wait_connected().await;
        rt.say("   ").await;
        assert!(rt.wait_for_alert().await.is_some());
        assert!(rt.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_intents_rejected_while_disconnected() {
        let mut rt = TestRuntime::new()
            .transport(MockTransport::unreachable())
            .build();
        let alert = rt.wait_for_alert().await.unwrap();
        assert!(alert.contains("Could not reach"));

        rt.say("hello").await;
        let alert = rt.wait_for_alert().await.unwrap();
        assert_eq!(alert, "Not connected to the planning service");
        assert!(rt.handle.snapshot().transcript.is_empty());
    }

    #[tokio::test]
    async fn test_flight_pick_flow() {
        let mut rt = TestRuntime::new().build();
        rt.wait_connected().await;

        rt.transport.deliver(flights()).await;
        let snap = rt
            .wait_for_snapshot(|s| s.phase == SessionPhase::OptionPending)
            .await
            .unwrap();
        // Text lands in the transcript before the set becomes active
        assert_eq!(snap.transcript.last().unwrap().text, "Here are some flights");

        rt.intent(Intent::PickOption { id: "f2".into() }).await;
        let snap = rt
            .wait_for_snapshot(|s| s.options.is_none())
            .await
            .unwrap();
        assert_eq!(snap.collected.selected_flight.unwrap().id, "f2");
        assert_eq!(rt.transport.sent_kinds(), vec!["select_flight"]);
    }

    #[tokio::test]
    async fn test_activities_accumulate_and_finalize_waits_for_completion() {
        let mut rt = TestRuntime::new().build();
        rt.wait_connected().await;

        rt.transport.deliver(activities()).await;
        rt.wait_for_snapshot(|s| s.options.is_some()).await.unwrap();
        for id in ["A", "B", "C", "B"] {
            rt.intent(Intent::PickOption { id: id.into() }).await;
        }
        let snap = rt
            .wait_for_snapshot(|s| s.selected.len() == 3)
            .await
            .unwrap();
        assert_eq!(snap.selected, vec!["A", "B", "C"]);
        assert!(snap.done_enabled);

        rt.intent(Intent::ActivitiesDone).await;
        rt.wait_for_snapshot(|s| s.options.is_none()).await.unwrap();

        rt.intent(Intent::RequestFinalize).await;
        assert_eq!(
            rt.wait_for_alert().await.unwrap(),
            "Trip details are not complete yet"
        );
        assert_eq!(
            rt.transport.sent_kinds(),
            vec!["select_activity", "select_activity", "select_activity"]
        );
    }

    #[tokio::test]
    async fn test_planning_error_allows_retry() {
        let mut rt = TestRuntime::new().build();
        rt.wait_connected().await;

        let info = CollectedInfo {
            destination: Some("Goa".into()),
            budget: Some(50_000.0),
            ..CollectedInfo::default()
        };
        rt.transport.deliver(bot("All set", info.clone(), true)).await;
        rt.wait_for_snapshot(|s| s.finalize_enabled).await.unwrap();

        rt.intent(Intent::RequestFinalize).await;
        rt.wait_for_snapshot(|s| s.planning).await.unwrap();

        rt.transport
            .deliver(InboundMessage::Error {
                text: "rate limited".into(),
            })
            .await;
        assert_eq!(rt.wait_for_alert().await.unwrap(), "rate limited");
        let snap = rt
            .wait_for_snapshot(|s| !s.planning)
            .await
            .unwrap();
        assert!(snap.finalize_enabled);
        assert_eq!(snap.collected, info);
    }

    #[tokio::test]
    async fn test_result_then_choose_and_confirm() {
        let mut rt = TestRuntime::new().build();
        rt.wait_connected().await;

        rt.transport
            .deliver(bot("Ready", CollectedInfo::default(), true))
            .await;
        rt.wait_for_snapshot(|s| s.finalize_enabled).await.unwrap();
        rt.intent(Intent::RequestFinalize).await;
        rt.transport
            .deliver(InboundMessage::PlanningResult(result()))
            .await;
        rt.wait_for_snapshot(|s| s.phase == SessionPhase::Resulted)
            .await
            .unwrap();

        rt.intent(Intent::ChooseFromResult {
            choice: ResultChoice::Flight("f9".into()),
        })
        .await;
        let snap = rt
            .wait_for_snapshot(|s| s.collected.selected_flight.is_some())
            .await
            .unwrap();
        assert!((snap.price.total - 9_000.0).abs() < 1e-9);
        // Local re-selection never hits the wire
        assert_eq!(rt.transport.sent_kinds(), vec!["finalize"]);

        rt.intent(Intent::ConfirmBooking).await;
        let confirmed = rt
            .wait_for(|u| matches!(u, SessionUpdate::BookingConfirmed { .. }))
            .await;
        assert!(matches!(
            confirmed,
            Some(SessionUpdate::BookingConfirmed { total }) if (total - 9_000.0).abs() < 1e-9
        ));
    }

    #[tokio::test]
    async fn test_planning_timeout_clears_planning() {
        let mut rt = TestRuntime::new()
            .planning_timeout(Duration::from_millis(20))
            .build();
        rt.wait_connected().await;
        rt.transport
            .deliver(bot("Ready", CollectedInfo::default(), true))
            .await;
        rt.wait_for_snapshot(|s| s.finalize_enabled).await.unwrap();

        rt.intent(Intent::RequestFinalize).await;
        let alert = rt.wait_for_alert().await.unwrap();
        assert!(alert.contains("timed out"));
        let snap = rt.wait_for_snapshot(|s| !s.planning).await.unwrap();
        assert!(snap.finalize_enabled);
    }

    #[tokio::test]
    async fn test_connectivity_changes_are_published() {
        let mut rt = TestRuntime::new().build();
        rt.wait_connected().await;

        rt.transport.drop_connection().await;
        let update = rt
            .wait_for(|u| matches!(u, SessionUpdate::ConnectivityChanged { .. }))
            .await;
        assert!(matches!(
            update,
            Some(SessionUpdate::ConnectivityChanged { connected: false })
        ));

        rt.transport.reopen().await;
        rt.wait_connected().await;
    }

    #[tokio::test]
    async fn test_close_stops_runtime() {
        let mut rt = TestRuntime::new().build();
        rt.wait_connected().await;
        rt.intent(Intent::RequestClose).await;
        assert!(rt
            .wait_for(|u| matches!(u, SessionUpdate::Closed))
            .await
            .is_some());
        assert_eq!(rt.transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_assistant_reply_is_spoken_and_listening_resumes() {
        let mut rt = TestRuntime::new().voice().build();
        rt.wait_connected().await;

        rt.intent(Intent::ToggleListening).await;
        rt.wait_for_snapshot(|s| s.voice_mode == VoiceMode::Listening)
            .await
            .unwrap();

        rt.device.hear("to goa", false).await;
        rt.wait_for_snapshot(|s| s.preview == "to goa").await.unwrap();
        rt.device.hear("I want to go to Goa", true).await;
        rt.wait_for_snapshot(|s| s.transcript.len() == 1).await.unwrap();
        assert_eq!(rt.transport.sent_kinds(), vec!["user_message"]);

        rt.transport
            .deliver(bot("When are you travelling?", CollectedInfo::default(), false))
            .await;
        rt.wait_for_snapshot(|s| s.voice_mode == VoiceMode::Speaking)
            .await
            .unwrap();
        // Auto-finished playback, cooldown, then capture resumes
        rt.wait_for_snapshot(|s| s.voice_mode == VoiceMode::Listening)
            .await
            .unwrap();

        assert_eq!(rt.device.spoken(), vec!["When are you travelling?"]);
        rt.device.with_log(|log| {
            assert_eq!(log.overlaps, 0);
            assert_eq!(log.capture_starts, 2);
        });
    }

    #[tokio::test]
    async fn test_speech_during_playback_is_discarded() {
        let mut rt = TestRuntime::new().voice().manual_playback().build();
        rt.wait_connected().await;
        rt.intent(Intent::ToggleListening).await;
        rt.wait_for_snapshot(|s| s.voice_mode == VoiceMode::Listening)
            .await
            .unwrap();

        rt.transport
            .deliver(bot("Where from?", CollectedInfo::default(), false))
            .await;
        rt.wait_for_snapshot(|s| s.voice_mode == VoiceMode::Speaking)
            .await
            .unwrap();
        assert!(!rt.device.is_capturing());

        // Echo of our own voice
        rt.device.hear("where from", true).await;
        rt.device.finish_playback().await;
        rt.wait_for_snapshot(|s| s.voice_mode == VoiceMode::Listening)
            .await
            .unwrap();

        assert!(rt.transport.sent().is_empty());
        rt.device.with_log(|log| assert_eq!(log.overlaps, 0));
    }

    #[tokio::test]
    async fn test_mic_toggle_without_capture_alerts() {
        let mut rt = TestRuntime::new().playback_only().build();
        rt.wait_connected().await;
        rt.intent(Intent::ToggleListening).await;
        let alert = rt.wait_for_alert().await.unwrap();
        assert!(alert.contains("not available"));
        assert_eq!(rt.handle.snapshot().voice_mode, VoiceMode::Idle);
    }

    #[tokio::test]
    async fn test_completion_stops_auto_restart() {
        let mut rt = TestRuntime::new().voice().build();
        rt.wait_connected().await;
        rt.intent(Intent::ToggleListening).await;
        rt.wait_for_snapshot(|s| s.voice_mode == VoiceMode::Listening)
            .await
            .unwrap();

        rt.transport
            .deliver(bot("That's everything", CollectedInfo::default(), true))
            .await;
        let snap = rt
            .wait_for_snapshot(|s| s.voice_mode == VoiceMode::Idle && !s.transcript.is_empty())
            .await
            .unwrap();
        assert!(snap.finalize_enabled);
        // Spoken once, then no restart of capture
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!rt.device.is_capturing());
        assert_eq!(rt.device.spoken(), vec!["That's everything"]);
    }

    #[tokio::test]
    async fn test_completion_lets_current_capture_finish() {
        let mut rt = TestRuntime::new().capture_only().build();
        rt.wait_connected().await;
        rt.intent(Intent::ToggleListening).await;
        rt.wait_for_snapshot(|s| s.voice_mode == VoiceMode::Listening)
            .await
            .unwrap();

        rt.transport
            .deliver(bot("That's everything", CollectedInfo::default(), true))
            .await;
        let snap = rt.wait_for_snapshot(|s| s.finalize_enabled).await.unwrap();
        assert_eq!(snap.voice_mode, VoiceMode::Listening);
        assert!(rt.device.is_capturing());

        // The user was mid-sentence when the reply landed
        rt.device.hear("and a window seat please", true).await;
        rt.wait_for_snapshot(|s| s.transcript.len() == 2)
            .await
            .unwrap();
        assert_eq!(rt.transport.sent_kinds(), vec!["user_message"]);

        rt.device.end_capture().await;
        rt.wait_for_snapshot(|s| s.voice_mode == VoiceMode::Idle)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        rt.device.with_log(|log| assert_eq!(log.capture_starts, 1));
        assert!(!rt.device.is_capturing());
    }
}
