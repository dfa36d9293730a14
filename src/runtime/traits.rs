//! Trait abstractions for the audio devices
//!
//! These traits enable testing the executor with mock implementations.
//! Devices report back by posting [`RuntimeEvent::Voice`] events; they never
//! call into the session directly.

use super::RuntimeEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Continuous speech-to-text with interim results
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    fn is_available(&self) -> bool;

    /// Begin capturing. Results, end-of-stream and errors are posted to
    /// `events` as `voice::Event`s.
    async fn start(&self, events: mpsc::Sender<RuntimeEvent>) -> Result<(), String>;

    async fn stop(&self);
}

/// Text-to-speech playback
#[async_trait]
pub trait SpeechPlayback: Send + Sync {
    fn is_available(&self) -> bool;

    /// Begin speaking. Completion is posted to `events` as
    /// `PlaybackFinished` or `PlaybackFailed` carrying `utterance`.
    async fn speak(
        &self,
        utterance: u64,
        text: &str,
        events: mpsc::Sender<RuntimeEvent>,
    ) -> Result<(), String>;

    async fn cancel(&self);
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: SpeechCapture + ?Sized> SpeechCapture for Arc<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    async fn start(&self, events: mpsc::Sender<RuntimeEvent>) -> Result<(), String> {
        (**self).start(events).await
    }

    async fn stop(&self) {
        (**self).stop().await;
    }
}

#[async_trait]
impl<T: SpeechPlayback + ?Sized> SpeechPlayback for Arc<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    async fn speak(
        &self,
        utterance: u64,
        text: &str,
        events: mpsc::Sender<RuntimeEvent>,
    ) -> Result<(), String> {
        (**self).speak(utterance, text, events).await
    }

    async fn cancel(&self) {
        (**self).cancel().await;
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Capture for platforms without speech recognition
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCapture;

#[async_trait]
impl SpeechCapture for UnavailableCapture {
    fn is_available(&self) -> bool {
        false
    }

    async fn start(&self, _events: mpsc::Sender<RuntimeEvent>) -> Result<(), String> {
        Err("speech recognition is not available".to_string())
    }

    async fn stop(&self) {}
}

/// Playback for platforms without speech synthesis
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailablePlayback;

#[async_trait]
impl SpeechPlayback for UnavailablePlayback {
    fn is_available(&self) -> bool {
        false
    }

    async fn speak(
        &self,
        _utterance: u64,
        _text: &str,
        _events: mpsc::Sender<RuntimeEvent>,
    ) -> Result<(), String> {
        Err("speech playback is not available".to_string())
    }

    async fn cancel(&self) {}
}
