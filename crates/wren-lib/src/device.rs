//! Capability interfaces for the external speech devices.
//!
//! The engine never touches microphones or speakers directly — it drives a
//! [`CaptureDevice`] and a [`PlaybackDevice`] and reacts to the events they
//! deliver on the engine's channels. Events carry the session epoch they
//! were born under; the engine drops anything stale, so a late `Ended` or
//! `Finished` arriving after a session was torn down is inert.

use tokio::sync::mpsc;

/// A playback voice as reported by the device.
#[derive(Debug, Clone)]
pub struct Voice {
    pub name: String,
    /// BCP-47-style language tag, e.g. "en-US".
    pub lang: String,
}

/// Events a capture device delivers while a session is open.
#[derive(Debug, Clone)]
pub enum CaptureEventKind {
    /// The device began listening.
    Started,
    /// An incremental transcription result.
    Result { text: String, is_final: bool },
    /// The device failed mid-session.
    Error(String),
    /// The device session ended. Always the last event of a session.
    Ended,
}

#[derive(Debug, Clone)]
pub struct CaptureEvent {
    pub epoch: u64,
    pub kind: CaptureEventKind,
}

/// Completion signal from the playback device.
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub epoch: u64,
}

/// Continuous speech capture with interim results.
///
/// `stop` requests the end of the session; the device acknowledges
/// asynchronously with [`CaptureEventKind::Ended`], never synchronously.
#[async_trait::async_trait]
pub trait CaptureDevice: Send {
    /// Open a capture session. Events are tagged with `epoch` and sent on
    /// `events`. An `Err` means the device is unavailable (e.g. microphone
    /// permission denied).
    async fn start(
        &mut self,
        epoch: u64,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<(), String>;

    /// Request the end of the current session.
    async fn stop(&mut self);
}

/// Text-to-speech playback with cancellation.
#[async_trait::async_trait]
pub trait PlaybackDevice: Send {
    /// Voices the device offers.
    async fn voices(&self) -> Vec<Voice>;

    /// Speak `text` at `rate`, signalling completion on `done` tagged with
    /// `epoch`. `voice` of `None` means the device default.
    async fn speak(
        &mut self,
        text: &str,
        voice: Option<&Voice>,
        rate: f32,
        epoch: u64,
        done: mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Result<(), String>;

    /// Cancel in-flight speech. The pending completion signal may still
    /// arrive; the engine guards against acting on it.
    async fn cancel(&mut self);
}
