//! Playback coordination — voice selection, speech, cancellation.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::device::{PlaybackDevice, PlaybackEvent, Voice};

pub struct PlaybackCoordinator {
    device: Box<dyn PlaybackDevice>,
    done_tx: mpsc::UnboundedSender<PlaybackEvent>,
    voice: Option<Voice>,
    rate: f32,
    speaking: bool,
}

impl PlaybackCoordinator {
    pub fn new(
        device: Box<dyn PlaybackDevice>,
        done_tx: mpsc::UnboundedSender<PlaybackEvent>,
        rate: f32,
    ) -> Self {
        Self {
            device,
            done_tx,
            voice: None,
            rate,
            speaking: false,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn voice_name(&self) -> Option<String> {
        self.voice.as_ref().map(|v| v.name.clone())
    }

    /// Pick the voice once at startup: first voice whose language tag
    /// begins with `lang_prefix`, otherwise the device default.
    pub async fn select_voice(&mut self, lang_prefix: &str) {
        let voices = self.device.voices().await;
        self.voice = voices.into_iter().find(|v| v.lang.starts_with(lang_prefix));
        match &self.voice {
            Some(v) => info!("playback: voice '{}' ({})", v.name, v.lang),
            None => info!("playback: no '{lang_prefix}*' voice, using device default"),
        }
    }

    /// Speak `text`. Returns `Ok(false)` when the text is empty and the
    /// operation was skipped.
    pub async fn speak(&mut self, text: &str, epoch: u64) -> Result<bool, String> {
        if text.trim().is_empty() {
            debug!("playback: empty text, skipping");
            return Ok(false);
        }
        self.device
            .speak(text, self.voice.as_ref(), self.rate, epoch, self.done_tx.clone())
            .await?;
        self.speaking = true;
        debug!("playback: speaking {} chars (epoch {epoch})", text.len());
        Ok(true)
    }

    /// Completion signal observed by the engine.
    pub fn on_finished(&mut self) {
        self.speaking = false;
    }

    /// Cancel in-flight speech. A completion signal already in flight is
    /// neutralized by the engine's epoch and session checks.
    pub async fn cancel(&mut self) {
        if self.speaking {
            self.device.cancel().await;
            self.speaking = false;
            debug!("playback: cancelled");
        }
    }
}
