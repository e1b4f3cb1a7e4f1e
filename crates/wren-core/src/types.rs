//! Shared types for the wren voice conversation engine.
//!
//! These types are used across wren-lib, wren-cli, and downstream consumers
//! of the HTTP surface. Keeping them in wren-core means consumers can depend
//! on types without pulling in tokio, reqwest, or other heavy deps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Engine configuration ──────────────────────────────────────────────────

/// Turn engine configuration.
///
/// The timing fields carry empirically tuned defaults. They are fixed per
/// engine instance — there is no per-call override.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Reply service endpoint.
    pub reply_url: String,
    /// Preferred playback voice language prefix, e.g. "en".
    pub voice_lang_prefix: String,
    /// Playback speech rate.
    pub speech_rate: f32,
    /// How many transcript turns accompany a reply request.
    pub history_limit: usize,
    /// Minimum trimmed utterance length worth dispatching.
    pub min_utterance_chars: usize,
    /// Spoken when the reply service fails.
    pub fallback_reply: String,
    /// Silence that ends a listening turn.
    pub silence_timeout_ms: u64,
    /// Poll period of the silence watchdog.
    pub silence_poll_ms: u64,
    /// Delay before restarting capture after an empty utterance.
    pub restart_debounce_ms: u64,
    /// Delay between playback completion and capture resume, so the
    /// microphone does not pick up the speaker tail.
    pub post_speech_delay_ms: u64,
    /// Delay between enabling a session and the first capture start.
    pub enable_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reply_url: "http://localhost:4000/api/chat".into(),
            voice_lang_prefix: "en".into(),
            speech_rate: 1.0,
            history_limit: 10,
            min_utterance_chars: 2,
            fallback_reply: "Sorry, I didn't catch that.".into(),
            silence_timeout_ms: 2_000,
            silence_poll_ms: 250,
            restart_debounce_ms: 400,
            post_speech_delay_ms: 400,
            enable_grace_ms: 300,
        }
    }
}

// ─── Engine state ──────────────────────────────────────────────────────────

/// Observable engine state. One of the three busy states holds at a time
/// while a session is active; `Idle` is both initial and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineState {
    Idle,
    Listening,
    AwaitingReply,
    Speaking,
}

/// Engine status snapshot, published on every state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub state: EngineState,
    /// Turns in the transcript so far.
    pub turns: usize,
    /// Selected playback voice, once chosen.
    pub voice: Option<String>,
    /// Set once when the capture device is unavailable.
    pub alert: Option<String>,
}

impl EngineStatus {
    pub fn idle() -> Self {
        Self {
            state: EngineState::Idle,
            turns: 0,
            voice: None,
            alert: None,
        }
    }
}

// ─── Transcript types ──────────────────────────────────────────────────────

/// Who produced a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One finalized turn of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}
