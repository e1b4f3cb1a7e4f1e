//! Append-only conversation transcript.
//!
//! Insertion order is the conversation order and is what the reply service
//! receives as context, bounded to the most recent turns.

use chrono::Utc;

use crate::types::{Speaker, TranscriptTurn};

/// Ordered log of user/assistant turns.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    turns: Vec<TranscriptTurn>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn, stamping it with the current time.
    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.turns.push(TranscriptTurn {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        });
    }

    /// The last `n` turns in conversation order.
    pub fn recent(&self, n: usize) -> &[TranscriptTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Full copy for the presentation layer.
    pub fn snapshot(&self) -> Vec<TranscriptTurn> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
