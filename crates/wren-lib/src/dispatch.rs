//! Reply dispatch — finalized utterance in, spoken text out.
//!
//! The reply request is the engine's only real suspension point, so it
//! runs as a spawned task and delivers its outcome back through the
//! engine's event channel. A failed request substitutes the fixed
//! fallback utterance instead of surfacing an error: playback, and with
//! it the capture-resume cycle, must happen either way. No retries.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::reply::{HistoryEntry, ReplyService};

/// Outcome of one dispatch, delivered to the engine loop.
#[derive(Debug)]
pub struct ReplyOutcome {
    pub epoch: u64,
    pub text: String,
    pub fell_back: bool,
}

pub struct ReplyDispatcher {
    service: Arc<dyn ReplyService>,
    fallback: String,
}

impl ReplyDispatcher {
    pub fn new(service: Arc<dyn ReplyService>, fallback: impl Into<String>) -> Self {
        Self {
            service,
            fallback: fallback.into(),
        }
    }

    /// Fire the reply request for a finalized utterance.
    pub fn dispatch(
        &self,
        message: String,
        history: Vec<HistoryEntry>,
        epoch: u64,
        out: mpsc::UnboundedSender<ReplyOutcome>,
    ) {
        let service = self.service.clone();
        let fallback = self.fallback.clone();
        debug!(
            "dispatch: '{message}' with {} history turns (epoch {epoch})",
            history.len()
        );
        tokio::spawn(async move {
            let (text, fell_back) = match service.reply(&message, &history).await {
                Ok(text) if !text.trim().is_empty() => (text, false),
                Ok(_) => {
                    warn!("dispatch: empty reply, falling back");
                    (fallback, true)
                }
                Err(e) => {
                    warn!("dispatch: reply failed: {e}");
                    (fallback, true)
                }
            };
            let _ = out.send(ReplyOutcome {
                epoch,
                text,
                fell_back,
            });
        });
    }
}
