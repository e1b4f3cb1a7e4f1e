//! Reply service client — wire types, trait, HTTP implementation.

use serde::{Deserialize, Serialize};

use wren_core::types::{Speaker, TranscriptTurn};

// ─── Wire types ────────────────────────────────────────────────────────────

/// Speaker tag as the reply service expects it.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    User,
    Ai,
}

/// One bounded-history entry sent with a reply request.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub content: String,
    pub timestamp: String,
}

impl From<&TranscriptTurn> for HistoryEntry {
    fn from(turn: &TranscriptTurn) -> Self {
        Self {
            kind: match turn.speaker {
                Speaker::User => HistoryKind::User,
                Speaker::Assistant => HistoryKind::Ai,
            },
            content: turn.text.clone(),
            timestamp: turn.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    message: &'a str,
    conversation_history: &'a [HistoryEntry],
}

#[derive(Deserialize)]
struct ReplyResponse {
    response: String,
}

// ─── Service trait ─────────────────────────────────────────────────────────

/// Produces an assistant reply for the latest utterance plus bounded
/// history. May take non-trivial, variable latency; may fail.
#[async_trait::async_trait]
pub trait ReplyService: Send + Sync {
    async fn reply(&self, message: &str, history: &[HistoryEntry]) -> Result<String, String>;
}

// ─── HTTP implementation ───────────────────────────────────────────────────

/// Reply service over HTTP. Non-2xx or a malformed body is a failure.
pub struct HttpReplyService {
    client: reqwest::Client,
    url: String,
}

impl HttpReplyService {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl ReplyService for HttpReplyService {
    async fn reply(&self, message: &str, history: &[HistoryEntry]) -> Result<String, String> {
        let resp = self
            .client
            .post(&self.url)
            .json(&ReplyRequest {
                message,
                conversation_history: history,
            })
            .send()
            .await
            .map_err(|e| format!("reply request failed: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("reply service error ({status}): {body}"));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| format!("response read error: {e}"))?;
        let parsed: ReplyResponse = serde_json::from_str(&body)
            .map_err(|e| format!("invalid reply body: {e}; raw={body}"))?;

        Ok(parsed.response)
    }
}
