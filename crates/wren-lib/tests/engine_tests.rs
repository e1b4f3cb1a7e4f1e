//! End-to-end engine tests with scripted fake devices.
//!
//! Runs under paused tokio time, so the silence watchdog, debounce, and
//! resume delays are exercised deterministically. The fakes record every
//! start/stop/speak/cancel and flag any moment where capture and playback
//! overlapped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::Duration;

use wren_lib::device::{
    CaptureDevice, CaptureEvent, CaptureEventKind, PlaybackDevice, PlaybackEvent, Voice,
};
use wren_lib::engine::TurnEngine;
use wren_lib::reply::{HistoryEntry, ReplyService};
use wren_lib::wren_core::types::{EngineConfig, EngineState, Speaker};

// ─── Scripted fakes ────────────────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    capturing: bool,
    speaking: bool,
    overlap: bool,
    capture_starts: usize,
    stop_requests: usize,
    cancels: usize,
    spoken: Vec<String>,
    /// (message, history length) per reply request.
    requests: Vec<(String, usize)>,
    capture_tx: Option<mpsc::UnboundedSender<CaptureEvent>>,
    capture_epoch: u64,
    done_tx: Option<mpsc::UnboundedSender<PlaybackEvent>>,
    speak_epoch: u64,
    fail_capture_start: bool,
}

#[derive(Default)]
struct TestState {
    inner: Mutex<Inner>,
}

impl TestState {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Deliver one capture result, as the device would.
    fn emit_result(&self, text: &str, is_final: bool) {
        let i = self.lock();
        if let Some(tx) = &i.capture_tx {
            let _ = tx.send(CaptureEvent {
                epoch: i.capture_epoch,
                kind: CaptureEventKind::Result {
                    text: text.to_string(),
                    is_final,
                },
            });
        }
    }

    /// Device-initiated end of session (e.g. a spurious empty session).
    fn end_capture(&self) {
        let mut i = self.lock();
        i.capturing = false;
        if let Some(tx) = &i.capture_tx {
            let _ = tx.send(CaptureEvent {
                epoch: i.capture_epoch,
                kind: CaptureEventKind::Ended,
            });
        }
    }

    /// Playback completion, tagged with the epoch the speech started under.
    fn finish_playback(&self) {
        let mut i = self.lock();
        i.speaking = false;
        if let Some(tx) = &i.done_tx {
            let _ = tx.send(PlaybackEvent {
                epoch: i.speak_epoch,
            });
        }
    }

    fn starts(&self) -> usize {
        self.lock().capture_starts
    }

    fn stops(&self) -> usize {
        self.lock().stop_requests
    }

    fn cancels(&self) -> usize {
        self.lock().cancels
    }

    fn spoken(&self) -> Vec<String> {
        self.lock().spoken.clone()
    }

    fn requests(&self) -> Vec<(String, usize)> {
        self.lock().requests.clone()
    }

    fn overlapped(&self) -> bool {
        self.lock().overlap
    }
}

struct FakeCapture {
    state: Arc<TestState>,
}

#[async_trait::async_trait]
impl CaptureDevice for FakeCapture {
    async fn start(
        &mut self,
        epoch: u64,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<(), String> {
        let mut i = self.state.lock();
        if i.fail_capture_start {
            return Err("microphone unavailable".into());
        }
        if i.speaking {
            i.overlap = true;
        }
        i.capturing = true;
        i.capture_starts += 1;
        i.capture_epoch = epoch;
        let _ = events.send(CaptureEvent {
            epoch,
            kind: CaptureEventKind::Started,
        });
        i.capture_tx = Some(events);
        Ok(())
    }

    async fn stop(&mut self) {
        let mut i = self.state.lock();
        i.stop_requests += 1;
        i.capturing = false;
        // The "ended" acknowledgement arrives via the event channel,
        // as a real device would deliver it.
        if let Some(tx) = &i.capture_tx {
            let _ = tx.send(CaptureEvent {
                epoch: i.capture_epoch,
                kind: CaptureEventKind::Ended,
            });
        }
    }
}

struct FakeSpeaker {
    state: Arc<TestState>,
}

#[async_trait::async_trait]
impl PlaybackDevice for FakeSpeaker {
    async fn voices(&self) -> Vec<Voice> {
        vec![
            Voice {
                name: "fr-voice".into(),
                lang: "fr-FR".into(),
            },
            Voice {
                name: "en-voice".into(),
                lang: "en-US".into(),
            },
        ]
    }

    async fn speak(
        &mut self,
        text: &str,
        voice: Option<&Voice>,
        _rate: f32,
        epoch: u64,
        done: mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Result<(), String> {
        let mut i = self.state.lock();
        if i.capturing {
            i.overlap = true;
        }
        assert_eq!(voice.map(|v| v.name.as_str()), Some("en-voice"));
        i.speaking = true;
        i.spoken.push(text.to_string());
        i.done_tx = Some(done);
        i.speak_epoch = epoch;
        Ok(())
    }

    async fn cancel(&mut self) {
        let mut i = self.state.lock();
        i.cancels += 1;
        i.speaking = false;
    }
}

struct FakeReply {
    state: Arc<TestState>,
    script: Mutex<VecDeque<Result<String, String>>>,
}

#[async_trait::async_trait]
impl ReplyService for FakeReply {
    async fn reply(&self, message: &str, history: &[HistoryEntry]) -> Result<String, String> {
        self.state
            .lock()
            .requests
            .push((message.to_string(), history.len()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("echo: {message}")))
    }
}

// ─── Harness ───────────────────────────────────────────────────────────────

fn build_engine(state: &Arc<TestState>, script: Vec<Result<String, String>>) -> TurnEngine {
    TurnEngine::new(
        EngineConfig::default(),
        Box::new(FakeCapture {
            state: state.clone(),
        }),
        Box::new(FakeSpeaker {
            state: state.clone(),
        }),
        Arc::new(FakeReply {
            state: state.clone(),
            script: Mutex::new(script.into()),
        }),
    )
}

/// Poll until `pred` holds. Under paused time each sleep auto-advances
/// the clock, so pending engine timers fire along the way.
async fn wait_for(what: &str, mut pred: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if pred() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

// ─── Scenarios ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn normal_turn_cycle() {
    let state = TestState::new();
    let engine = build_engine(&state, vec![Ok("That sounds lovely, Sid.".into())]);

    engine.enable();
    wait_for("capture start", || state.starts() == 1).await;

    state.emit_result("tell me about my birthday", true);
    // No further activity — the silence watchdog finalizes the turn.
    wait_for("reply spoken", || state.spoken().len() == 1).await;

    let requests = state.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "tell me about my birthday");
    assert!(requests[0].1 <= 10);
    assert_eq!(state.spoken()[0], "That sounds lovely, Sid.");
    assert_eq!(engine.status().state, EngineState::Speaking);

    state.finish_playback();
    wait_for("capture resumed", || state.starts() == 2).await;
    assert_eq!(engine.status().state, EngineState::Listening);

    let transcript = engine.transcript().await;
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].speaker, Speaker::User);
    assert_eq!(transcript[1].speaker, Speaker::Assistant);
    assert!(!state.overlapped());
}

#[tokio::test(start_paused = true)]
async fn silence_timeout_stops_capture_exactly_once() {
    let state = TestState::new();
    let engine = build_engine(&state, vec![]);

    engine.enable();
    wait_for("capture start", || state.starts() == 1).await;
    state.emit_result("hello there", true);

    wait_for("watchdog stop", || state.stops() == 1).await;
    // Extra virtual time must not produce a second stop request.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(state.stops(), 1);
    assert!(!state.overlapped());
    drop(engine);
}

#[tokio::test(start_paused = true)]
async fn short_utterance_debounces_restart_without_dispatch() {
    let state = TestState::new();
    let engine = build_engine(&state, vec![]);

    engine.enable();
    wait_for("capture start", || state.starts() == 1).await;

    // Two spurious empty sessions in quick succession: the second
    // schedule replaces the first, so exactly one restart fires.
    state.end_capture();
    state.end_capture();

    wait_for("debounced restart", || state.starts() == 2).await;
    // Less than the silence timeout, so the fresh session stays open.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(state.starts(), 2);
    assert!(state.requests().is_empty(), "too-short text must not dispatch");
    drop(engine);
}

#[tokio::test(start_paused = true)]
async fn reply_failure_speaks_fallback_and_cycle_continues() {
    let state = TestState::new();
    let engine = build_engine(&state, vec![Err("connection refused".into())]);

    engine.enable();
    wait_for("capture start", || state.starts() == 1).await;
    state.emit_result("what day is it", true);

    wait_for("fallback spoken", || state.spoken().len() == 1).await;
    assert_eq!(state.spoken()[0], "Sorry, I didn't catch that.");
    assert_eq!(engine.status().state, EngineState::Speaking);

    let transcript = engine.transcript().await;
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].speaker, Speaker::Assistant);
    assert_eq!(transcript[1].text, "Sorry, I didn't catch that.");

    state.finish_playback();
    wait_for("capture resumed after fallback", || state.starts() == 2).await;
}

#[tokio::test(start_paused = true)]
async fn disable_is_idempotent_and_leaves_no_timers() {
    let state = TestState::new();
    let engine = build_engine(&state, vec![]);

    engine.enable();
    wait_for("capture start", || state.starts() == 1).await;

    engine.disable();
    engine.disable();
    wait_for("idle", || engine.status().state == EngineState::Idle).await;

    // No debounce/grace/resume timer may fire a restart afterwards.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(state.starts(), 1);
    assert_eq!(engine.status().state, EngineState::Idle);
}

#[tokio::test(start_paused = true)]
async fn disable_before_grace_never_starts_capture() {
    let state = TestState::new();
    let engine = build_engine(&state, vec![]);

    engine.enable();
    engine.disable();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(state.starts(), 0);
    assert_eq!(engine.status().state, EngineState::Idle);
}

#[tokio::test(start_paused = true)]
async fn mid_speech_disable_cancels_playback_and_suppresses_resume() {
    let state = TestState::new();
    let engine = build_engine(&state, vec![Ok("A long story.".into())]);

    engine.enable();
    wait_for("capture start", || state.starts() == 1).await;
    state.emit_result("tell me a story", true);
    wait_for("speaking", || state.spoken().len() == 1).await;

    engine.disable();
    wait_for("cancelled", || state.cancels() == 1).await;
    assert_eq!(engine.status().state, EngineState::Idle);

    // The completion callback was already in flight — it must not
    // resume capture in an idle session.
    state.finish_playback();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(state.starts(), 1);
    assert_eq!(engine.status().state, EngineState::Idle);
}

#[tokio::test(start_paused = true)]
async fn unavailable_device_alerts_once_and_stays_idle() {
    let state = TestState::new();
    state.lock().fail_capture_start = true;
    let engine = build_engine(&state, vec![]);

    engine.enable();
    wait_for("alert", || engine.status().alert.is_some()).await;

    assert_eq!(engine.status().state, EngineState::Idle);
    assert_eq!(state.starts(), 0);
    // No automatic retry.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(state.starts(), 0);
}

#[tokio::test(start_paused = true)]
async fn history_sent_to_reply_service_is_bounded() {
    let state = TestState::new();
    let engine = build_engine(&state, vec![]);

    engine.enable();
    for i in 0..6 {
        wait_for("capture open", || state.starts() == i + 1).await;
        state.emit_result(&format!("message number {i} please"), true);
        wait_for("reply spoken", || state.spoken().len() == i + 1).await;
        state.finish_playback();
    }

    let requests = state.requests();
    assert_eq!(requests.len(), 6);
    // Request k sees 2k-1 turns (its own user turn included), capped at 10.
    assert_eq!(requests[0].1, 1);
    assert_eq!(requests[4].1, 9);
    assert_eq!(requests[5].1, 10);
    assert!(!state.overlapped());
}
