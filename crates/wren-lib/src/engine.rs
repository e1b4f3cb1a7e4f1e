//! The turn engine — session lifecycle, event loop, state machine glue.
//!
//! Control flow is strictly circular while a session is active:
//!
//! ```text
//! enable → [grace 300ms] → capture → [silence 2s] → finalize
//!     → dispatch → reply/fallback → playback → [tail 400ms] → capture …
//! ```
//!
//! All coordinators run on one event-loop task; they communicate through
//! channels and scheduled timers, never shared mutable state across
//! threads. The loop owns the [`EngineState`] enum, so every transition
//! and the capture/playback exclusion invariant live in one place.
//! `disable()` is the single cancellation entry point: it cancels timers,
//! stops capture, cancels playback, and bumps the session epoch so any
//! late device signal or in-flight reply is dropped on arrival.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use wren_core::text_prep::clean_reply_for_speech;
use wren_core::transcript::TranscriptLog;
use wren_core::types::{EngineConfig, EngineState, EngineStatus, Speaker, TranscriptTurn};

use crate::capture::{CaptureCoordinator, EndOutcome};
use crate::device::{CaptureDevice, CaptureEvent, CaptureEventKind, PlaybackDevice, PlaybackEvent};
use crate::dispatch::{ReplyDispatcher, ReplyOutcome};
use crate::playback::PlaybackCoordinator;
use crate::reply::{HistoryEntry, ReplyService};
use crate::timer::{OneShotTimer, TimerFire, TimerPurpose};

enum Cmd {
    Enable,
    Disable,
    Transcript(oneshot::Sender<Vec<TranscriptTurn>>),
}

/// Cloneable handle to the turn engine. All methods are non-blocking
/// except [`TurnEngine::transcript`].
#[derive(Clone)]
pub struct TurnEngine {
    cmd_tx: mpsc::UnboundedSender<Cmd>,
    status_rx: watch::Receiver<EngineStatus>,
}

impl TurnEngine {
    /// Spawn the engine loop. Must be called within a tokio runtime.
    pub fn new(
        config: EngineConfig,
        capture_device: Box<dyn CaptureDevice>,
        playback_device: Box<dyn PlaybackDevice>,
        reply_service: Arc<dyn ReplyService>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(EngineStatus::idle());
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let dispatcher = ReplyDispatcher::new(reply_service, config.fallback_reply.clone());
        let core = EngineCore {
            capture: CaptureCoordinator::new(capture_device, capture_tx),
            playback: PlaybackCoordinator::new(playback_device, done_tx, config.speech_rate),
            dispatcher,
            transcript: TranscriptLog::new(),
            state: EngineState::Idle,
            active: false,
            epoch: 0,
            alert: None,
            grace: OneShotTimer::new(TimerPurpose::EnableGrace),
            restart: OneShotTimer::new(TimerPurpose::RestartDebounce),
            resume: OneShotTimer::new(TimerPurpose::PostSpeechResume),
            timer_tx,
            tick_tx,
            reply_tx,
            status_tx,
            config,
        };

        tokio::spawn(run_loop(
            core, cmd_rx, capture_rx, done_rx, timer_rx, tick_rx, reply_rx,
        ));

        Self { cmd_tx, status_rx }
    }

    /// Turn voice mode on. No-op when already active.
    pub fn enable(&self) {
        let _ = self.cmd_tx.send(Cmd::Enable);
    }

    /// Turn voice mode off: cancels timers, capture, and playback.
    /// Idempotent, safe from any state.
    pub fn disable(&self) {
        let _ = self.cmd_tx.send(Cmd::Disable);
    }

    /// Current status snapshot.
    pub fn status(&self) -> EngineStatus {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.status_rx.clone()
    }

    /// Full transcript snapshot.
    pub async fn transcript(&self) -> Vec<TranscriptTurn> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Cmd::Transcript(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

// ─── Engine core ───────────────────────────────────────────────────────────

struct EngineCore {
    capture: CaptureCoordinator,
    playback: PlaybackCoordinator,
    dispatcher: ReplyDispatcher,
    transcript: TranscriptLog,
    state: EngineState,
    active: bool,
    /// Bumped on disable; everything async carries the epoch it was born
    /// under and is dropped when stale.
    epoch: u64,
    alert: Option<String>,
    grace: OneShotTimer,
    restart: OneShotTimer,
    resume: OneShotTimer,
    timer_tx: mpsc::UnboundedSender<TimerFire>,
    tick_tx: mpsc::UnboundedSender<u64>,
    reply_tx: mpsc::UnboundedSender<ReplyOutcome>,
    status_tx: watch::Sender<EngineStatus>,
    config: EngineConfig,
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    mut core: EngineCore,
    mut cmd_rx: mpsc::UnboundedReceiver<Cmd>,
    mut capture_rx: mpsc::UnboundedReceiver<CaptureEvent>,
    mut done_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
    mut timer_rx: mpsc::UnboundedReceiver<TimerFire>,
    mut tick_rx: mpsc::UnboundedReceiver<u64>,
    mut reply_rx: mpsc::UnboundedReceiver<ReplyOutcome>,
) {
    let prefix = core.config.voice_lang_prefix.clone();
    core.playback.select_voice(&prefix).await;
    core.publish_status();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => core.on_cmd(cmd).await,
                None => break, // all handles dropped
            },
            Some(ev) = capture_rx.recv() => core.on_capture(ev).await,
            Some(ev) = done_rx.recv() => core.on_playback(ev),
            Some(fire) = timer_rx.recv() => core.on_timer(fire).await,
            Some(epoch) = tick_rx.recv() => core.on_silence_tick(epoch).await,
            Some(outcome) = reply_rx.recv() => core.on_reply(outcome).await,
        }

        debug_assert!(
            !(core.capture.is_capturing() && core.playback.is_speaking()),
            "capture and playback must never be concurrently active"
        );
        core.publish_status();
    }

    core.disable_session().await;
}

impl EngineCore {
    // ── Session controller ────────────────────────────────────────────

    async fn on_cmd(&mut self, cmd: Cmd) {
        match cmd {
            Cmd::Enable => self.enable_session(),
            Cmd::Disable => self.disable_session().await,
            Cmd::Transcript(tx) => {
                let _ = tx.send(self.transcript.snapshot());
            }
        }
    }

    fn enable_session(&mut self) {
        if self.active {
            debug!("engine: enable ignored, session already active");
            return;
        }
        info!("engine: session enabled");
        self.active = true;
        self.alert = None;
        self.state = EngineState::Listening;
        // Let the surrounding surface settle before opening the mic.
        self.grace.schedule(
            Duration::from_millis(self.config.enable_grace_ms),
            self.epoch,
            &self.timer_tx,
        );
    }

    async fn disable_session(&mut self) {
        if !self.active && self.state == EngineState::Idle {
            // Still cancel timers so repeated disables leave nothing behind.
            self.cancel_timers();
            return;
        }
        info!("engine: session disabled");
        self.cancel_timers();
        self.capture.abort().await;
        self.playback.cancel().await;
        self.epoch += 1;
        self.active = false;
        self.state = EngineState::Idle;
    }

    fn cancel_timers(&mut self) {
        self.grace.cancel();
        self.restart.cancel();
        self.resume.cancel();
    }

    // ── Capture path ──────────────────────────────────────────────────

    /// Opportunistic capture start: silently a no-op unless the session
    /// is active, nothing is capturing, nothing is speaking, and no reply
    /// is pending. Device failure here is the one user-visible error.
    async fn try_start_listening(&mut self) {
        if !self.active
            || self.capture.is_capturing()
            || self.playback.is_speaking()
            || self.state == EngineState::AwaitingReply
        {
            debug!("engine: start listening skipped (state {:?})", self.state);
            return;
        }

        match self
            .capture
            .begin(self.epoch, self.tick_tx.clone(), &self.config)
            .await
        {
            Ok(()) => {
                self.state = EngineState::Listening;
            }
            Err(e) => {
                error!("engine: capture device unavailable: {e}");
                self.alert = Some(e);
                self.cancel_timers();
                self.active = false;
                self.state = EngineState::Idle;
            }
        }
    }

    async fn on_capture(&mut self, ev: CaptureEvent) {
        if ev.epoch != self.epoch {
            debug!("engine: stale capture event dropped");
            return;
        }
        match ev.kind {
            CaptureEventKind::Started => {
                debug!("capture: device reported start");
            }
            CaptureEventKind::Result { text, is_final } => {
                self.capture.on_result(&text, is_final);
            }
            CaptureEventKind::Error(e) => {
                warn!("capture: device error: {e}");
                self.capture.on_error();
                // No restart from here — the end path owns recovery.
            }
            CaptureEventKind::Ended => self.on_capture_ended().await,
        }
    }

    async fn on_capture_ended(&mut self) {
        match self.capture.on_ended(self.config.min_utterance_chars) {
            EndOutcome::Finalized(text) => {
                info!("capture: finalized '{text}'");
                self.dispatch_utterance(text);
            }
            EndOutcome::TooShort => {
                if self.active {
                    debug!("capture: nothing said, debouncing restart");
                    self.restart.schedule(
                        Duration::from_millis(self.config.restart_debounce_ms),
                        self.epoch,
                        &self.timer_tx,
                    );
                }
            }
        }
    }

    async fn on_silence_tick(&mut self, epoch: u64) {
        if epoch != self.epoch {
            return;
        }
        let timeout = Duration::from_millis(self.config.silence_timeout_ms);
        if self.capture.silence_exceeded(timeout) {
            info!("capture: silence timeout, ending turn");
            self.capture.request_stop().await;
        }
    }

    // ── Reply path ────────────────────────────────────────────────────

    fn dispatch_utterance(&mut self, text: String) {
        self.state = EngineState::AwaitingReply;
        self.transcript.push(Speaker::User, text.clone());
        let history: Vec<HistoryEntry> = self
            .transcript
            .recent(self.config.history_limit)
            .iter()
            .map(HistoryEntry::from)
            .collect();
        self.dispatcher
            .dispatch(text, history, self.epoch, self.reply_tx.clone());
    }

    async fn on_reply(&mut self, outcome: ReplyOutcome) {
        if outcome.epoch != self.epoch {
            debug!("engine: stale reply dropped");
            return;
        }
        if self.state != EngineState::AwaitingReply {
            debug!("engine: reply arrived in {:?}, dropped", self.state);
            return;
        }
        if outcome.fell_back {
            info!("engine: speaking fallback reply");
        }
        self.transcript.push(Speaker::Assistant, outcome.text.clone());

        let speech = clean_reply_for_speech(&outcome.text);
        match self.playback.speak(&speech, self.epoch).await {
            Ok(true) => {
                self.state = EngineState::Speaking;
            }
            Ok(false) => {
                // Nothing to say; resume the cycle as if playback finished.
                self.state = EngineState::Listening;
                self.schedule_resume();
            }
            Err(e) => {
                warn!("engine: playback failed: {e}");
                self.state = EngineState::Listening;
                self.schedule_resume();
            }
        }
    }

    // ── Playback path ─────────────────────────────────────────────────

    fn on_playback(&mut self, ev: PlaybackEvent) {
        // Session check first: a completion that raced a disable must not
        // resume capture in an idle session.
        if ev.epoch != self.epoch || !self.active {
            debug!("engine: stale playback completion dropped");
            return;
        }
        self.playback.on_finished();
        if self.state == EngineState::Speaking {
            debug!("playback: finished, resuming capture after tail delay");
            self.state = EngineState::Listening;
            self.schedule_resume();
        }
    }

    fn schedule_resume(&mut self) {
        self.resume.schedule(
            Duration::from_millis(self.config.post_speech_delay_ms),
            self.epoch,
            &self.timer_tx,
        );
    }

    // ── Timers ────────────────────────────────────────────────────────

    async fn on_timer(&mut self, fire: TimerFire) {
        if fire.epoch != self.epoch {
            debug!("engine: stale timer fire dropped");
            return;
        }
        let accepted = match fire.purpose {
            TimerPurpose::EnableGrace => self.grace.accepts(&fire),
            TimerPurpose::RestartDebounce => self.restart.accepts(&fire),
            TimerPurpose::PostSpeechResume => self.resume.accepts(&fire),
        };
        if !accepted {
            debug!("engine: superseded {:?} fire dropped", fire.purpose);
            return;
        }
        // All three timers lead to the same opportunistic start; the
        // preconditions there decide whether it actually happens.
        self.try_start_listening().await;
    }

    fn publish_status(&self) {
        self.status_tx.send_modify(|s| {
            s.state = self.state;
            s.turns = self.transcript.len();
            s.voice = self.playback.voice_name();
            s.alert = self.alert.clone();
        });
    }
}
