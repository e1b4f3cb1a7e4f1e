//! Capture coordination — utterance accumulation and silence watchdog.
//!
//! Capture devices of this class listen continuously with interim results
//! and have no utterance-boundary concept of their own. The watchdog
//! synthesizes "end of utterance": while a session is open it polls the
//! time since the last result and forces a stop once the silence threshold
//! is crossed. The device's asynchronous `Ended` signal then decides
//! whether the accumulated text is worth dispatching.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::debug;

use wren_core::text_prep::normalize_utterance;
use wren_core::types::EngineConfig;

use crate::device::{CaptureDevice, CaptureEvent};

/// Mutable accumulator for the turn in progress.
#[derive(Debug, Default)]
struct Utterance {
    interim: String,
    finalized: String,
}

/// What an ended capture session amounts to.
#[derive(Debug, PartialEq, Eq)]
pub enum EndOutcome {
    /// Trimmed text long enough to dispatch.
    Finalized(String),
    /// Empty or too short — the user didn't really say anything.
    TooShort,
}

pub struct CaptureCoordinator {
    device: Box<dyn CaptureDevice>,
    events_tx: mpsc::UnboundedSender<CaptureEvent>,
    utterance: Utterance,
    last_activity: Instant,
    capturing: bool,
    stop_requested: bool,
    watchdog: Option<JoinHandle<()>>,
}

impl CaptureCoordinator {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        events_tx: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Self {
        Self {
            device,
            events_tx,
            utterance: Utterance::default(),
            last_activity: Instant::now(),
            capturing: false,
            stop_requested: false,
            watchdog: None,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Open a capture session. The caller has already checked the session
    /// and playback preconditions; this only guards against double-starts
    /// and surfaces device unavailability.
    pub async fn begin(
        &mut self,
        epoch: u64,
        tick_tx: mpsc::UnboundedSender<u64>,
        config: &EngineConfig,
    ) -> Result<(), String> {
        if self.capturing {
            return Ok(());
        }

        self.utterance = Utterance::default();
        self.device.start(epoch, self.events_tx.clone()).await?;
        self.last_activity = Instant::now();
        self.capturing = true;
        self.stop_requested = false;
        self.spawn_watchdog(epoch, Duration::from_millis(config.silence_poll_ms), tick_tx);
        debug!("capture: session open (epoch {epoch})");
        Ok(())
    }

    /// Request the device to end the session. The `Ended` event arrives
    /// asynchronously. Tearing the watchdog down here makes the forced
    /// stop fire exactly once per silence window.
    pub async fn request_stop(&mut self) {
        if !self.capturing || self.stop_requested {
            return;
        }
        self.stop_requested = true;
        self.teardown_watchdog();
        self.device.stop().await;
        debug!("capture: stop requested");
    }

    /// Incremental result from the device.
    pub fn on_result(&mut self, text: &str, is_final: bool) {
        if !self.capturing {
            return;
        }
        if is_final {
            if !self.utterance.finalized.is_empty() {
                self.utterance.finalized.push(' ');
            }
            self.utterance.finalized.push_str(text);
            self.utterance.interim.clear();
        } else {
            self.utterance.interim = text.to_string();
        }
        self.last_activity = Instant::now();
    }

    /// Device failed mid-session. Discard the turn; recovery is left to
    /// the end/restart path so a single failure never double-restarts.
    pub fn on_error(&mut self) {
        self.utterance = Utterance::default();
        self.capturing = false;
        self.stop_requested = false;
        self.teardown_watchdog();
    }

    /// Device session ended — finalize or discard the accumulated text.
    pub fn on_ended(&mut self, min_chars: usize) -> EndOutcome {
        self.capturing = false;
        self.stop_requested = false;
        self.teardown_watchdog();

        let raw = if self.utterance.finalized.trim().is_empty() {
            std::mem::take(&mut self.utterance.interim)
        } else {
            std::mem::take(&mut self.utterance.finalized)
        };
        self.utterance = Utterance::default();

        let text = normalize_utterance(&raw);
        if text.chars().count() >= min_chars {
            EndOutcome::Finalized(text)
        } else {
            EndOutcome::TooShort
        }
    }

    /// Whether the silence threshold has been crossed.
    pub fn silence_exceeded(&self, timeout: Duration) -> bool {
        self.capturing && !self.stop_requested && self.last_activity.elapsed() >= timeout
    }

    /// Hard teardown on disable: stop the device, drop the turn.
    pub async fn abort(&mut self) {
        self.teardown_watchdog();
        if self.capturing {
            self.device.stop().await;
        }
        self.utterance = Utterance::default();
        self.capturing = false;
        self.stop_requested = false;
    }

    fn spawn_watchdog(
        &mut self,
        epoch: u64,
        poll: Duration,
        tick_tx: mpsc::UnboundedSender<u64>,
    ) {
        self.teardown_watchdog();
        self.watchdog = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll).await;
                if tick_tx.send(epoch).is_err() {
                    break;
                }
            }
        }));
    }

    fn teardown_watchdog(&mut self) {
        if let Some(handle) = self.watchdog.take() {
            handle.abort();
        }
    }
}

impl Drop for CaptureCoordinator {
    fn drop(&mut self) {
        self.teardown_watchdog();
    }
}
