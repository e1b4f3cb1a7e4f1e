//! Single-instance cancellable timers.
//!
//! Each deferred action of the engine (enable grace, restart debounce,
//! post-speech resume) owns one [`OneShotTimer`]. Scheduling replaces and
//! cancels any prior instance, and every fire carries the sequence number
//! it was scheduled under — a fire whose sequence no longer matches is
//! stale and must be ignored. This replaces ad hoc handle-clearing with an
//! owned, replaceable timer value.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What a timer fire means to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPurpose {
    /// Start capture shortly after the session was enabled.
    EnableGrace,
    /// Restart capture after an empty or too-short utterance.
    RestartDebounce,
    /// Resume capture after playback finished, past the speaker tail.
    PostSpeechResume,
}

#[derive(Debug, Clone, Copy)]
pub struct TimerFire {
    pub purpose: TimerPurpose,
    pub seq: u64,
    pub epoch: u64,
}

/// At most one live instance per purpose.
#[derive(Debug)]
pub struct OneShotTimer {
    purpose: TimerPurpose,
    seq: u64,
    handle: Option<JoinHandle<()>>,
}

impl OneShotTimer {
    pub fn new(purpose: TimerPurpose) -> Self {
        Self {
            purpose,
            seq: 0,
            handle: None,
        }
    }

    /// Schedule a fire after `delay`, cancelling any pending instance.
    pub fn schedule(
        &mut self,
        delay: Duration,
        epoch: u64,
        tx: &mpsc::UnboundedSender<TimerFire>,
    ) {
        self.cancel();
        self.seq += 1;
        let fire = TimerFire {
            purpose: self.purpose,
            seq: self.seq,
            epoch,
        };
        let tx = tx.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(fire);
        }));
    }

    /// Cancel the pending instance, if any. A fire already in flight is
    /// invalidated by the sequence bump.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.seq += 1;
    }

    /// Whether `fire` belongs to the current schedule.
    pub fn accepts(&self, fire: &TimerFire) -> bool {
        fire.purpose == self.purpose && fire.seq == self.seq
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_once_with_matching_seq() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = OneShotTimer::new(TimerPurpose::RestartDebounce);
        timer.schedule(Duration::from_millis(400), 1, &tx);

        let fire = rx.recv().await.unwrap();
        assert!(timer.accepts(&fire));
        assert_eq!(fire.epoch, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_invalidates_prior() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = OneShotTimer::new(TimerPurpose::RestartDebounce);
        timer.schedule(Duration::from_millis(400), 1, &tx);
        timer.schedule(Duration::from_millis(400), 1, &tx);

        // Only the second instance fires, and it is the accepted one.
        let fire = rx.recv().await.unwrap();
        assert!(timer.accepts(&fire));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_makes_fire_stale() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = OneShotTimer::new(TimerPurpose::EnableGrace);
        timer.schedule(Duration::from_millis(300), 1, &tx);
        timer.cancel();

        tokio::time::sleep(Duration::from_millis(500)).await;
        // Either nothing arrives (abort won) or the fire is stale.
        if let Ok(fire) = rx.try_recv() {
            assert!(!timer.accepts(&fire));
        }
    }
}
