//! Console demo devices — drive the engine without audio hardware.
//!
//! Each stdin line is delivered as one final capture result; the silence
//! watchdog then finalizes the turn. Replies are printed and "spoken" at
//! a rough reading pace so the capture/playback exclusion is observable.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Duration;

use wren_lib::device::{
    CaptureDevice, CaptureEvent, CaptureEventKind, PlaybackDevice, PlaybackEvent, Voice,
};

#[derive(Default)]
pub struct ConsoleCapture {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl CaptureDevice for ConsoleCapture {
    async fn start(
        &mut self,
        epoch: u64,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<(), String> {
        // End any previous session before opening a new one.
        self.stop().await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        self.task = Some(tokio::spawn(async move {
            let _ = events.send(CaptureEvent {
                epoch,
                kind: CaptureEventKind::Started,
            });
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    line = lines.next_line() => match line {
                        Ok(Some(text)) => {
                            let _ = events.send(CaptureEvent {
                                epoch,
                                kind: CaptureEventKind::Result { text, is_final: true },
                            });
                        }
                        Ok(None) => break,
                        Err(e) => {
                            let _ = events.send(CaptureEvent {
                                epoch,
                                kind: CaptureEventKind::Error(e.to_string()),
                            });
                            break;
                        }
                    },
                }
            }
            let _ = events.send(CaptureEvent {
                epoch,
                kind: CaptureEventKind::Ended,
            });
        }));
        self.stop_tx = Some(stop_tx);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[derive(Default)]
pub struct ConsoleSpeaker {
    pending: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl PlaybackDevice for ConsoleSpeaker {
    async fn voices(&self) -> Vec<Voice> {
        vec![Voice {
            name: "console".into(),
            lang: "en-US".into(),
        }]
    }

    async fn speak(
        &mut self,
        text: &str,
        _voice: Option<&Voice>,
        rate: f32,
        epoch: u64,
        done: mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Result<(), String> {
        println!("assistant> {text}");
        // Rough reading pace, so the mic stays closed while "speaking".
        let ms = ((text.chars().count() as f32 * 30.0 / rate.max(0.1)) as u64).clamp(300, 4_000);
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            let _ = done.send(PlaybackEvent { epoch });
        }));
        Ok(())
    }

    async fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
