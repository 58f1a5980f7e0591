//! Ordered progress stream from a session worker to its observer.

use chrono::{DateTime, Local};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

use crate::session::SessionPhase;

/// One progress message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// When the message was produced.
    pub at: DateTime<Local>,
    /// Session phase after the step that produced the message.
    pub phase: SessionPhase,
    /// Human readable description.
    pub message: String,
}

impl ProgressEvent {
    /// Event stamped with the current local time.
    pub fn now(phase: SessionPhase, message: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            phase,
            message: message.into(),
        }
    }

    /// `HH:MM:SS message` rendering used by the status panel.
    pub fn display_line(&self) -> String {
        format!("{} {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Create an unbounded channel; the producer never blocks.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, ProgressReceiver { rx })
}

/// Producer half, held by the session runner.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    /// Queue an event; silently dropped once the observer has gone away.
    pub fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            debug!("progress observer is gone, dropping event");
        }
    }
}

/// Consumer half, drained by the display.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Next queued event without waiting.
    pub fn try_next(&mut self) -> Option<ProgressEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Every event queued so far, in production order.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Wait for the next event; `None` once every producer is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}
