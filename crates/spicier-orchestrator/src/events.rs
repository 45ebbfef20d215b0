//! Per-job lifecycle event streams.
//!
//! Each job owns an [`EventHub`] created at submission. Events are kept in a
//! short history so subscribers can attach at any time:
//!
//! - attaching to a running job replays its history, with earlier waveform
//!   updates collapsed into the newest one, then delivers live events
//! - attaching to a finished job delivers only its terminal event
//!
//! Nothing is delivered after the terminal event.

use std::sync::{Arc, Mutex, PoisonError};

use spicier_core::CanonicalWaveform;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::ErrorKind;

/// Lifecycle event of one job.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Started,
    Progress {
        /// Completed fraction in `[0, 1]`.
        fraction: f64,
        label: String,
    },
    /// Everything produced so far by a streaming analysis.
    WaveformUpdate(Arc<CanonicalWaveform>),
    Completed(Arc<CanonicalWaveform>),
    Failed {
        kind: ErrorKind,
        message: String,
    },
    Cancelled,
}

impl LifecycleEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleEvent::Completed(_) | LifecycleEvent::Failed { .. } | LifecycleEvent::Cancelled
        )
    }
}

#[derive(Debug, Default)]
struct HubState {
    history: Vec<LifecycleEvent>,
    subscribers: Vec<UnboundedSender<LifecycleEvent>>,
    closed: bool,
}

/// Fan-out of one job's events to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventHub {
    state: Mutex<HubState>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event. Returns `false` once the hub has seen a terminal event.
    pub fn emit(&self, event: LifecycleEvent) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return false;
        }

        if event.is_terminal() {
            state.closed = true;
            for tx in state.subscribers.drain(..) {
                let _ = tx.send(event.clone());
            }
            state.history = vec![event];
            return true;
        }

        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if matches!(event, LifecycleEvent::WaveformUpdate(_)) {
            state
                .history
                .retain(|e| !matches!(e, LifecycleEvent::WaveformUpdate(_)));
        }
        state.history.push(event);
        true
    }

    /// Attach a new subscriber.
    pub fn subscribe(&self) -> JobEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for event in &state.history {
            let _ = tx.send(event.clone());
        }
        if !state.closed {
            state.subscribers.push(tx);
        }
        JobEvents { rx }
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }
}

/// Receiving end of a job's event stream.
#[derive(Debug)]
pub struct JobEvents {
    rx: UnboundedReceiver<LifecycleEvent>,
}

impl JobEvents {
    /// Next event, or `None` after the terminal event has been received.
    pub async fn next(&mut self) -> Option<LifecycleEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_next(&mut self) -> Option<LifecycleEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait for the terminal event, discarding everything before it.
    pub async fn wait_terminal(mut self) -> Option<LifecycleEvent> {
        while let Some(event) = self.rx.recv().await {
            if event.is_terminal() {
                return Some(event);
            }
        }
        None
    }

    /// Collect every remaining event up to and including the terminal one.
    pub async fn collect(mut self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}
