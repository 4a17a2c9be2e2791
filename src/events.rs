// src/events.rs

//! Events flowing from the supervisor to the control surface.
//!
//! Reader loops and the supervisor push [`SupervisorEvent`]s into one mpsc
//! channel. Exactly one delivery loop drains it into an [`EventSink`], so the
//! sink sees one complete event at a time no matter how many readers run.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::types::{OutputStream, ServiceState, Severity};

/// A surfaced line of child output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub service: String,
    pub message: String,
    pub severity: Severity,
    pub source: OutputStream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    StatusChanged {
        service: String,
        state: ServiceState,
    },
    LogReceived(LogEvent),
}

pub type EventSender = mpsc::Sender<SupervisorEvent>;
pub type EventReceiver = mpsc::Receiver<SupervisorEvent>;

pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}

/// Consumer of supervisor events, owned by the control surface.
pub trait EventSink: Send {
    fn deliver(&mut self, event: SupervisorEvent);
}

/// Spawn the single delivery loop feeding `sink`.
///
/// The loop ends once every sender (supervisor and reader loops) has been
/// dropped; the sink is handed back through the join handle.
pub fn spawn_delivery<S>(mut rx: EventReceiver, mut sink: S) -> JoinHandle<S>
where
    S: EventSink + 'static,
{
    tokio::spawn(async move {
        let mut delivered = 0usize;
        while let Some(event) = rx.recv().await {
            sink.deliver(event);
            delivered += 1;
        }
        debug!(delivered, "event delivery loop finished (channel closed)");
        sink
    })
}
