use std::sync::{Arc, Mutex};
use std::time::Duration;

use procherd::events::{spawn_delivery, EventReceiver, EventSink, LogEvent, SupervisorEvent};
use procherd::types::ServiceState;

/// Shared record of every delivered event.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SupervisorEvent>>>,
}

impl EventSink for EventLog {
    fn deliver(&mut self, event: SupervisorEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Drain `rx` into a fresh [`EventLog`] on a delivery loop.
pub fn collect_events(rx: EventReceiver) -> EventLog {
    let log = EventLog::default();
    spawn_delivery(rx, log.clone());
    log
}

impl EventLog {
    pub fn snapshot(&self) -> Vec<SupervisorEvent> {
        self.events.lock().unwrap().clone()
    }

    /// State transitions of one service, in delivery order.
    pub fn states_of(&self, service: &str) -> Vec<ServiceState> {
        self.snapshot()
            .into_iter()
            .filter_map(|e| match e {
                SupervisorEvent::StatusChanged { service: s, state } if s == service => Some(state),
                _ => None,
            })
            .collect()
    }

    /// Log events attributed to `service`, in delivery order.
    pub fn logs_of(&self, service: &str) -> Vec<LogEvent> {
        self.snapshot()
            .into_iter()
            .filter_map(|e| match e {
                SupervisorEvent::LogReceived(log) if log.service == service => Some(log),
                _ => None,
            })
            .collect()
    }

    /// Poll until `predicate` holds or `timeout` elapses.
    pub async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[SupervisorEvent]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let satisfied = {
                let events = self.events.lock().unwrap();
                predicate(events.as_slice())
            };
            if satisfied {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Wait until `service` has produced at least `count` log events.
    pub async fn wait_for_logs(&self, service: &str, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |events| {
            events
                .iter()
                .filter(|e| matches!(e, SupervisorEvent::LogReceived(l) if l.service == service))
                .count()
                >= count
        })
        .await
    }
}
