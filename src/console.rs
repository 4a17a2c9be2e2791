// src/console.rs

//! Console control surface: prints supervisor events, one line each.

use std::io::Write;

use crate::events::{EventSink, LogEvent, SupervisorEvent};
use crate::types::Severity;

/// Writes every event as a single line to the wrapped writer.
pub struct ConsoleSink<W: Write + Send> {
    out: W,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> EventSink for ConsoleSink<W> {
    fn deliver(&mut self, event: SupervisorEvent) {
        // A closed stdout must not take the delivery loop down.
        let _ = writeln!(self.out, "{}", format_event(&event));
        let _ = self.out.flush();
    }
}

pub fn format_event(event: &SupervisorEvent) -> String {
    match event {
        SupervisorEvent::StatusChanged { service, state } => {
            format!("[{service}] status: {state}")
        }
        SupervisorEvent::LogReceived(LogEvent {
            service,
            message,
            severity: Severity::Error,
            ..
        }) => format!("[{service}] ERROR {message}"),
        SupervisorEvent::LogReceived(LogEvent {
            service, message, ..
        }) => format!("[{service}] {message}"),
    }
}
