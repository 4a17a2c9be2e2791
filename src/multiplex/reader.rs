// src/multiplex/reader.rs

//! One reader loop per output channel.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::events::{EventSender, SupervisorEvent};
use crate::logging::CHILD_OUTPUT_TARGET;
use crate::multiplex::classify::LineClassifier;
use crate::types::OutputStream;

/// Spawn a reader loop for one output channel.
///
/// The loop ends when:
/// - the stream reaches EOF (normal: the process exited or closed the pipe),
/// - a read error occurs,
/// - the event channel is closed,
/// - or the stop signal is raised.
///
/// Lines are decoded lossily, so non-UTF-8 output never ends the loop. Events
/// are sent in the order lines were read.
pub fn spawn_reader<R>(
    stream: R,
    source: OutputStream,
    classifier: Arc<LineClassifier>,
    events: EventSender,
    stop: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(read_lines(stream, source, classifier, events, stop))
}

async fn read_lines<R>(
    stream: R,
    source: OutputStream,
    classifier: Arc<LineClassifier>,
    events: EventSender,
    mut stop: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    let service = classifier.service().to_string();
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut lines = 0usize;
    let mut emitted = 0usize;

    loop {
        buf.clear();

        let read = tokio::select! {
            biased;
            _ = stop_requested(&mut stop) => {
                debug!(service = %service, stream = %source, "stop signal received; reader exiting");
                break;
            }
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(service = %service, stream = %source, error = %e, "read error; reader exiting");
                break;
            }
        }

        lines += 1;
        let line = String::from_utf8_lossy(&buf);
        trace!(
            target: CHILD_OUTPUT_TARGET,
            service = %service,
            stream = %source,
            "{}",
            line.trim_end()
        );

        let Some(event) = classifier.classify(&line, source) else {
            continue;
        };

        if events.send(SupervisorEvent::LogReceived(event)).await.is_err() {
            debug!(service = %service, stream = %source, "event channel closed; reader exiting");
            break;
        }
        emitted += 1;
    }

    debug!(service = %service, stream = %source, lines, emitted, "reader finished");
}

/// Resolves once the stop flag is `true`. Never resolves if the sender is gone.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::config::SupervisorSettings;
    use crate::events::{event_channel, LogEvent};
    use crate::registry::ServiceDescriptor;

    fn classifier() -> Arc<LineClassifier> {
        let descriptor = ServiceDescriptor::new("Auth", ["true"]);
        Arc::new(LineClassifier::new(&descriptor, &SupervisorSettings::default()))
    }

    #[tokio::test]
    async fn reads_until_eof_and_skips_noise() {
        let input = b"LOG::{\"message\":\"one\"}\nrandom chatter\n\xff\xfe garbage\nLOG::{\"message\":\"two\"}".to_vec();
        let (tx, mut rx) = event_channel(8);
        let (_stop_tx, stop_rx) = watch::channel(false);

        spawn_reader(Cursor::new(input), OutputStream::Stdout, classifier(), tx, stop_rx)
            .await
            .unwrap();

        let mut messages = Vec::new();
        while let Ok(SupervisorEvent::LogReceived(LogEvent { message, .. })) = rx.try_recv() {
            messages.push(message);
        }
        assert_eq!(messages, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn stop_signal_ends_a_blocked_reader() {
        // The write half stays open, so the reader would block forever.
        let (_writer, read_half) = tokio::io::duplex(64);
        let (tx, _rx) = event_channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = spawn_reader(read_half, OutputStream::Stderr, classifier(), tx, stop_rx);
        stop_tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("reader must stop promptly")
            .unwrap();
    }
}
