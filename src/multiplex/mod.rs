// src/multiplex/mod.rs

//! Log multiplexer.
//!
//! Each running service gets two reader loops (stdout + stderr). Every loop
//! classifies its lines with the service's [`LineClassifier`] and forwards the
//! surviving [`LogEvent`](crate::events::LogEvent)s into the shared event
//! channel.
//!
//! - [`classify`] parses structured lines and applies the allow-list.
//! - [`reader`] owns the per-channel read loop.
//!
//! [`LogMultiplexer`] keeps track of every reader it has spawned so that
//! shutdown can signal them and wait, bounded, for them to finish.

pub mod classify;
pub mod reader;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::EventSender;
use crate::types::OutputStream;

pub use classify::LineClassifier;
pub use reader::spawn_reader;

struct ReaderTask {
    service: String,
    source: OutputStream,
    handle: JoinHandle<()>,
}

/// Owner of all reader loops and of the process-wide stop signal.
pub struct LogMultiplexer {
    stop: watch::Sender<bool>,
    readers: Mutex<Vec<ReaderTask>>,
}

impl std::fmt::Debug for LogMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogMultiplexer")
            .field("stopped", &*self.stop.borrow())
            .finish_non_exhaustive()
    }
}

impl Default for LogMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogMultiplexer {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            stop,
            readers: Mutex::new(Vec::new()),
        }
    }

    /// Start reader loops for whichever of the two channels are present.
    pub fn attach<O, E>(
        &self,
        classifier: Arc<LineClassifier>,
        stdout: Option<O>,
        stderr: Option<E>,
        events: &EventSender,
    ) where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let service = classifier.service().to_string();
        let mut spawned = Vec::with_capacity(2);

        if let Some(stdout) = stdout {
            spawned.push(ReaderTask {
                service: service.clone(),
                source: OutputStream::Stdout,
                handle: spawn_reader(
                    stdout,
                    OutputStream::Stdout,
                    Arc::clone(&classifier),
                    events.clone(),
                    self.stop.subscribe(),
                ),
            });
        }

        if let Some(stderr) = stderr {
            spawned.push(ReaderTask {
                service: service.clone(),
                source: OutputStream::Stderr,
                handle: spawn_reader(
                    stderr,
                    OutputStream::Stderr,
                    classifier,
                    events.clone(),
                    self.stop.subscribe(),
                ),
            });
        }

        debug!(service = %service, readers = spawned.len(), "log readers attached");

        let mut readers = self.readers.lock().unwrap_or_else(PoisonError::into_inner);
        readers.retain(|r| !r.handle.is_finished());
        readers.extend(spawned);
    }

    /// Number of reader loops that have not finished yet.
    pub fn active_readers(&self) -> usize {
        let readers = self.readers.lock().unwrap_or_else(PoisonError::into_inner);
        readers.iter().filter(|r| !r.handle.is_finished()).count()
    }

    /// Raise the stop signal and wait up to `quiesce` for every reader.
    ///
    /// Readers still running at the deadline are aborted and returned as
    /// `"<service> (<stream>)"` labels.
    pub async fn shutdown(&self, quiesce: Duration) -> Vec<String> {
        self.stop.send_replace(true);

        let readers = {
            let mut guard = self.readers.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };

        let deadline = tokio::time::Instant::now() + quiesce;
        let mut stragglers = Vec::new();

        for mut reader in readers {
            if tokio::time::timeout_at(deadline, &mut reader.handle)
                .await
                .is_err()
            {
                warn!(
                    service = %reader.service,
                    stream = %reader.source,
                    "log reader did not quiesce in time; aborting"
                );
                reader.handle.abort();
                stragglers.push(format!("{} ({})", reader.service, reader.source));
            }
        }

        stragglers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::config::SupervisorSettings;
    use crate::events::event_channel;
    use crate::registry::ServiceDescriptor;

    fn classifier(name: &str) -> Arc<LineClassifier> {
        let descriptor = ServiceDescriptor::new(name, ["true"]);
        Arc::new(LineClassifier::new(&descriptor, &SupervisorSettings::default()))
    }

    #[tokio::test]
    async fn finished_readers_quiesce_without_stragglers() {
        let mux = LogMultiplexer::new();
        let (tx, _rx) = event_channel(8);

        mux.attach(
            classifier("Auth"),
            Some(Cursor::new(b"LOG::{\"message\":\"ready\"}\n".to_vec())),
            Some(Cursor::new(Vec::new())),
            &tx,
        );

        let stragglers = mux.shutdown(Duration::from_secs(1)).await;
        assert!(stragglers.is_empty());
        assert_eq!(mux.active_readers(), 0);
    }

    #[tokio::test]
    async fn blocked_readers_stop_on_signal() {
        let mux = LogMultiplexer::new();
        let (tx, _rx) = event_channel(8);
        let (_out_writer, out_reader) = tokio::io::duplex(64);
        let (_err_writer, err_reader) = tokio::io::duplex(64);

        mux.attach(classifier("Order"), Some(out_reader), Some(err_reader), &tx);
        assert_eq!(mux.active_readers(), 2);

        let stragglers = mux.shutdown(Duration::from_secs(1)).await;
        assert!(stragglers.is_empty(), "stragglers: {stragglers:?}");
    }

    #[tokio::test]
    async fn reader_stuck_on_a_full_channel_is_reported_and_aborted() {
        let mux = LogMultiplexer::new();
        let (tx, mut rx) = event_channel(1);
        let lines = b"LOG::{\"message\":\"one\"}\nLOG::{\"message\":\"two\"}\nLOG::{\"message\":\"three\"}\n";

        mux.attach(
            classifier("Inventory"),
            Some(Cursor::new(lines.to_vec())),
            None::<Cursor<Vec<u8>>>,
            &tx,
        );
        drop(tx);

        // Nobody drains the channel, so the reader parks in `send` on line two.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mux.active_readers(), 1);

        let stragglers = mux.shutdown(Duration::from_millis(100)).await;
        assert_eq!(stragglers, vec!["Inventory (stdout)".to_string()]);
        assert_eq!(mux.active_readers(), 0);

        // The aborted reader dropped its sender: only the buffered event remains.
        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("buffered event");
        assert!(matches!(
            first,
            Some(crate::events::SupervisorEvent::LogReceived(ref e)) if e.message == "one"
        ));
        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("channel must close once the reader is aborted");
        assert!(closed.is_none());
    }
}
