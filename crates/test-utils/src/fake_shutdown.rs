use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use procherd::errors::{ProcherdError, Result};
use procherd::supervisor::GracefulShutdown;

type Hook = Box<dyn Fn(u16) + Send + Sync>;

/// A graceful-shutdown requester that:
/// - records every port it was asked to shut down
/// - either runs a hook (simulating a cooperative service) or fails like a
///   refused connection.
pub struct RecordingShutdown {
    calls: Arc<Mutex<Vec<u16>>>,
    hook: Option<Hook>,
}

impl RecordingShutdown {
    /// Every request fails, as if nothing listened on the port.
    pub fn refusing() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            hook: None,
        }
    }

    /// Every request succeeds after running `hook(port)`.
    pub fn honouring<F>(hook: F) -> Self
    where
        F: Fn(u16) + Send + Sync + 'static,
    {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            hook: Some(Box::new(hook)),
        }
    }

    pub fn calls(&self) -> Vec<u16> {
        self.calls.lock().unwrap().clone()
    }
}

impl GracefulShutdown for RecordingShutdown {
    fn request_shutdown(
        &self,
        port: u16,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.calls.lock().unwrap().push(port);

        Box::pin(async move {
            match &self.hook {
                Some(hook) => {
                    hook(port);
                    Ok(())
                }
                None => Err(ProcherdError::GracefulShutdownUnavailable {
                    port,
                    reason: "connection refused".to_string(),
                }),
            }
        })
    }
}
