// src/supervisor/graceful.rs

//! Graceful shutdown requests.
//!
//! A service with a `control_port` accepts `POST /shutdown` on localhost.
//! Failure of any kind (refused, timeout, bad response) only means the
//! service cannot shut down gracefully right now; escalation continues.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::errors::{ProcherdError, Result};

/// Trait abstracting how a graceful shutdown is requested.
///
/// Production code uses [`HttpShutdown`]; tests can substitute a requester
/// that records calls or fails on purpose.
pub trait GracefulShutdown: Send + Sync {
    /// Ask the service listening on `port` to shut down. Must give up after
    /// `timeout`.
    fn request_shutdown(
        &self,
        port: u16,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Sends `POST http://localhost:<port>/shutdown`; the response is ignored.
#[derive(Debug, Clone)]
pub struct HttpShutdown {
    client: reqwest::Client,
}

impl HttpShutdown {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProcherdError::Other(e.into()))?;
        Ok(Self { client })
    }

    pub fn shutdown_url(port: u16) -> String {
        format!("http://localhost:{port}/shutdown")
    }
}

impl GracefulShutdown for HttpShutdown {
    fn request_shutdown(
        &self,
        port: u16,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let url = Self::shutdown_url(port);
            let response = self
                .client
                .post(&url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| ProcherdError::GracefulShutdownUnavailable {
                    port,
                    reason: e.to_string(),
                })?;

            debug!(%url, status = %response.status(), "graceful shutdown request delivered");
            Ok(())
        })
    }
}
