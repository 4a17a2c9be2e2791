// src/supervisor/escalation.rs

//! Two-phase shutdown escalation.
//!
//! 1. If the service has a control port, request a graceful shutdown
//!    (bounded by `graceful_timeout`); failure is expected and non-fatal.
//! 2. Give the process up to `settle_period` to exit on its own.
//! 3. Forcefully terminate the process tree and wait up to `kill_timeout`.
//! 4. If it is still alive, report [`Escalation::Unkillable`].
//!
//! The whole protocol never takes longer than
//! `graceful_timeout + settle_period + kill_timeout`.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::SupervisorSettings;
use crate::supervisor::graceful::GracefulShutdown;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub success: bool,
    pub code: Option<i32>,
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
        }
    }
}

/// The operations the supervisor needs from a running process.
pub trait ManagedProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Non-blocking check; `None` while the process is still running.
    fn try_exit(&mut self) -> io::Result<Option<ProcessExit>>;

    fn has_exited(&mut self) -> io::Result<bool> {
        Ok(self.try_exit()?.is_some())
    }

    /// Resolves once the process has exited.
    fn wait_for_exit(&mut self) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + '_>>;

    /// Forcefully terminate the process and its children.
    fn force_terminate(&mut self) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    pub graceful_timeout: Duration,
    pub settle_period: Duration,
    pub kill_timeout: Duration,
}

impl EscalationPolicy {
    /// Upper bound on the time [`escalate`] can take.
    pub fn max_duration(&self) -> Duration {
        self.graceful_timeout + self.settle_period + self.kill_timeout
    }
}

impl From<&SupervisorSettings> for EscalationPolicy {
    fn from(settings: &SupervisorSettings) -> Self {
        Self {
            graceful_timeout: settings.graceful_timeout,
            settle_period: settings.settle_period,
            kill_timeout: settings.kill_timeout,
        }
    }
}

/// How the process ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// The process had already exited before escalation began.
    AlreadyExited,
    /// The process exited during the settle period.
    Graceful,
    /// The process exited after forceful termination.
    Terminated,
    /// The process was still alive after `kill_timeout`.
    Unkillable,
}

pub async fn escalate<P>(
    service: &str,
    control_port: Option<u16>,
    process: &mut P,
    graceful: &dyn GracefulShutdown,
    policy: &EscalationPolicy,
) -> Escalation
where
    P: ManagedProcess + ?Sized,
{
    let pid = process.pid();

    if matches!(process.has_exited(), Ok(true)) {
        debug!(service, ?pid, "process already exited before stop");
        return Escalation::AlreadyExited;
    }

    if let Some(port) = control_port {
        request_graceful(service, port, graceful, policy.graceful_timeout).await;

        match timeout(policy.settle_period, process.wait_for_exit()).await {
            Ok(Ok(())) => {
                info!(service, ?pid, "process exited after graceful shutdown request");
                return Escalation::Graceful;
            }
            Ok(Err(e)) => {
                warn!(service, ?pid, error = %e, "failed waiting for process during settle period");
            }
            Err(_) => {
                debug!(service, ?pid, "process still running after settle period");
            }
        }
    }

    info!(service, ?pid, "forcefully terminating process tree");
    if let Err(e) = process.force_terminate() {
        if matches!(process.has_exited(), Ok(true)) {
            debug!(service, ?pid, "process exited while terminating");
            return Escalation::Terminated;
        }
        warn!(service, ?pid, error = %e, "forceful termination failed");
    }

    match timeout(policy.kill_timeout, process.wait_for_exit()).await {
        Ok(Ok(())) => {
            info!(service, ?pid, "process terminated");
            Escalation::Terminated
        }
        Ok(Err(e)) => {
            warn!(service, ?pid, error = %e, "failed waiting for terminated process");
            Escalation::Unkillable
        }
        Err(_) => {
            warn!(
                service,
                ?pid,
                timeout = ?policy.kill_timeout,
                "process still alive after forceful termination"
            );
            Escalation::Unkillable
        }
    }
}

async fn request_graceful(
    service: &str,
    port: u16,
    graceful: &dyn GracefulShutdown,
    graceful_timeout: Duration,
) {
    debug!(service, port, "requesting graceful shutdown");

    // The outer timeout also bounds requesters that ignore their own timeout.
    match timeout(graceful_timeout, graceful.request_shutdown(port, graceful_timeout)).await {
        Ok(Ok(())) => debug!(service, port, "graceful shutdown request accepted"),
        Ok(Err(e)) => info!(
            service,
            port,
            error = %e,
            "graceful shutdown unavailable; escalating"
        ),
        Err(_) => info!(
            service,
            port,
            "graceful shutdown request timed out; escalating"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::time::Instant;

    use crate::errors::{ProcherdError, Result};

    const POLICY: EscalationPolicy = EscalationPolicy {
        graceful_timeout: Duration::from_secs(2),
        settle_period: Duration::from_secs(1),
        kill_timeout: Duration::from_secs(2),
    };

    struct StubProcess {
        exited: Arc<AtomicBool>,
        dies_on_kill: bool,
        kills: usize,
    }

    impl StubProcess {
        fn new(exited: Arc<AtomicBool>, dies_on_kill: bool) -> Self {
            Self {
                exited,
                dies_on_kill,
                kills: 0,
            }
        }
    }

    impl ManagedProcess for StubProcess {
        fn pid(&self) -> Option<u32> {
            Some(4242)
        }

        fn try_exit(&mut self) -> io::Result<Option<ProcessExit>> {
            Ok(self.exited.load(Ordering::SeqCst).then_some(ProcessExit {
                success: true,
                code: Some(0),
            }))
        }

        fn wait_for_exit(&mut self) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + '_>> {
            Box::pin(async move {
                while !self.exited.load(Ordering::SeqCst) {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Ok(())
            })
        }

        fn force_terminate(&mut self) -> io::Result<()> {
            self.kills += 1;
            if self.dies_on_kill {
                self.exited.store(true, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    enum Behaviour {
        /// Accept the request and make the process exit.
        Honour(Arc<AtomicBool>),
        Refuse,
        Hang,
    }

    struct StubShutdown {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl StubShutdown {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl GracefulShutdown for StubShutdown {
        fn request_shutdown(
            &self,
            port: u16,
            _timeout: Duration,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                match &self.behaviour {
                    Behaviour::Honour(exited) => {
                        exited.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                    Behaviour::Refuse => Err(ProcherdError::GracefulShutdownUnavailable {
                        port,
                        reason: "connection refused".to_string(),
                    }),
                    Behaviour::Hang => std::future::pending().await,
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn honoured_request_exits_gracefully_without_kill() {
        let exited = Arc::new(AtomicBool::new(false));
        let mut process = StubProcess::new(Arc::clone(&exited), true);
        let graceful = StubShutdown::new(Behaviour::Honour(exited));

        let outcome = escalate("Auth", Some(3001), &mut process, &graceful, &POLICY).await;

        assert_eq!(outcome, Escalation::Graceful);
        assert_eq!(process.kills, 0);
        assert_eq!(graceful.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_request_escalates_to_termination() {
        let mut process = StubProcess::new(Arc::new(AtomicBool::new(false)), true);
        let graceful = StubShutdown::new(Behaviour::Refuse);

        let outcome = escalate("Auth", Some(3001), &mut process, &graceful, &POLICY).await;

        assert_eq!(outcome, Escalation::Terminated);
        assert_eq!(process.kills, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_control_port_skips_graceful_phase() {
        let mut process = StubProcess::new(Arc::new(AtomicBool::new(false)), true);
        let graceful = StubShutdown::new(Behaviour::Refuse);
        let started = Instant::now();

        let outcome = escalate("Frontend", None, &mut process, &graceful, &POLICY).await;

        assert_eq!(outcome, Escalation::Terminated);
        assert_eq!(graceful.calls.load(Ordering::SeqCst), 0);
        assert!(started.elapsed() <= POLICY.kill_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_request_and_unkillable_process_stay_within_bound() {
        let mut process = StubProcess::new(Arc::new(AtomicBool::new(false)), false);
        let graceful = StubShutdown::new(Behaviour::Hang);
        let started = Instant::now();

        let outcome = escalate("Order", Some(3003), &mut process, &graceful, &POLICY).await;

        assert_eq!(outcome, Escalation::Unkillable);
        assert_eq!(process.kills, 1);
        assert!(started.elapsed() <= POLICY.max_duration() + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn already_exited_process_needs_no_action() {
        let mut process = StubProcess::new(Arc::new(AtomicBool::new(true)), true);
        let graceful = StubShutdown::new(Behaviour::Refuse);

        let outcome = escalate("Auth", Some(3001), &mut process, &graceful, &POLICY).await;

        assert_eq!(outcome, Escalation::AlreadyExited);
        assert_eq!(process.kills, 0);
        assert_eq!(graceful.calls.load(Ordering::SeqCst), 0);
    }
}
