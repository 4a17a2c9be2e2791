// src/supervisor/mod.rs

//! Process supervisor.
//!
//! The [`Supervisor`] is the single owner of every live process and the only
//! writer of service state. Each registered service has its own
//! slot behind an async mutex:
//!
//! - operations on the same service are serialized (a `stop` issued while a
//!   `start` is in flight waits for the handle to exist),
//! - operations on different services never wait for each other.
//!
//! Submodules:
//! - [`handle`]: launching and owning the OS process.
//! - [`escalation`]: the graceful → forceful shutdown protocol.
//! - [`graceful`]: the `POST /shutdown` requester.
//! - [`terminate`]: platform-specific process tree termination.

pub mod escalation;
pub mod graceful;
pub mod handle;
pub mod terminate;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::SupervisorSettings;
use crate::errors::{ProcherdError, Result};
use crate::events::{EventSender, SupervisorEvent};
use crate::multiplex::{LineClassifier, LogMultiplexer};
use crate::registry::{ServiceDescriptor, ServiceRegistry};
use crate::types::ServiceState;

pub use escalation::{escalate, Escalation, EscalationPolicy, ManagedProcess, ProcessExit};
pub use graceful::{GracefulShutdown, HttpShutdown};
pub use handle::{Launched, OsLauncher, OutputReader, ProcessHandle, ProcessLauncher};

/// How a successful `stop` completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No live handle existed; nothing was done.
    NotRunning,
    /// The process had already exited on its own.
    AlreadyExited,
    /// The process exited after the graceful shutdown request.
    Graceful,
    /// The process was forcefully terminated.
    Terminated,
}

/// Result of [`Supervisor::shutdown_all`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Services that had a live handle and were stopped.
    pub stopped: Vec<(String, StopOutcome)>,
    /// Per-service failures; none of them aborted the shutdown.
    pub failures: Vec<(String, ProcherdError)>,
    /// Reader loops that did not finish within the quiesce timeout.
    pub stragglers: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.stragglers.is_empty()
    }
}

struct LiveProcess {
    process: Box<dyn ManagedProcess>,
    started_at: Instant,
}

#[derive(Default)]
struct ServiceSlot {
    state: ServiceState,
    live: Option<LiveProcess>,
}

struct Inner {
    registry: Arc<ServiceRegistry>,
    settings: SupervisorSettings,
    policy: EscalationPolicy,
    slots: HashMap<String, Arc<Mutex<ServiceSlot>>>,
    events: EventSender,
    graceful: Arc<dyn GracefulShutdown>,
    launcher: Arc<dyn ProcessLauncher>,
    multiplexer: LogMultiplexer,
    shut_down: AtomicBool,
}

/// Starts and stops registered services. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("services", &self.inner.registry.len())
            .field("policy", &self.inner.policy)
            .field("shut_down", &self.inner.shut_down.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Supervisor using HTTP graceful shutdown requests.
    pub fn new(
        registry: Arc<ServiceRegistry>,
        settings: SupervisorSettings,
        events: EventSender,
    ) -> Result<Self> {
        let graceful = Arc::new(HttpShutdown::new()?);
        Ok(Self::with_graceful(registry, settings, events, graceful))
    }

    pub fn with_graceful(
        registry: Arc<ServiceRegistry>,
        settings: SupervisorSettings,
        events: EventSender,
        graceful: Arc<dyn GracefulShutdown>,
    ) -> Self {
        Self::with_backends(registry, settings, events, graceful, Arc::new(OsLauncher))
    }

    /// Supervisor with both the graceful requester and the launcher supplied.
    pub fn with_backends(
        registry: Arc<ServiceRegistry>,
        settings: SupervisorSettings,
        events: EventSender,
        graceful: Arc<dyn GracefulShutdown>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let slots = registry
            .names()
            .map(|name| (name.to_string(), Arc::new(Mutex::new(ServiceSlot::default()))))
            .collect();

        Self {
            inner: Arc::new(Inner {
                policy: EscalationPolicy::from(&settings),
                registry,
                settings,
                slots,
                events,
                graceful,
                launcher,
                multiplexer: LogMultiplexer::new(),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.inner.settings
    }

    /// Start a service.
    ///
    /// Spawning and the state transitions happen before this returns; log
    /// streaming continues in the background.
    pub async fn start(&self, name: &str) -> Result<()> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(ProcherdError::SupervisorShutDown);
        }

        let (descriptor, slot) = self.lookup(name)?;
        let mut slot = slot.lock().await;

        // shutdown_all may have run while this call waited for the slot.
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(ProcherdError::SupervisorShutDown);
        }

        self.reap_if_exited(name, &mut slot).await;
        if slot.live.is_some() {
            debug!(service = %name, "start requested but service is already running");
            return Err(ProcherdError::AlreadyRunning(name.to_string()));
        }

        self.transition(name, &mut slot, ServiceState::Starting).await;

        let launched = match self.inner.launcher.launch(Arc::clone(&descriptor)) {
            Ok(launched) => launched,
            Err(source) => {
                error!(service = %name, error = %source, "failed to spawn service");
                self.transition(name, &mut slot, ServiceState::Error).await;
                return Err(ProcherdError::SpawnFailed {
                    service: name.to_string(),
                    source,
                });
            }
        };

        slot.live = Some(LiveProcess {
            process: launched.process,
            started_at: Instant::now(),
        });
        self.transition(name, &mut slot, ServiceState::Online).await;

        let classifier = Arc::new(LineClassifier::new(&descriptor, &self.inner.settings));
        self.inner
            .multiplexer
            .attach(classifier, launched.stdout, launched.stderr, &self.inner.events);

        Ok(())
    }

    /// Stop a service using the escalation protocol.
    ///
    /// Idempotent: without a live handle this returns
    /// [`StopOutcome::NotRunning`] immediately. The service always ends up
    /// OFFLINE with its handle removed, even when the process could not be
    /// killed; that case is reported as [`ProcherdError::UnkillableProcess`].
    pub async fn stop(&self, name: &str) -> Result<StopOutcome> {
        let (descriptor, slot) = self.lookup(name)?;
        let mut slot = slot.lock().await;

        let Some(mut live) = slot.live.take() else {
            debug!(service = %name, "stop requested but service is not running");
            return Ok(StopOutcome::NotRunning);
        };
        let pid = live.process.pid();

        self.transition(name, &mut slot, ServiceState::Stopping).await;

        let escalation = escalate(
            name,
            descriptor.control_port,
            live.process.as_mut(),
            self.inner.graceful.as_ref(),
            &self.inner.policy,
        )
        .await;

        drop(live);
        self.transition(name, &mut slot, ServiceState::Offline).await;

        match escalation {
            Escalation::AlreadyExited => Ok(StopOutcome::AlreadyExited),
            Escalation::Graceful => Ok(StopOutcome::Graceful),
            Escalation::Terminated => Ok(StopOutcome::Terminated),
            Escalation::Unkillable => {
                warn!(service = %name, ?pid, "process may still be running as an orphan");
                Err(ProcherdError::UnkillableProcess {
                    service: name.to_string(),
                    pid,
                })
            }
        }
    }

    /// Start every registered service that is not running, in declaration
    /// order, pausing `launch_interval` between launches.
    pub async fn start_all(&self) -> Vec<(String, Result<()>)> {
        let mut results = Vec::new();

        for descriptor in self.inner.registry.iter() {
            let name = descriptor.name.as_str();
            if self.pid(name).await.is_some() {
                debug!(service = %name, "start_all: already running; skipping");
                continue;
            }

            if !results.is_empty() {
                tokio::time::sleep(self.inner.settings.launch_interval).await;
            }

            let result = self.start(name).await;
            results.push((name.to_string(), result));
        }

        results
    }

    /// Stop every live service concurrently, then quiesce the log readers.
    ///
    /// After this call the supervisor refuses further `start` calls.
    pub async fn shutdown_all(&self) -> ShutdownReport {
        info!("shutting down all services");
        self.inner.shut_down.store(true, Ordering::Release);

        let mut set = JoinSet::new();
        for name in self.inner.registry.names() {
            let supervisor = self.clone();
            let name = name.to_string();
            set.spawn(async move {
                let result = supervisor.stop(&name).await;
                (name, result)
            });
        }

        let mut report = ShutdownReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(StopOutcome::NotRunning))) => {}
                Ok((name, Ok(outcome))) => report.stopped.push((name, outcome)),
                Ok((name, Err(e))) => report.failures.push((name, e)),
                Err(e) => {
                    error!(error = %e, "stop task failed");
                    report
                        .failures
                        .push(("<unknown>".to_string(), ProcherdError::Other(e.into())));
                }
            }
        }

        let order = |name: &str| {
            self.inner
                .registry
                .names()
                .position(|n| n == name)
                .unwrap_or(usize::MAX)
        };
        report.stopped.sort_by_key(|(name, _)| order(name.as_str()));
        report.failures.sort_by_key(|(name, _)| order(name.as_str()));

        report.stragglers = self
            .inner
            .multiplexer
            .shutdown(self.inner.settings.reader_quiesce_timeout)
            .await;

        info!(
            stopped = report.stopped.len(),
            failures = report.failures.len(),
            stragglers = report.stragglers.len(),
            "shutdown complete"
        );
        report
    }

    /// Current state of a service.
    pub async fn state(&self, name: &str) -> Result<ServiceState> {
        let (_, slot) = self.lookup(name)?;
        let mut slot = slot.lock().await;
        self.reap_if_exited(name, &mut slot).await;
        Ok(slot.state)
    }

    /// States of all services in declaration order.
    pub async fn statuses(&self) -> Vec<(String, ServiceState)> {
        let mut out = Vec::with_capacity(self.inner.registry.len());
        for name in self.inner.registry.names() {
            if let Ok(state) = self.state(name).await {
                out.push((name.to_string(), state));
            }
        }
        out
    }

    /// Pid of the live handle, if any.
    pub async fn pid(&self, name: &str) -> Option<u32> {
        let (_, slot) = self.lookup(name).ok()?;
        let mut slot = slot.lock().await;
        self.reap_if_exited(name, &mut slot).await;
        slot.live.as_ref().and_then(|live| live.process.pid())
    }

    /// Number of reader loops still consuming output.
    pub fn active_readers(&self) -> usize {
        self.inner.multiplexer.active_readers()
    }

    fn lookup(&self, name: &str) -> Result<(Arc<ServiceDescriptor>, Arc<Mutex<ServiceSlot>>)> {
        let descriptor = self
            .inner
            .registry
            .get(name)
            .ok_or_else(|| ProcherdError::UnknownService(name.to_string()))?;
        let slot = self
            .inner
            .slots
            .get(name)
            .ok_or_else(|| ProcherdError::UnknownService(name.to_string()))?;
        Ok((Arc::clone(descriptor), Arc::clone(slot)))
    }

    /// Drop a handle whose process exited without being stopped.
    ///
    /// A clean exit leaves the service OFFLINE, a failing one ERROR.
    async fn reap_if_exited(&self, name: &str, slot: &mut ServiceSlot) {
        let Some(live) = slot.live.as_mut() else {
            return;
        };

        let exit = match live.process.try_exit() {
            Ok(Some(exit)) => exit,
            Ok(None) => return,
            Err(e) => {
                warn!(service = %name, error = %e, "failed to poll process status");
                return;
            }
        };

        info!(
            service = %name,
            pid = ?live.process.pid(),
            exit_code = ?exit.code,
            uptime = ?live.started_at.elapsed(),
            "service process exited on its own"
        );
        slot.live = None;

        let state = if exit.success {
            ServiceState::Offline
        } else {
            ServiceState::Error
        };
        self.transition(name, slot, state).await;
    }

    async fn transition(&self, name: &str, slot: &mut ServiceSlot, state: ServiceState) {
        debug!(service = %name, from = %slot.state, to = %state, "state transition");
        slot.state = state;

        let event = SupervisorEvent::StatusChanged {
            service: name.to_string(),
            state,
        };
        if self.inner.events.send(event).await.is_err() {
            debug!(service = %name, "event channel closed; status change not delivered");
        }
    }
}
