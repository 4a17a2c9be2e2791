// src/lib.rs

pub mod cli;
pub mod config;
pub mod console;
pub mod errors;
pub mod events;
pub mod logging;
pub mod multiplex;
pub mod registry;
pub mod supervisor;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, ConfigFile};
use crate::console::ConsoleSink;
use crate::errors::ProcherdError;
use crate::events::{event_channel, spawn_delivery};
use crate::registry::ServiceRegistry;
use crate::supervisor::{ShutdownReport, Supervisor};

/// How long to wait for the console to drain remaining events on exit.
const DELIVERY_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the service registry and supervisor
/// - the console event sink
/// - Ctrl-C handling and the final shutdown
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let registry = Arc::new(ServiceRegistry::from_config(&cfg)?);
    let selected = selected_services(&registry, &args.services)?;

    let (event_tx, event_rx) = event_channel(cfg.supervisor.event_buffer);
    let delivery = spawn_delivery(event_rx, ConsoleSink::stdout());

    let supervisor = Supervisor::new(registry, cfg.supervisor.clone(), event_tx)?;

    let results = match selected {
        None => supervisor.start_all().await,
        Some(names) => start_selected(&supervisor, &names).await,
    };
    for (name, result) in results.iter() {
        if let Err(e) = result {
            warn!(service = %name, error = %e, "service failed to start");
        }
    }

    info!("services launched; press Ctrl-C to shut down");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C; shutting down now");
    }

    let report = supervisor.shutdown_all().await;
    print_shutdown_report(&report);

    // Readers are gone; dropping the supervisor closes the event channel.
    drop(supervisor);
    if tokio::time::timeout(DELIVERY_DRAIN_TIMEOUT, delivery).await.is_err() {
        debug!("event delivery did not drain in time");
    }

    Ok(())
}

/// `None` means "all services". Names are resolved against the registry the
/// supervisor uses; unknown names are rejected up front.
fn selected_services(
    registry: &ServiceRegistry,
    requested: &[String],
) -> errors::Result<Option<Vec<String>>> {
    if requested.is_empty() {
        return Ok(None);
    }

    requested
        .iter()
        .map(|name| {
            registry
                .get(name.trim())
                .map(|d| d.name.clone())
                .ok_or_else(|| ProcherdError::UnknownService(name.clone()))
        })
        .collect::<errors::Result<Vec<_>>>()
        .map(Some)
}

async fn start_selected(
    supervisor: &Supervisor,
    names: &[String],
) -> Vec<(String, errors::Result<()>)> {
    let interval = supervisor.settings().launch_interval;
    let mut results = Vec::with_capacity(names.len());

    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(interval).await;
        }
        results.push((name.clone(), supervisor.start(name).await));
    }

    results
}

fn print_shutdown_report(report: &ShutdownReport) {
    for (name, outcome) in report.stopped.iter() {
        println!("stopped {name}: {outcome:?}");
    }
    for (name, err) in report.failures.iter() {
        println!("failed to stop {name}: {err}");
    }
    if !report.stragglers.is_empty() {
        println!("log readers still busy at exit: {}", report.stragglers.join(", "));
    }
}

/// Simple dry-run output: print supervisor settings and services.
fn print_dry_run(cfg: &ConfigFile) {
    let s = &cfg.supervisor;
    println!("procherd dry-run");
    println!("  supervisor.graceful_timeout = {:?}", s.graceful_timeout);
    println!("  supervisor.settle_period = {:?}", s.settle_period);
    println!("  supervisor.kill_timeout = {:?}", s.kill_timeout);
    println!("  supervisor.reader_quiesce_timeout = {:?}", s.reader_quiesce_timeout);
    println!("  supervisor.launch_interval = {:?}", s.launch_interval);
    println!("  supervisor.log_sentinel = {}", s.log_sentinel);
    println!();

    println!("services ({}):", cfg.service.len());
    for service in cfg.service.iter() {
        println!("  - {}", service.name);
        println!("      cmd: {}", service.cmd.display());
        if let Some(port) = service.control_port {
            println!("      control_port: {port}");
        }
        if !service.announce.is_empty() {
            println!("      announce: {:?}", service.announce);
        }
        if let Some(ref cwd) = service.cwd {
            println!("      cwd: {}", cwd.display());
        }
        if !service.env.is_empty() {
            println!("      env: {:?}", service.env.keys().collect::<Vec<_>>());
        }
    }

    debug!("dry-run complete (nothing started)");
}
