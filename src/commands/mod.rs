//! Subcommand orchestration.
pub mod apply;
pub mod check;
pub mod dump;
pub mod version;

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::engine::Engine;
use crate::engine::classes::ClassSet;
use crate::engine::state::{EngineState, EngineVersion};
use crate::error::EngineError;
use crate::exec::{Executor, SystemExecutor};
use crate::logging::{Log, Logger};
use crate::monitor::{DryRunObserver, FlowMonitor, LogObserver};
use crate::platform::{self, HostInfo};
use crate::resources::fileops::SystemFileOps;
use crate::resources::package::SystemPackages;

/// Monitor reporting to `log`, vetoing changes in dry-run mode.
#[must_use]
pub fn monitor(settings: &Settings, log: &Arc<Logger>) -> Arc<FlowMonitor> {
    let monitor = Arc::new(FlowMonitor::new());
    let sink: Arc<dyn Log> = log.clone();
    monitor.register(Arc::new(LogObserver::new(Arc::clone(&sink), settings.verbose)));
    if settings.dry_run {
        monitor.register(Arc::new(DryRunObserver::new(sink)));
    }
    monitor
}

/// Detect the host and build run state from `settings`.
///
/// # Errors
///
/// Returns [`EngineError::Platform`] if host detection fails.
pub fn engine_state(
    settings: &Settings,
    monitor: Arc<FlowMonitor>,
    log: &Logger,
) -> Result<EngineState, EngineError> {
    log.stage("Detecting host");
    let host = HostInfo::detect()?;
    log.info(&format!(
        "{} ({}{}), user {}",
        host.hostname,
        host.os_name,
        host.distribution
            .as_deref()
            .map_or_else(String::new, |d| format!(" {d}")),
        host.user
    ));

    let executor: Arc<dyn Executor> = Arc::new(SystemExecutor);
    let packages = SystemPackages::detect(Arc::clone(&executor));
    if let Some(manager) = packages.manager() {
        log.debug(&format!("package manager: {manager}"));
    }

    Ok(EngineState {
        classes: ClassSet::new(&host, &settings.defines, &settings.undefines),
        site: settings.site_values(),
        strict: settings.strict,
        dry_run: settings.dry_run,
        home: platform::home_dir().unwrap_or_else(|| PathBuf::from("/")),
        user: host.user,
        version: EngineVersion::current(),
        fs: Arc::new(SystemFileOps::new(Arc::clone(&monitor))),
        packages: Arc::new(packages),
        executor,
        monitor,
    })
}

/// Build an engine and parse `files` into it.
///
/// # Errors
///
/// Returns an error if the host cannot be detected or a file cannot be read.
pub fn load_engine(settings: &Settings, files: &[PathBuf], log: &Arc<Logger>) -> Result<Engine> {
    let monitor = monitor(settings, log);
    let state = engine_state(settings, monitor, log)?;
    let mut engine = Engine::new(state);
    log.stage("Parsing scripts");
    parse_files(&mut engine, files)?;
    log.info(&format!(
        "{} blocks from {} file(s)",
        engine.tree().len(),
        files.len()
    ));
    Ok(engine)
}

/// Parse each of `files` into `engine`, in order.
///
/// # Errors
///
/// Returns an error naming the first file that cannot be read.
pub fn parse_files(engine: &mut Engine, files: &[PathBuf]) -> Result<()> {
    for file in files {
        engine
            .parse(Path::new(file))
            .with_context(|| format!("reading {}", file.display()))?;
    }
    Ok(())
}
