//! Structured logger with dry-run awareness and summary collection.
use std::path::PathBuf;
use std::sync::Mutex;

use super::subscriber::{DRY_RUN_TARGET, STAGE_TARGET};
use super::types::{Log, UnitEntry, UnitStatus};
use super::utils::log_file_path;

/// Implement the display methods of [`Log`] by delegating to inherent methods
/// of the same name on the implementing type.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Structured logger with dry-run awareness and summary collection.
///
/// Every message also lands in `$XDG_CACHE_HOME/cfenjin/<command>.log`
/// (default `~/.cache/cfenjin/<command>.log`) once
/// [`init_subscriber`](super::subscriber::init_subscriber) has run.
#[derive(Debug)]
pub struct Logger {
    units: Mutex<Vec<UnitEntry>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a new logger for `command`.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            units: Mutex::new(Vec::new()),
            log_file: log_file_path(command),
        }
    }

    /// Return the log file path, if available.
    #[cfg(test)]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Return a clone of all recorded unit entries.
    #[must_use]
    pub fn unit_entries(&self) -> Vec<UnitEntry> {
        self.units.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message.
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log a change that dry-run mode held back.
    pub fn dry_run(&self, msg: &str) {
        tracing::info!(target: DRY_RUN_TARGET, "{msg}");
    }

    /// Record a block result for the summary.
    pub fn record_unit(&self, name: &str, status: UnitStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.units.lock() {
            guard.push(UnitEntry {
                name: name.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// Return `true` if any recorded block has failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    /// Count the number of failed blocks.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.units.lock().map_or(0, |guard| {
            guard
                .iter()
                .filter(|t| t.status == UnitStatus::Failed)
                .count()
        })
    }

    /// Log the summary of all recorded blocks.
    ///
    /// Completed blocks are only listed individually at debug level; skips
    /// and failures are always listed.
    pub fn print_summary(&self) {
        let units = self.unit_entries();
        if units.is_empty() {
            return;
        }

        self.stage("Summary");

        let mut ok = 0u32;
        let mut skipped = 0u32;
        let mut dry_run = 0u32;
        let mut failed = 0u32;

        for unit in &units {
            let (icon, color) = match unit.status {
                UnitStatus::Ok => {
                    ok += 1;
                    ("✓", "\x1b[32m")
                }
                UnitStatus::Skipped => {
                    skipped += 1;
                    ("○", "\x1b[33m")
                }
                UnitStatus::DryRun => {
                    dry_run += 1;
                    ("~", "\x1b[37m")
                }
                UnitStatus::Failed => {
                    failed += 1;
                    ("✗", "\x1b[31m")
                }
            };

            let suffix = unit
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));
            let line = format!("{color}{icon} {}{suffix}\x1b[0m", unit.name);
            if matches!(unit.status, UnitStatus::Ok | UnitStatus::DryRun) {
                self.debug(&line);
            } else {
                self.info(&line);
            }
        }

        let total = ok + skipped + dry_run + failed;
        self.info(&format!(
            "{total} blocks: \x1b[32m{ok} ok\x1b[0m, \x1b[33m{skipped} skipped\x1b[0m, \x1b[37m{dry_run} dry-run\x1b[0m, \x1b[31m{failed} failed\x1b[0m"
        ));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error, dry_run);

    fn record_unit(&self, name: &str, status: UnitStatus, message: Option<&str>) {
        self.record_unit(name, status, message);
    }
}
