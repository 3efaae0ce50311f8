//! Mutable state shared by every unit during a run.
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::classes::ClassSet;
use super::value::Value;
use crate::exec::Executor;
use crate::monitor::FlowMonitor;
use crate::resources::fileops::FilesystemOps;
use crate::resources::package::PackageQuery;

/// Version of the running engine, compared by `cfenjin_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVersion {
    /// Dotted release, e.g. `[0, 1, 0]`.
    pub release: Vec<u64>,
    /// Development build number within the release.
    pub dev: i64,
}

impl EngineVersion {
    /// Version of this build.
    #[must_use]
    pub fn current() -> Self {
        Self {
            release: parse_release(env!("CARGO_PKG_VERSION")),
            dev: 0,
        }
    }

    /// Whether a script asking for `release`/`dev` needs a newer engine.
    #[must_use]
    pub fn older_than(&self, release: &[u64], dev: i64) -> bool {
        match release.cmp(&self.release) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => dev > self.dev,
            std::cmp::Ordering::Less => false,
        }
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.release.iter().map(ToString::to_string).collect();
        write!(f, "{}-dev{}", parts.join("."), self.dev)
    }
}

/// Numeric components of a dotted version; non-numeric parts count as 0.
#[must_use]
pub fn parse_release(text: &str) -> Vec<u64> {
    text.trim()
        .split('.')
        .map(|part| {
            part.chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .unwrap_or(0)
        })
        .collect()
}

/// Everything a running unit may read or change outside itself.
pub struct EngineState {
    /// Host class membership.
    pub classes: ClassSet,
    /// Values of site variables (`site['name']`).
    pub site: BTreeMap<String, Value>,
    /// Raise on failed copies and links instead of reporting them.
    pub strict: bool,
    /// Changes are vetoed by a dry-run observer.
    pub dry_run: bool,
    /// Effective user, bound as `user` in every `initialize`.
    pub user: String,
    /// Home directory, bound as `homepath` in every `initialize`.
    pub home: PathBuf,
    /// Engine version for `cfenjin_version`.
    pub version: EngineVersion,
    /// Filesystem collaborator.
    pub fs: Arc<dyn FilesystemOps>,
    /// Installed-package collaborator.
    pub packages: Arc<dyn PackageQuery>,
    /// Runs backtick commands.
    pub executor: Arc<dyn Executor>,
    /// Message bus.
    pub monitor: Arc<FlowMonitor>,
}

impl fmt::Debug for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineState")
            .field("classes", &self.classes)
            .field("site", &self.site)
            .field("strict", &self.strict)
            .field("dry_run", &self.dry_run)
            .field("user", &self.user)
            .field("home", &self.home)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}
